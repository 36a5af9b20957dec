pub mod chain;
pub mod command;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod mail;
pub mod policy;
pub mod reader;
pub mod response;
pub mod session;
pub mod transaction;
pub mod watchdog;

use std::{net::SocketAddr, sync::Arc};

use postern_common::{
    config::ServerTimeouts, error::ProtocolError, internal, traits::protocol::Protocol,
};
use serde::Deserialize;
use tokio::net::TcpStream;

use crate::{
    chain::HandlerChain,
    delivery::{MailSink, SizeLimited},
    handlers::Blocklist,
    policy::{Network, RelayPolicy},
    session::{DEFAULT_MAX_LINE_LENGTH, Session, SessionConfig, UnknownCommand, default_hostname},
};

/// The SMTP protocol, as served by a [`Listener`](postern_common::listener::Listener).
///
/// The session configuration is assembled once, by [`Protocol::validate`],
/// and shared by every connection.
#[derive(Debug, Default)]
pub struct Smtp {
    config: Option<Arc<SessionConfig>>,
}

impl Smtp {
    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_deref()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SmtpArgs {
    pub hostname: String,
    /// Maximum message size in bytes. Zero means no limit.
    pub max_message_size: usize,
    /// Maximum command line length, including the CRLF. Zero means no limit.
    pub max_line_length: usize,
    pub timeouts: ServerTimeouts,
    pub relay: RelayPolicy,
    pub blocklist: Vec<Network>,
    pub unknown_command: UnknownCommand,
    #[serde(skip)]
    chain: Option<Arc<HandlerChain>>,
    #[serde(skip)]
    sink: Option<Arc<dyn MailSink>>,
}

impl Default for SmtpArgs {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            max_message_size: 0,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            timeouts: ServerTimeouts::default(),
            relay: RelayPolicy::default(),
            blocklist: Vec::new(),
            unknown_command: UnknownCommand::default(),
            chain: None,
            sink: None,
        }
    }
}

impl SmtpArgs {
    /// Create a new `SmtpArgs` builder
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set the name the server announces itself as
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the maximum message size (0 = unlimited)
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the relay policy for this server
    #[must_use]
    pub fn with_relay(mut self, relay: RelayPolicy) -> Self {
        self.relay = relay;
        self
    }

    /// Set the networks whose clients are blocklisted
    #[must_use]
    pub fn with_blocklist(mut self, blocklist: Vec<Network>) -> Self {
        self.blocklist = blocklist;
        self
    }

    /// Set what happens when a command has no handlers
    #[must_use]
    pub const fn with_unknown_command(mut self, policy: UnknownCommand) -> Self {
        self.unknown_command = policy;
        self
    }

    /// Replace the handler chain built from this configuration
    #[must_use]
    pub fn with_chain(mut self, chain: Arc<HandlerChain>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set where completed mail is delivered
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MailSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn sink(&self) -> Option<&Arc<dyn MailSink>> {
        self.sink.as_ref()
    }

    fn chain(&self) -> Arc<HandlerChain> {
        self.chain.clone().unwrap_or_else(|| {
            let mut chain = handlers::core();
            if !self.blocklist.is_empty() {
                chain = chain.connect(Blocklist::new(self.blocklist.clone()));
            }
            Arc::new(chain.build())
        })
    }

    fn policy(&self) -> RelayPolicy {
        let mut relay = self.relay.clone();

        if !relay
            .local_domains
            .iter()
            .any(|domain| domain.eq_ignore_ascii_case(&self.hostname))
        {
            relay.local_domains.push(self.hostname.clone());
        }

        relay
    }

    /// Assemble the configuration shared by every session.
    pub fn session_config(&self) -> SessionConfig {
        let mut builder = SessionConfig::builder()
            .with_hostname(self.hostname.clone())
            .with_max_message_size(self.max_message_size)
            .with_max_line_length(self.max_line_length)
            .with_timeouts(self.timeouts.clone())
            .with_unknown_command(self.unknown_command)
            .with_chain(self.chain())
            .with_policy(Arc::new(self.policy()));

        if let Some(sink) = &self.sink {
            let sink: Arc<dyn MailSink> = match self.max_message_size {
                0 => Arc::clone(sink),
                max => Arc::new(SizeLimited::new(Arc::clone(sink), max)),
            };
            builder = builder.with_sink(sink);
        }

        builder.build()
    }
}

impl Protocol for Smtp {
    type Session = Session<TcpStream>;
    type Args = SmtpArgs;

    fn ty() -> &'static str {
        "SMTP"
    }

    #[tracing::instrument(level = "trace", skip(self, stream, args))]
    fn handle(&self, stream: TcpStream, peer: SocketAddr, args: &Self::Args) -> Self::Session {
        let config = self
            .config
            .clone()
            .unwrap_or_else(|| Arc::new(args.session_config()));

        Session::create(stream, peer, config)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn validate(&mut self, args: &mut Self::Args) -> Result<(), ProtocolError> {
        let hostname = args.hostname.trim();
        if hostname.is_empty() || hostname.contains(char::is_whitespace) {
            return Err(ProtocolError::InvalidConfiguration {
                field: "hostname".to_string(),
                reason: format!("'{}' is not a valid host name", args.hostname),
            });
        }

        if args.sink.is_none() {
            return Err(ProtocolError::MissingField("sink"));
        }

        let config = args.session_config();
        internal!(
            level = DEBUG,
            "SMTP configured for {} with commands {:?}",
            config.hostname,
            config.chain.commands()
        );

        self.config = Some(Arc::new(config));
        Ok(())
    }
}
