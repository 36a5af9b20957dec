use std::sync::Arc;

use postern_common::config::ServerTimeouts;
use serde::Deserialize;

use crate::{
    chain::HandlerChain,
    delivery::{MailSink, MemorySink},
    handlers,
    policy::{ConnectionPolicy, RelayPolicy},
};

/// Identifies the server in the greeting and trace headers.
pub const SOFTWARE: &str = concat!("Postern ", env!("CARGO_PKG_VERSION"));

/// Default maximum command line length, including the CRLF (RFC 5321 Section 4.5.3.1.4).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1000;

/// What the session does with a verb that has no registered handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum UnknownCommand {
    /// End the session without replying.
    #[default]
    Close,
    /// Reply `500 5.5.1 Command unrecognized` and keep reading.
    Reject,
}

/// Everything a session needs that is shared between connections.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub hostname: String,
    /// Maximum message size in bytes, as advertised via the SIZE extension.
    ///
    /// Zero means no limit.
    pub max_message_size: usize,
    pub max_line_length: usize,
    pub timeouts: ServerTimeouts,
    pub unknown_command: UnknownCommand,
    pub chain: Arc<HandlerChain>,
    pub sink: Arc<dyn MailSink>,
    pub policy: Arc<dyn ConnectionPolicy>,
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// The local host name, used when none is configured.
pub fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    hostname: Option<String>,
    max_message_size: usize,
    max_line_length: Option<usize>,
    timeouts: ServerTimeouts,
    unknown_command: UnknownCommand,
    chain: Option<Arc<HandlerChain>>,
    sink: Option<Arc<dyn MailSink>>,
    policy: Option<Arc<dyn ConnectionPolicy>>,
}

impl SessionConfigBuilder {
    /// Set the name the server announces itself as
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Set the maximum message size (0 = unlimited)
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the maximum command line length, including CRLF (0 = unlimited)
    #[must_use]
    pub const fn with_max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = Some(length);
        self
    }

    /// Set the timeout configuration for this session
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set what happens when a command has no handlers
    #[must_use]
    pub const fn with_unknown_command(mut self, policy: UnknownCommand) -> Self {
        self.unknown_command = policy;
        self
    }

    /// Set the handler chain sessions dispatch to
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

    /// Set the relay and authentication policy
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ConnectionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the final `SessionConfig`
    ///
    /// Anything not provided falls back to the core handler chain, an
    /// in-memory sink and a policy that allows no relaying.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            hostname: self.hostname.unwrap_or_else(default_hostname),
            max_message_size: self.max_message_size,
            max_line_length: self.max_line_length.unwrap_or(DEFAULT_MAX_LINE_LENGTH),
            timeouts: self.timeouts,
            unknown_command: self.unknown_command,
            chain: self
                .chain
                .unwrap_or_else(|| Arc::new(handlers::core().build())),
            sink: self.sink.unwrap_or_else(|| Arc::new(MemorySink::new())),
            policy: self
                .policy
                .unwrap_or_else(|| Arc::new(RelayPolicy::default())),
        }
    }
}
