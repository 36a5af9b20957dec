use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use postern_common::{
    Signal,
    error::SessionError,
    incoming, internal,
    status::{Status, enhanced},
    traits::protocol::SessionHandler,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast::{Receiver, error::RecvError},
    time::Instant,
};

use crate::{
    command::Command,
    connection::Connection,
    delivery,
    error::ReadError,
    handler::{Mode, Outcome},
    mail::Mail,
    reader::DataLine,
    response::Response,
    transaction::Transaction,
    watchdog::Watchdog,
};

mod config;
mod state;

pub use self::{
    config::{
        DEFAULT_MAX_LINE_LENGTH, SOFTWARE, SessionConfig, SessionConfigBuilder, UnknownCommand,
        default_hostname,
    },
    state::SessionState,
};

/// What handlers may see and do during a session.
///
/// Handlers receive this instead of the session itself, so the engine keeps
/// control of the socket, the watchdog and the mode.
#[async_trait]
pub trait SmtpSession: Send {
    fn state(&self) -> &SessionState;

    fn state_mut(&mut self) -> &mut SessionState;

    fn transaction(&self) -> &Transaction;

    fn transaction_mut(&mut self) -> &mut Transaction;

    /// Clear the transaction and drop any in-progress mail together.
    fn reset_transaction(&mut self);

    fn config(&self) -> &SessionConfig;

    /// Push the idle watchdog's deadline back.
    fn keep_alive(&mut self);

    /// Write and flush a response.
    async fn reply(&mut self, response: Response) -> Result<(), SessionError>;

    /// Read one line of message content, buffering at most `limit` octets.
    /// `None` means the client closed the connection.
    async fn read_data_line(&mut self, limit: usize) -> Result<Option<DataLine>, SessionError>;
}

pub struct Session<Stream> {
    connection: Connection<Stream>,
    state: SessionState,
    transaction: Transaction,
    mail: Option<Box<Mail>>,
    config: Arc<SessionConfig>,
    watchdog: Watchdog,
    mode: Mode,
    /// Set when a response was written for the current command.
    responded: bool,
    ended: bool,
    started: Instant,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn create(stream: Stream, peer: SocketAddr, config: Arc<SessionConfig>) -> Self {
        let mut state = SessionState::new(peer);
        state.relaying_allowed = config.policy.is_relaying_allowed(state.remote_ip);
        state.auth_required = config.policy.is_auth_required(state.remote_ip);

        let started = Instant::now();
        let lifetime = config.timeouts.connection();
        let mut watchdog = Watchdog::new(config.timeouts.idle());
        if !lifetime.is_zero()
            && let Some(limit) = started.checked_add(lifetime)
        {
            watchdog = watchdog.with_limit(limit);
        }

        Self {
            connection: Connection::new(stream, config.max_line_length),
            state,
            transaction: Transaction::default(),
            mail: None,
            watchdog,
            config,
            mode: Mode::Command,
            responded: false,
            ended: false,
            started,
        }
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Drive the connection until the client leaves, the session ends, or
    /// the server shuts down. The stream is always closed afterwards.
    ///
    /// # Errors
    ///
    /// I/O failures, an idle timeout, or exceeding the maximum connection
    /// lifetime.
    #[tracing::instrument(
        level = "trace",
        skip_all,
        fields(id = %self.state.id, peer = %self.state.peer)
    )]
    pub async fn run(mut self, mut signal: Receiver<Signal>) -> Result<(), SessionError> {
        internal!(
            level = INFO,
            "Connection from {} ({})",
            self.state.remote_host,
            self.state.remote_ip
        );

        let result = self.serve(&mut signal).await;

        if let Err(err) = &result {
            internal!(
                level = WARN,
                "Connection with {} ({}) failed: {err}",
                self.state.remote_host,
                self.state.remote_ip
            );
        }

        self.close().await;
        result
    }

    async fn serve(&mut self, signal: &mut Receiver<Signal>) -> Result<(), SessionError> {
        self.greet().await?;

        if self.run_connect_handlers().await? {
            return Ok(());
        }

        self.watchdog.reset();
        let mut listening = true;

        while !self.ended {
            self.check_lifetime()?;

            let read = tokio::select! {
                sig = signal.recv(), if listening => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            self.shutting_down().await;
                            return Ok(());
                        }
                        Err(RecvError::Closed) => listening = false,
                        Err(RecvError::Lagged(_)) => {}
                    }
                    continue;
                }
                read = self.watchdog.guard(self.connection.read_line()) => read,
            };

            match read {
                Err(_) => return Err(self.expired()),
                Ok(Ok(None)) => {
                    internal!(level = DEBUG, "Client closed the connection");
                    break;
                }
                Ok(Ok(Some(line))) => self.dispatch(&line).await?,
                Ok(Err(ReadError::BareLineEnding { position })) => {
                    self.reply(Response::new(
                        Status::SyntaxError,
                        format!(
                            "Syntax error at character position {position}. CR and LF must be CRLF paired."
                        ),
                    ))
                    .await?;
                }
                Ok(Err(ReadError::LineTooLong { .. })) => {
                    self.reply(Response::enhanced(
                        Status::Unrecognised,
                        enhanced::SYNTAX_ERROR,
                        "Line too long",
                    ))
                    .await?;
                }
                Ok(Err(ReadError::Io(err))) => return Err(err.into()),
            }
        }

        Ok(())
    }

    async fn greet(&mut self) -> Result<(), SessionError> {
        let greeting = format!(
            "{} SMTP Server ({SOFTWARE}) ready {}",
            self.config.hostname,
            chrono::Utc::now().to_rfc2822()
        );

        self.reply(Response::new(Status::ServiceReady, greeting)).await
    }

    /// Returns `true` if a handler ended the session.
    async fn run_connect_handlers(&mut self) -> Result<bool, SessionError> {
        let chain = Arc::clone(&self.config.chain);

        for handler in chain.connect_handlers() {
            if matches!(handler.on_connect(self).await?, Outcome::EndSession) {
                self.ended = true;
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// The error for a guarded read that ran out of time.
    fn expired(&self) -> SessionError {
        match self.check_lifetime() {
            Err(err) => err,
            Ok(()) => {
                internal!(level = ERROR, "SMTP Connection has idled out");
                SessionError::Timeout(self.config.timeouts.idle_secs)
            }
        }
    }

    fn check_lifetime(&self) -> Result<(), SessionError> {
        let lifetime = self.config.timeouts.connection();
        let elapsed = self.started.elapsed();

        if !lifetime.is_zero() && elapsed >= lifetime {
            tracing::warn!(
                peer = %self.state.peer,
                duration_secs = elapsed.as_secs(),
                max_secs = lifetime.as_secs(),
                "Connection exceeded maximum lifetime, closing"
            );
            return Err(SessionError::Lifetime(lifetime.as_secs()));
        }

        Ok(())
    }

    /// Process one command line: command handlers, then message handlers and
    /// delivery if a mail was completed, then transaction cleanup.
    pub async fn dispatch(&mut self, line: &str) -> Result<(), SessionError> {
        self.mode = Mode::Command;
        self.responded = false;

        incoming!("{line}");
        let command = Command::parse(line);
        let chain = Arc::clone(&self.config.chain);

        let Some(handlers) = chain.command_handlers(command.verb()) else {
            return self.unknown_command(&command).await;
        };

        for handler in handlers {
            let outcome = handler.on_command(self, &command).await?;
            self.watchdog.reset();
            self.apply(outcome);

            if self.mode != Mode::Command {
                break;
            }
        }

        if self.mode == Mode::MessageReceived
            && let Some(mut mail) = self.mail.take()
        {
            for handler in chain.message_handlers() {
                match handler.on_message(self, &mut mail).await? {
                    Outcome::MessageAborted => self.mode = Mode::MessageAbort,
                    Outcome::EndSession => {
                        self.mode = Mode::MessageAbort;
                        self.ended = true;
                    }
                    Outcome::Continue | Outcome::Responded | Outcome::MessageReady(_) => {}
                }

                if self.mode == Mode::MessageAbort {
                    break;
                }
            }

            if self.mode == Mode::MessageReceived {
                self.deliver(&mail).await?;
            }

            self.mail = Some(mail);
        }

        if self.mail.take().is_some() {
            self.transaction.reset();
        }

        Ok(())
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Continue if self.responded => self.mode = Mode::Response,
            Outcome::Continue => {}
            Outcome::Responded => self.mode = Mode::Response,
            Outcome::MessageReady(mail) => {
                self.mail = Some(mail);
                self.mode = Mode::MessageReceived;
            }
            Outcome::MessageAborted => self.mode = Mode::MessageAbort,
            Outcome::EndSession => {
                self.ended = true;
                self.mode = Mode::Response;
            }
        }
    }

    async fn unknown_command(&mut self, command: &Command) -> Result<(), SessionError> {
        match self.config.unknown_command {
            UnknownCommand::Close => {
                internal!(
                    level = DEBUG,
                    "No handlers registered for {}, closing session",
                    command.verb()
                );
                self.ended = true;
                Ok(())
            }
            UnknownCommand::Reject => {
                self.reply(Response::enhanced(
                    Status::Unrecognised,
                    enhanced::INVALID_COMMAND,
                    "Command unrecognized",
                ))
                .await
            }
        }
    }

    async fn deliver(&mut self, mail: &Mail) -> Result<(), SessionError> {
        let sink = Arc::clone(&self.config.sink);
        let response = delivery::hand_off(
            sink.as_ref(),
            mail,
            &mut self.transaction,
            self.config.max_message_size,
        )
        .await;

        self.reply(response).await
    }

    async fn shutting_down(&mut self) {
        let response = Response::enhanced(
            Status::Unavailable,
            enhanced::SYSTEM_SHUTDOWN,
            format!("{} Service shutting down", self.config.hostname),
        );

        if let Err(err) = self.reply(response).await {
            internal!(level = DEBUG, "Unable to notify client of shutdown: {err}");
        }
        self.ended = true;
    }

    async fn close(&mut self) {
        self.watchdog.stop();

        if let Err(err) = self.connection.shutdown().await {
            internal!(level = DEBUG, "Error closing socket: {err}");
        }

        internal!("Connection closed");
    }
}

#[async_trait]
impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> SmtpSession for Session<Stream> {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    fn reset_transaction(&mut self) {
        self.transaction.reset();
        self.mail = None;
    }

    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn keep_alive(&mut self) {
        self.watchdog.reset();
    }

    async fn reply(&mut self, response: Response) -> Result<(), SessionError> {
        self.connection.respond(&response).await?;
        self.responded = true;
        Ok(())
    }

    async fn read_data_line(&mut self, limit: usize) -> Result<Option<DataLine>, SessionError> {
        match self
            .watchdog
            .guard(self.connection.read_data_line(limit))
            .await
        {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(ReadError::Io(err))) => Err(err.into()),
            Ok(Err(err)) => Err(SessionError::Protocol(err.to_string())),
            Err(_) => Err(self.expired()),
        }
    }
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static> SessionHandler for Session<Stream> {
    fn run(
        self,
        signal: Receiver<Signal>,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send {
        Self::run(self, signal)
    }
}
