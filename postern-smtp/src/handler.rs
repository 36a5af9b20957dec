//! The three kinds of handler a [`HandlerChain`](crate::chain::HandlerChain)
//! dispatches to, and what they report back to the session.

use std::fmt::Debug;

use async_trait::async_trait;
use postern_common::error::SessionError;

use crate::{command::Command, mail::Mail, session::SmtpSession};

/// Returned by every handler invocation; the session derives its [`Mode`]
/// from it.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing happened; the next handler runs.
    Continue,
    /// A response was written for the current command.
    Responded,
    /// A message was completed and should go through message handlers and
    /// delivery.
    MessageReady(Box<Mail>),
    /// A message handler rejected the mail; it will not be delivered.
    MessageAborted,
    /// Close the connection once the current command is finished.
    EndSession,
}

/// Where the session is within the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Waiting for, or still dispatching, a command.
    #[default]
    Command,
    /// A handler responded; remaining handlers for the command are skipped.
    Response,
    /// A mail was completed and is awaiting message handlers and delivery.
    MessageReceived,
    /// A message handler rejected the mail.
    MessageAbort,
}

/// Runs once per connection, after the greeting.
#[async_trait]
pub trait ConnectHandler: Debug + Send + Sync {
    async fn on_connect(&self, session: &mut dyn SmtpSession) -> Result<Outcome, SessionError>;
}

/// Runs for each command whose verb it is registered under.
#[async_trait]
pub trait CommandHandler: Debug + Send + Sync {
    /// The uppercase verbs this handler answers.
    fn commands(&self) -> &'static [&'static str];

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        command: &Command,
    ) -> Result<Outcome, SessionError>;
}

/// Runs for each completed mail, before delivery.
#[async_trait]
pub trait MessageHandler: Debug + Send + Sync {
    async fn on_message(
        &self,
        session: &mut dyn SmtpSession,
        mail: &mut Mail,
    ) -> Result<Outcome, SessionError>;
}
