//! Commands that answer without inspecting the transaction.

use async_trait::async_trait;
use postern_common::{
    error::SessionError,
    status::{Status, enhanced},
};

use crate::{
    command::Command,
    handler::{CommandHandler, Outcome},
    response::Response,
    session::{SOFTWARE, SmtpSession},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct Rset;

#[async_trait]
impl CommandHandler for Rset {
    fn commands(&self) -> &'static [&'static str] {
        &["RSET"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        _command: &Command,
    ) -> Result<Outcome, SessionError> {
        session.reset_transaction();
        session
            .reply(Response::enhanced(Status::Ok, enhanced::UNDEFINED, "OK"))
            .await?;
        Ok(Outcome::Responded)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

#[async_trait]
impl CommandHandler for Noop {
    fn commands(&self) -> &'static [&'static str] {
        &["NOOP"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        _command: &Command,
    ) -> Result<Outcome, SessionError> {
        session
            .reply(Response::enhanced(Status::Ok, enhanced::UNDEFINED, "OK"))
            .await?;
        Ok(Outcome::Responded)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Quit;

#[async_trait]
impl CommandHandler for Quit {
    fn commands(&self) -> &'static [&'static str] {
        &["QUIT"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        _command: &Command,
    ) -> Result<Outcome, SessionError> {
        let text = format!(
            "{} Service closing transmission channel",
            session.config().hostname
        );

        session
            .reply(Response::enhanced(Status::GoodBye, enhanced::UNDEFINED, text))
            .await?;
        Ok(Outcome::EndSession)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Vrfy;

#[async_trait]
impl CommandHandler for Vrfy {
    fn commands(&self) -> &'static [&'static str] {
        &["VRFY"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        _command: &Command,
    ) -> Result<Outcome, SessionError> {
        session
            .reply(Response::enhanced(
                Status::CannotVerify,
                enhanced::CANNOT_VERIFY,
                "Cannot VRFY user, but will accept message and attempt delivery",
            ))
            .await?;
        Ok(Outcome::Responded)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Expn;

#[async_trait]
impl CommandHandler for Expn {
    fn commands(&self) -> &'static [&'static str] {
        &["EXPN"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        _command: &Command,
    ) -> Result<Outcome, SessionError> {
        session
            .reply(Response::enhanced(
                Status::NotImplemented,
                enhanced::SYSTEM_NOT_CAPABLE,
                "EXPN is not supported",
            ))
            .await?;
        Ok(Outcome::Responded)
    }
}

/// Lists every verb registered in the session's chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct Help;

#[async_trait]
impl CommandHandler for Help {
    fn commands(&self) -> &'static [&'static str] {
        &["HELP"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        _command: &Command,
    ) -> Result<Outcome, SessionError> {
        let commands = session.config().chain.commands().join(" ");
        let response = Response::multiline(
            Status::HelpMessage,
            [
                format!("This is {SOFTWARE}"),
                "Supported commands:".to_string(),
                commands,
                "End of HELP info".to_string(),
            ],
        );

        session.reply(response).await?;
        Ok(Outcome::Responded)
    }
}
