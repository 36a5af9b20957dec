use async_trait::async_trait;
use postern_common::{
    error::SessionError,
    status::{Status, enhanced},
};

use crate::{
    command::Command,
    handler::{CommandHandler, Outcome},
    response::Response,
    session::SmtpSession,
};

/// `HELO` and `EHLO`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Greeting;

#[async_trait]
impl CommandHandler for Greeting {
    fn commands(&self) -> &'static [&'static str] {
        &["HELO", "EHLO"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        command: &Command,
    ) -> Result<Outcome, SessionError> {
        let Some(domain) = command.argument().map(str::trim).filter(|d| !d.is_empty()) else {
            session
                .reply(Response::enhanced(
                    Status::SyntaxError,
                    enhanced::INVALID_ARGUMENTS,
                    format!("Domain address required: {}", command.verb()),
                ))
                .await?;
            return Ok(Outcome::Responded);
        };

        let extended = command.verb() == "EHLO";
        session.reset_transaction();

        let state = session.state_mut();
        state.helo = Some(domain.to_string());
        state.extended = extended;

        let config = session.config();
        let state = session.state();
        let hello = format!(
            "{} Hello {domain} ({} [{}])",
            config.hostname, state.remote_host, state.remote_ip
        );

        let response = if extended {
            let size = if config.max_message_size == 0 {
                "SIZE".to_string()
            } else {
                format!("SIZE {}", config.max_message_size)
            };

            Response::multiline(
                Status::Ok,
                [hello, size, "8BITMIME".to_string(), "HELP".to_string()],
            )
        } else {
            Response::new(Status::Ok, hello)
        };

        session.reply(response).await?;
        Ok(Outcome::Responded)
    }
}
