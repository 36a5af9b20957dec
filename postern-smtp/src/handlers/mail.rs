use async_trait::async_trait;
use postern_common::{
    address::parse_reverse_path,
    error::SessionError,
    internal,
    status::{Status, enhanced},
};

use crate::{
    command::{Command, MailParameters, split_path},
    handler::{CommandHandler, Outcome},
    response::Response,
    session::SmtpSession,
};

/// `MAIL FROM:<reverse-path> [parameters]`
#[derive(Debug, Default, Clone, Copy)]
pub struct MailFrom;

#[async_trait]
impl CommandHandler for MailFrom {
    fn commands(&self) -> &'static [&'static str] {
        &["MAIL"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        command: &Command,
    ) -> Result<Outcome, SessionError> {
        let response = check(session, command);
        session.reply(response).await?;
        Ok(Outcome::Responded)
    }
}

fn check(session: &mut dyn SmtpSession, command: &Command) -> Response {
    if session.state().helo.is_none() {
        return Response::enhanced(
            Status::InvalidCommandSequence,
            enhanced::INVALID_COMMAND,
            "Need HELO or EHLO before MAIL",
        );
    }

    if session.transaction().sender().is_some() {
        return Response::enhanced(
            Status::InvalidCommandSequence,
            enhanced::INVALID_COMMAND,
            "Sender already specified",
        );
    }

    let Some(argument) = command.argument_after("FROM:") else {
        return Response::enhanced(
            Status::SyntaxError,
            enhanced::INVALID_ARGUMENTS,
            "Usage: MAIL FROM:<sender>",
        );
    };

    let (path, params) = split_path(argument);

    let sender = match parse_reverse_path(path) {
        Ok(sender) => sender,
        Err(err) => {
            internal!(level = DEBUG, "Invalid sender {path}: {err}");
            return Response::enhanced(
                Status::SyntaxError,
                enhanced::BAD_SENDER_SYNTAX,
                "Syntax error in sender address",
            );
        }
    };

    let params = match MailParameters::parse(params) {
        Ok(params) => params,
        Err(err) => {
            return Response::enhanced(Status::SyntaxError, enhanced::INVALID_ARGUMENTS, err);
        }
    };

    let max = session.config().max_message_size;
    if let Some(size) = params.size()
        && max > 0
        && size > max
    {
        let state = session.state();
        internal!(
            level = ERROR,
            "Rejected message from {sender} from host {} ({}) of size {size} exceeding system maximum message size of {max} based on SIZE option",
            state.remote_host,
            state.remote_ip
        );

        return Response::enhanced(
            Status::ExceededStorage,
            enhanced::MESSAGE_TOO_BIG,
            "Message size exceeds fixed maximum message size",
        );
    }

    let response = Response::enhanced(
        Status::Ok,
        enhanced::SENDER_OK,
        format!("Sender {sender} OK"),
    );
    session.transaction_mut().set_sender(sender, params.size());
    response
}
