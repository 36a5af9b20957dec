use async_trait::async_trait;
use postern_common::{
    address::parse_forward_path,
    error::SessionError,
    internal,
    status::{Status, enhanced},
};

use crate::{
    command::{Command, split_path},
    handler::{CommandHandler, Outcome},
    response::Response,
    session::SmtpSession,
};

/// `RCPT TO:<forward-path> [parameters]`
///
/// Parameters are accepted and ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct RcptTo;

#[async_trait]
impl CommandHandler for RcptTo {
    fn commands(&self) -> &'static [&'static str] {
        &["RCPT"]
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
    if session.transaction().sender().is_none() {
        return Response::enhanced(
            Status::InvalidCommandSequence,
            enhanced::INVALID_COMMAND,
            "Need MAIL before RCPT",
        );
    }

    let Some(argument) = command.argument_after("TO:") else {
        return Response::enhanced(
            Status::SyntaxError,
            enhanced::INVALID_ARGUMENTS,
            "Usage: RCPT TO:<recipient>",
        );
    };

    let (path, _params) = split_path(argument);
    let recipient = match parse_forward_path(path) {
        Ok(recipient) => recipient,
        Err(err) => {
            internal!(level = DEBUG, "Invalid recipient {path}: {err}");
            return Response::enhanced(
                Status::SyntaxError,
                enhanced::BAD_DESTINATION_SYNTAX,
                "Syntax error in recipient address",
            );
        }
    };

    let state = session.state();
    if state.blocklisted && state.user.is_none() {
        internal!(
            level = INFO,
            "Rejected recipient {recipient} from blocklisted host {} ({})",
            state.remote_host,
            state.remote_ip
        );

        return Response::enhanced(
            Status::TransactionFailed,
            enhanced::DELIVERY_NOT_AUTHORISED,
            format!(
                "Rejected: unauthenticated e-mail from {} is restricted. Contact the postmaster for details.",
                state.remote_ip
            ),
        );
    }

    let local = session.config().policy.is_local_domain(&recipient.domain);
    if !local && !state.relaying_allowed {
        if state.auth_required && state.user.is_none() {
            return Response::enhanced(
                Status::AuthenticationRequired,
                enhanced::DELIVERY_NOT_AUTHORISED,
                "Authentication Required",
            );
        }

        if !state.auth_required {
            internal!(
                level = INFO,
                "Rejected relay to {recipient} from {} ({})",
                state.remote_host,
                state.remote_ip
            );

            return Response::enhanced(
                Status::Error,
                enhanced::DELIVERY_NOT_AUTHORISED,
                "Requested action not taken: relaying denied",
            );
        }
    }

    let response = Response::enhanced(
        Status::Ok,
        enhanced::RECIPIENT_OK,
        format!("Recipient <{recipient}> OK"),
    );
    session.transaction_mut().add_recipient(recipient);
    response
}
