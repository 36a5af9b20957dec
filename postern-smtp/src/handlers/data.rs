use async_trait::async_trait;
use postern_common::{
    address::ReversePath,
    error::SessionError,
    internal,
    status::{Status, enhanced},
};

use crate::{
    command::Command,
    handler::{CommandHandler, Outcome},
    mail::Mail,
    response::Response,
    session::SmtpSession,
};

/// Upper bound on the buffer reserved up front from a declared `SIZE`.
const PREALLOCATE_MAX: usize = 1024 * 1024;

/// `DATA`: collect the message content into a [`Mail`].
///
/// Content past the maximum message size is counted but not kept, so that
/// delivery can reject the message once the client has finished sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Data;

#[async_trait]
impl CommandHandler for Data {
    fn commands(&self) -> &'static [&'static str] {
        &["DATA"]
    }

    async fn on_command(
        &self,
        session: &mut dyn SmtpSession,
        command: &Command,
    ) -> Result<Outcome, SessionError> {
        if let Some(response) = check(session, command) {
            session.reply(response).await?;
            return Ok(Outcome::Responded);
        }

        let mut mail = {
            let state = session.state();
            let transaction = session.transaction();

            let mut mail = Mail::new(
                transaction.sender().cloned().unwrap_or(ReversePath::Null),
                transaction.recipients().to_vec(),
                state.remote_host.clone(),
                state.remote_ip,
            );
            mail.helo.clone_from(&state.helo);

            if let Some(declared) = transaction.declared_size() {
                let max = session.config().max_message_size;
                let cap = if max == 0 { PREALLOCATE_MAX } else { max.min(PREALLOCATE_MAX) };
                mail.data.reserve(declared.min(cap));
            }
            mail
        };

        session
            .reply(Response::new(
                Status::StartMailInput,
                "Ok Send data ending with <CRLF>.<CRLF>",
            ))
            .await?;

        if !receive(session, &mut mail).await? {
            let state = session.state();
            internal!(
                level = INFO,
                "Connection from {} ({}) closed during DATA",
                state.remote_host,
                state.remote_ip
            );
            return Ok(Outcome::EndSession);
        }

        Ok(Outcome::MessageReady(Box::new(mail)))
    }
}

fn check(session: &dyn SmtpSession, command: &Command) -> Option<Response> {
    let transaction = session.transaction();

    if transaction.sender().is_none() {
        return Some(Response::enhanced(
            Status::InvalidCommandSequence,
            enhanced::INVALID_COMMAND,
            "No sender specified",
        ));
    }

    if transaction.recipients().is_empty() {
        return Some(Response::enhanced(
            Status::InvalidCommandSequence,
            enhanced::INVALID_COMMAND,
            "No recipients specified",
        ));
    }

    if command.argument().is_some_and(|arg| !arg.trim().is_empty()) {
        return Some(Response::enhanced(
            Status::SyntaxError,
            enhanced::INVALID_ARGUMENTS,
            "Usage: DATA",
        ));
    }

    None
}

/// Read lines up to the terminating `.` line. Returns `false` if the client
/// went away first.
async fn receive(session: &mut dyn SmtpSession, mail: &mut Mail) -> Result<bool, SessionError> {
    let max = session.config().max_message_size;
    let mut overflowed = false;

    loop {
        let limit = if max == 0 {
            usize::MAX
        } else {
            max.saturating_sub(mail.data.len()) + 1
        };

        let Some(line) = session.read_data_line(limit).await? else {
            return Ok(false);
        };
        session.keep_alive();

        if line.length == 1 && line.content == b"." {
            return Ok(true);
        }

        let complete = line.is_complete();
        let mut content = line.content;
        let mut length = line.length;

        if content.first() == Some(&b'.') {
            content.remove(0);
            length -= 1;
        }

        mail.size += length + 2;

        if overflowed {
            continue;
        }

        if max == 0 || (complete && mail.data.len() + length + 2 <= max) {
            mail.data.extend_from_slice(&content);
            mail.data.extend_from_slice(b"\r\n");
        } else {
            overflowed = true;
            let state = session.state();
            internal!(
                level = WARN,
                "Message from {} ({}) exceeds maximum message size of {max}, discarding remaining content",
                state.remote_host,
                state.remote_ip
            );
        }
    }
}
