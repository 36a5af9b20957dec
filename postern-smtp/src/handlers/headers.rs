//! Message handlers that look at, or add to, the header section.

use async_trait::async_trait;
use postern_common::{
    error::SessionError,
    internal,
    status::{Status, enhanced},
};

use crate::{
    handler::{MessageHandler, Outcome},
    mail::Mail,
    response::Response,
    session::{SOFTWARE, SmtpSession},
};

/// Rejects messages whose header section cannot be parsed.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderCheck;

impl HeaderCheck {
    fn is_valid(data: &[u8]) -> bool {
        mailparse::parse_headers(data).is_ok_and(|(headers, _)| {
            headers.iter().all(|header| {
                let key = header.get_key_ref();
                !key.is_empty()
                    && !key
                        .chars()
                        .any(|c| c.is_whitespace() || c.is_control())
            })
        })
    }
}

#[async_trait]
impl MessageHandler for HeaderCheck {
    async fn on_message(
        &self,
        session: &mut dyn SmtpSession,
        mail: &mut Mail,
    ) -> Result<Outcome, SessionError> {
        if Self::is_valid(&mail.data) {
            return Ok(Outcome::Continue);
        }

        internal!(
            level = INFO,
            "Rejected message {} from {} ({}): malformed headers",
            mail.name,
            mail.remote_host,
            mail.remote_ip
        );

        session
            .reply(Response::enhanced(
                Status::TransactionFailed,
                enhanced::MEDIA_NOT_SUPPORTED,
                "Malformed message headers",
            ))
            .await?;
        Ok(Outcome::MessageAborted)
    }
}

/// Prepends a `Received:` trace field (RFC 5321 Section 4.4).
#[derive(Debug, Default, Clone, Copy)]
pub struct ReceivedHeader;

impl ReceivedHeader {
    fn stamp(session: &dyn SmtpSession, mail: &Mail) -> String {
        let state = session.state();
        let helo = state.helo.as_deref().unwrap_or(&state.remote_host);
        let protocol = if state.extended { "ESMTP" } else { "SMTP" };

        let mut value = format!(
            "from {helo} ({} [{}])\r\n          by {} ({SOFTWARE}) with {protocol} id {}",
            state.remote_host,
            state.remote_ip,
            session.config().hostname,
            mail.name
        );

        if let [recipient] = mail.recipients.as_slice() {
            value.push_str(&format!("\r\n          for <{recipient}>"));
        }

        value.push_str(&format!(";\r\n          {}", mail.received.to_rfc2822()));
        value
    }
}

#[async_trait]
impl MessageHandler for ReceivedHeader {
    async fn on_message(
        &self,
        session: &mut dyn SmtpSession,
        mail: &mut Mail,
    ) -> Result<Outcome, SessionError> {
        let value = Self::stamp(session, mail);
        mail.prepend_header("Received", &value);
        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::HeaderCheck;

    #[test]
    fn header_validation() {
        assert!(HeaderCheck::is_valid(b"Subject: hi\r\nFrom: a@b.com\r\n\r\nbody\r\n"));
        assert!(HeaderCheck::is_valid(
            b"Subject: a long\r\n subject\r\n\r\nbody\r\n"
        ));
        assert!(!HeaderCheck::is_valid(b"Bad Header: x\r\n\r\nbody\r\n"));
    }
}
