use core::fmt::{self, Display, Formatter};

/// SMTP reply codes used by the server (RFC 5321 Section 4.2).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    HelpMessage,
    ServiceReady,
    GoodBye,
    Ok,
    CannotVerify,
    StartMailInput,
    Unavailable,
    ActionUnavailable,
    Unrecognised,
    SyntaxError,
    NotImplemented,
    InvalidCommandSequence,
    AuthenticationRequired,
    Error,
    ExceededStorage,
    TransactionFailed,
    Unknown(u32),
}

impl Status {
    /// Checks if the status is a permanent rejection
    pub fn is_permanent(self) -> bool {
        u32::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u32::from(self))
    }

    /// Checks if the status reports success (2xx) or an intermediate reply (3xx)
    pub fn is_positive(self) -> bool {
        u32::from(self) < 400
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            214 => Self::HelpMessage,
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            250 => Self::Ok,
            252 => Self::CannotVerify,
            354 => Self::StartMailInput,
            421 => Self::Unavailable,
            451 => Self::ActionUnavailable,
            500 => Self::Unrecognised,
            501 => Self::SyntaxError,
            502 => Self::NotImplemented,
            503 => Self::InvalidCommandSequence,
            530 => Self::AuthenticationRequired,
            550 => Self::Error,
            552 => Self::ExceededStorage,
            554 => Self::TransactionFailed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::HelpMessage => 214,
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::Ok => 250,
            Status::CannotVerify => 252,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::ActionUnavailable => 451,
            Status::Unrecognised => 500,
            Status::SyntaxError => 501,
            Status::NotImplemented => 502,
            Status::InvalidCommandSequence => 503,
            Status::AuthenticationRequired => 530,
            Status::Error => 550,
            Status::ExceededStorage => 552,
            Status::TransactionFailed => 554,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}

/// Enhanced mail system status code (RFC 3463), rendered as `class.subject.detail`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EnhancedStatus {
    class: u8,
    subject: u16,
    detail: u16,
}

impl EnhancedStatus {
    pub const fn success(subject: u16, detail: u16) -> Self {
        Self {
            class: 2,
            subject,
            detail,
        }
    }

    pub const fn transient(subject: u16, detail: u16) -> Self {
        Self {
            class: 4,
            subject,
            detail,
        }
    }

    pub const fn permanent(subject: u16, detail: u16) -> Self {
        Self {
            class: 5,
            subject,
            detail,
        }
    }

    pub const fn class(self) -> u8 {
        self.class
    }
}

impl Display for EnhancedStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// Commonly used enhanced status codes.
pub mod enhanced {
    use super::EnhancedStatus;

    pub const UNDEFINED: EnhancedStatus = EnhancedStatus::success(0, 0);
    pub const SENDER_OK: EnhancedStatus = EnhancedStatus::success(1, 0);
    pub const RECIPIENT_OK: EnhancedStatus = EnhancedStatus::success(1, 5);
    pub const CANNOT_VERIFY: EnhancedStatus = EnhancedStatus::success(5, 2);
    pub const CONTENT_OTHER: EnhancedStatus = EnhancedStatus::success(6, 0);

    pub const TRANSIENT_UNDEFINED: EnhancedStatus = EnhancedStatus::transient(0, 0);
    pub const SYSTEM_SHUTDOWN: EnhancedStatus = EnhancedStatus::transient(3, 2);

    pub const BAD_DESTINATION_SYNTAX: EnhancedStatus = EnhancedStatus::permanent(1, 3);
    pub const BAD_SENDER_SYNTAX: EnhancedStatus = EnhancedStatus::permanent(1, 7);
    pub const SYSTEM_NOT_CAPABLE: EnhancedStatus = EnhancedStatus::permanent(3, 3);
    pub const MESSAGE_TOO_BIG: EnhancedStatus = EnhancedStatus::permanent(3, 4);
    pub const INVALID_COMMAND: EnhancedStatus = EnhancedStatus::permanent(5, 1);
    pub const SYNTAX_ERROR: EnhancedStatus = EnhancedStatus::permanent(5, 2);
    pub const INVALID_ARGUMENTS: EnhancedStatus = EnhancedStatus::permanent(5, 4);
    pub const MEDIA_NOT_SUPPORTED: EnhancedStatus = EnhancedStatus::permanent(6, 0);
    pub const DELIVERY_NOT_AUTHORISED: EnhancedStatus = EnhancedStatus::permanent(7, 1);
}

#[cfg(test)]
mod test {
    use super::{EnhancedStatus, Status, enhanced};

    #[test]
    fn status() {
        assert!(Status::Error.is_permanent());
        assert!(!Status::Error.is_temporary());

        assert!(Status::Unavailable.is_temporary());
        assert!(!Status::Unavailable.is_permanent());

        assert!(Status::StartMailInput.is_positive());
        assert!(!Status::ActionUnavailable.is_positive());

        assert_eq!(Status::from(552), Status::ExceededStorage);
        assert_eq!(u32::from(Status::ActionUnavailable), 451);
        assert_eq!(Status::from(299), Status::Unknown(299));
        assert_eq!(Status::Unknown(299).to_string(), "299");
    }

    #[test]
    fn enhanced_status_display() {
        assert_eq!(enhanced::CONTENT_OTHER.to_string(), "2.6.0");
        assert_eq!(enhanced::MESSAGE_TOO_BIG.to_string(), "5.3.4");
        assert_eq!(enhanced::TRANSIENT_UNDEFINED.to_string(), "4.0.0");
        assert_eq!(EnhancedStatus::permanent(7, 1).class(), 5);
    }
}
