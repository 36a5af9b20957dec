//! RFC 5321 path and mailbox parsing for `MAIL FROM` and `RCPT TO`.
//!
//! ```text
//! Reverse-path   = Path / "<>"
//! Forward-path   = Path
//! Path           = "<" [ A-d-l ":" ] Mailbox ">"
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! ```
//!
//! Source routes are accepted and discarded.

use std::{
    fmt::{self, Display},
    net::{Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_PATH: usize = 256;
const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,
    #[error("Path exceeds {MAX_PATH} octets")]
    PathTooLong,
    #[error("Local-part exceeds {MAX_LOCAL_PART} octets")]
    LocalPartTooLong,
    #[error("Domain exceeds {MAX_DOMAIN} octets")]
    DomainTooLong,
    #[error("Path must be enclosed in '<' and '>'")]
    MissingBrackets,
    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,
    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),
}

type Result<T> = std::result::Result<T, AddressError>;

/// A mailbox, `local-part@domain`, where the domain may be an address literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub local_part: String,
    pub domain: String,
}

impl Address {
    /// Whether the domain is a bracketed address literal such as `[192.0.2.1]`.
    pub fn is_literal(&self) -> bool {
        self.domain.starts_with('[')
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self> {
        let at = split_point(input)?;
        let (local, domain) = (&input[..at], &input[at + 1..]);

        if local.len() > MAX_LOCAL_PART {
            return Err(AddressError::LocalPartTooLong);
        }
        if domain.len() > MAX_DOMAIN {
            return Err(AddressError::DomainTooLong);
        }

        validate_local_part(local)?;
        if domain.starts_with('[') {
            validate_literal(domain)?;
        } else {
            validate_domain(domain)?;
        }

        Ok(Self {
            local_part: local.to_string(),
            domain: domain.to_string(),
        })
    }
}

/// The argument of `MAIL FROM`: either a mailbox or the null sender `<>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReversePath {
    Null,
    Mailbox(Address),
}

impl ReversePath {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn mailbox(&self) -> Option<&Address> {
        match self {
            Self::Null => None,
            Self::Mailbox(address) => Some(address),
        }
    }
}

impl Display for ReversePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<>"),
            Self::Mailbox(address) => write!(f, "<{address}>"),
        }
    }
}

/// Parse a reverse-path, e.g. `<user@example.com>` or `<>`.
///
/// # Errors
///
/// Returns an [`AddressError`] describing the first violation found.
pub fn parse_reverse_path(input: &str) -> Result<ReversePath> {
    let inner = unwrap_path(input)?;
    if inner.is_empty() {
        return Ok(ReversePath::Null);
    }

    strip_source_route(inner).parse().map(ReversePath::Mailbox)
}

/// Parse a forward-path, e.g. `<user@example.com>`. The null path is rejected.
///
/// # Errors
///
/// Returns an [`AddressError`] describing the first violation found.
pub fn parse_forward_path(input: &str) -> Result<Address> {
    let inner = unwrap_path(input)?;
    if inner.is_empty() {
        return Err(AddressError::Empty);
    }

    strip_source_route(inner).parse()
}

fn unwrap_path(input: &str) -> Result<&str> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AddressError::Empty);
    }
    if input.len() > MAX_PATH {
        return Err(AddressError::PathTooLong);
    }

    input
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or(AddressError::MissingBrackets)
}

/// `@relay1,@relay2:user@example.com` → `user@example.com`
fn strip_source_route(path: &str) -> &str {
    if !path.starts_with('@') {
        return path;
    }

    path.split_once(':').map_or(path, |(_, mailbox)| mailbox)
}

/// Position of the `@` separating local-part and domain, skipping quoted text.
fn split_point(input: &str) -> Result<usize> {
    let mut quoted = false;
    let mut escaped = false;

    for (idx, byte) in input.bytes().enumerate() {
        match byte {
            _ if escaped => escaped = false,
            b'\\' if quoted => escaped = true,
            b'"' => quoted = !quoted,
            b'@' if !quoted => return Ok(idx),
            _ => {}
        }
    }

    Err(AddressError::MissingAtSign)
}

const fn is_atext(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'/'
                | b'='
                | b'?'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'|'
                | b'}'
                | b'~'
        )
}

fn validate_local_part(local: &str) -> Result<()> {
    if local.is_empty() {
        return Err(AddressError::InvalidLocalPart("empty".to_string()));
    }

    if let Some(quoted) = local.strip_prefix('"') {
        let content = quoted
            .strip_suffix('"')
            .ok_or_else(|| AddressError::InvalidLocalPart("unclosed quote".to_string()))?;

        let mut bytes = content.bytes();
        while let Some(byte) = bytes.next() {
            let valid = match byte {
                b'\\' => bytes.next().is_some_and(|next| (32..=126).contains(&next)),
                b'"' => false,
                other => (32..=126).contains(&other),
            };
            if !valid {
                return Err(AddressError::InvalidLocalPart(format!(
                    "invalid quoted content in {local}"
                )));
            }
        }

        return Ok(());
    }

    for atom in local.split('.') {
        if atom.is_empty() {
            return Err(AddressError::InvalidLocalPart(format!(
                "empty atom in {local}"
            )));
        }
        if let Some(bad) = atom.chars().find(|ch| !ch.is_ascii() || !is_atext(*ch as u8)) {
            return Err(AddressError::InvalidLocalPart(format!(
                "invalid character '{bad}'"
            )));
        }
    }

    Ok(())
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(AddressError::InvalidDomain("empty".to_string()));
    }

    for label in domain.split('.') {
        let bytes = label.as_bytes();
        let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
            return Err(AddressError::InvalidDomain(format!(
                "empty label in {domain}"
            )));
        };

        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(AddressError::InvalidDomain(format!(
                "label '{label}' must start and end with a letter or digit"
            )));
        }

        if !bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-') {
            return Err(AddressError::InvalidDomain(format!(
                "invalid character in label '{label}'"
            )));
        }
    }

    Ok(())
}

fn validate_literal(literal: &str) -> Result<()> {
    let inner = literal
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| AddressError::InvalidAddressLiteral(literal.to_string()))?;

    let valid = inner.strip_prefix("IPv6:").map_or_else(
        || inner.parse::<Ipv4Addr>().is_ok(),
        |v6| v6.parse::<Ipv6Addr>().is_ok(),
    );

    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidAddressLiteral(literal.to_string()))
    }
}
