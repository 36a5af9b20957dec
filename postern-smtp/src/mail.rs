use std::net::IpAddr;

use chrono::{DateTime, Utc};
use postern_common::address::{Address, ReversePath};
use ulid::Ulid;

/// A completed mail transaction, ready for message handlers and delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// Unique name, also used as the file name by directory delivery.
    pub name: String,
    pub sender: ReversePath,
    pub recipients: Vec<Address>,
    /// Message content with CRLF line endings, dot-stuffing removed.
    pub data: Vec<u8>,
    /// Octets the client sent, which may exceed `data` when buffering
    /// stopped early. Headers added by the server are not counted.
    pub size: usize,
    /// Octets of headers prepended after receipt.
    prepended: usize,
    pub remote_host: String,
    pub remote_ip: IpAddr,
    pub helo: Option<String>,
    pub received: DateTime<Utc>,
}

impl Mail {
    pub fn new(
        sender: ReversePath,
        recipients: Vec<Address>,
        remote_host: String,
        remote_ip: IpAddr,
    ) -> Self {
        Self {
            name: Ulid::new().to_string(),
            sender,
            recipients,
            data: Vec::new(),
            size: 0,
            prepended: 0,
            remote_host,
            remote_ip,
            helo: None,
            received: Utc::now(),
        }
    }

    /// Whether every received octet was kept.
    pub const fn is_complete(&self) -> bool {
        self.data.len() == self.size + self.prepended
    }

    /// Insert a header field at the top of the message.
    ///
    /// `value` may contain folded continuation lines separated by CRLF.
    pub fn prepend_header(&mut self, name: &str, value: &str) {
        let mut data = format!("{name}: {value}\r\n").into_bytes();
        self.prepended += data.len();
        data.append(&mut self.data);
        self.data = data;
    }
}
