//! State accumulated between `MAIL FROM` and the end of the message.

use ahash::AHashMap;
use postern_common::address::{Address, ReversePath};

/// Key into [`Transaction`] attributes, declared as a constant by the
/// handler that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeKey(&'static str);

impl AttributeKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(self) -> &'static str {
        self.0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transaction {
    sender: Option<ReversePath>,
    recipients: Vec<Address>,
    declared_size: Option<usize>,
    message_failed: bool,
    attributes: AHashMap<AttributeKey, String>,
}

impl Transaction {
    pub const fn sender(&self) -> Option<&ReversePath> {
        self.sender.as_ref()
    }

    pub fn set_sender(&mut self, sender: ReversePath, declared_size: Option<usize>) {
        self.sender = Some(sender);
        self.declared_size = declared_size;
    }

    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    pub fn add_recipient(&mut self, recipient: Address) {
        self.recipients.push(recipient);
    }

    /// The size announced with `MAIL FROM ... SIZE=n`.
    pub const fn declared_size(&self) -> Option<usize> {
        self.declared_size
    }

    /// Set once delivery rejected the message for its size.
    pub const fn message_failed(&self) -> bool {
        self.message_failed
    }

    /// Advisory only: the engine never branches on it, and the reset after
    /// delivery clears it with the rest of the transaction.
    pub const fn mark_failed(&mut self) {
        self.message_failed = true;
    }

    pub fn attribute(&self, key: AttributeKey) -> Option<&str> {
        self.attributes.get(&key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: AttributeKey, value: impl Into<String>) -> Option<String> {
        self.attributes.insert(key, value.into())
    }

    pub fn remove_attribute(&mut self, key: AttributeKey) -> Option<String> {
        self.attributes.remove(&key)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (AttributeKey, &str)> {
        self.attributes.iter().map(|(key, value)| (*key, value.as_str()))
    }

    /// Whether nothing has been recorded since the last reset.
    pub fn is_empty(&self) -> bool {
        self.sender.is_none()
            && self.recipients.is_empty()
            && self.declared_size.is_none()
            && !self.message_failed
            && self.attributes.is_empty()
    }

    /// Clear everything. Resetting an empty transaction is a no-op.
    pub fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.declared_size = None;
        self.message_failed = false;
        self.attributes.clear();
    }
}
