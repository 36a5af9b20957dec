//! Delivery of completed mail, and the replies the session sends for it.

use std::{
    fmt::Debug,
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use postern_common::{
    internal,
    status::{Status, enhanced},
};
use tokio::fs;

use crate::{error::DeliveryError, mail::Mail, response::Response, transaction::Transaction};

/// Where completed mail goes once the message handlers accept it.
///
/// A sink is shared between every session, so it must be safe to call
/// concurrently.
#[async_trait]
pub trait MailSink: Debug + Send + Sync {
    async fn deliver(&self, mail: &Mail) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<S: MailSink + ?Sized> MailSink for Arc<S> {
    async fn deliver(&self, mail: &Mail) -> Result<(), DeliveryError> {
        (**self).deliver(mail).await
    }
}

/// In-memory sink
///
/// Keeps every delivered mail. Intended for testing and for running the
/// server without any storage; an optional capacity bounds memory use.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<RwLock<Vec<Mail>>>,
    capacity: Option<usize>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// A snapshot of the delivered mail, in delivery order.
    pub fn messages(&self) -> Vec<Mail> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MailSink for MemorySink {
    async fn deliver(&self, mail: &Mail) -> Result<(), DeliveryError> {
        let mut messages = self
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(capacity) = self.capacity
            && messages.len() >= capacity
        {
            return Err(DeliveryError::Rejected(format!(
                "Memory sink capacity exceeded: {}/{capacity} messages",
                messages.len()
            )));
        }

        messages.push(mail.clone());
        Ok(())
    }
}

/// Writes each mail to `<name>.eml` in a directory.
///
/// The envelope is recorded as `Return-Path` and `Delivered-To` header
/// fields ahead of the received content. Files are written under a
/// temporary name and renamed into place once complete.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    path: PathBuf,
}

impl DirectorySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    ///
    /// Create the directory if it does not exist yet
    ///
    /// # Errors
    /// If the directory cannot be created, or the path exists but is not a directory
    ///
    pub fn init(&self) -> std::io::Result<()> {
        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(Error::new(
                ErrorKind::NotADirectory,
                format!(
                    "Expected {} to be a Directory, but it is not",
                    self.path.display()
                ),
            ));
        }

        Ok(())
    }

    fn render(mail: &Mail) -> Vec<u8> {
        let mut content = format!("Return-Path: {}\r\n", mail.sender);
        for recipient in &mail.recipients {
            content.push_str(&format!("Delivered-To: {recipient}\r\n"));
        }

        let mut content = content.into_bytes();
        content.extend_from_slice(&mail.data);
        content
    }
}

#[async_trait]
impl MailSink for DirectorySink {
    async fn deliver(&self, mail: &Mail) -> Result<(), DeliveryError> {
        let filename = format!("{}.eml", mail.name);
        let path = self.path.join(&filename);
        let temp = self.path.join(format!(".tmp_{filename}"));

        fs::write(&temp, Self::render(mail)).await?;
        fs::rename(&temp, &path).await?;

        internal!(
            level = DEBUG,
            "Wrote message {} to {}",
            mail.name,
            path.display()
        );

        Ok(())
    }
}

/// Rejects mail larger than `max` octets before it reaches the inner sink.
#[derive(Debug, Clone)]
pub struct SizeLimited<S> {
    inner: S,
    max: usize,
}

impl<S> SizeLimited<S> {
    pub const fn new(inner: S, max: usize) -> Self {
        Self { inner, max }
    }

    pub const fn max(&self) -> usize {
        self.max
    }
}

#[async_trait]
impl<S: MailSink> MailSink for SizeLimited<S> {
    async fn deliver(&self, mail: &Mail) -> Result<(), DeliveryError> {
        if mail.size > self.max {
            return Err(DeliveryError::SizeExceeded {
                size: mail.size,
                max: self.max,
            });
        }

        self.inner.deliver(mail).await
    }
}

/// Submit a completed mail and build the reply for the client.
///
/// A size rejection marks the transaction as failed so later checks can
/// tell the message was refused for its size.
pub async fn hand_off(
    sink: &dyn MailSink,
    mail: &Mail,
    transaction: &mut Transaction,
    max_message_size: usize,
) -> Response {
    match sink.deliver(mail).await {
        Ok(()) => {
            internal!(
                level = INFO,
                "Successfully spooled mail {} from {} on {} for {}",
                mail.name,
                mail.sender,
                mail.remote_ip,
                mail.recipients
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            Response::enhanced(Status::Ok, enhanced::CONTENT_OTHER, "Message received")
        }
        Err(err) if err.is_size_exceeded() => {
            transaction.mark_failed();
            internal!(
                level = ERROR,
                "Rejected message from {} from host {} ({}) exceeding system maximum message size of {}",
                mail.sender,
                mail.remote_host,
                mail.remote_ip,
                max_message_size
            );

            Response::enhanced(
                Status::ExceededStorage,
                enhanced::MESSAGE_TOO_BIG,
                format!("Error processing message: {err}"),
            )
        }
        Err(err) => {
            internal!(
                level = ERROR,
                "Unknown error occurred while processing mail {} from {}: {err}",
                mail.name,
                mail.remote_ip
            );

            Response::enhanced(
                Status::ActionUnavailable,
                enhanced::TRANSIENT_UNDEFINED,
                format!("Error processing message: {err}"),
            )
        }
    }
}
