use std::fmt::{Display, Write};

use postern_common::outgoing;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{
    error::{ConnectionResult, ReadError},
    reader::{DataLine, LineReader},
    response::Response,
};

/// The client socket: buffered line reads and CRLF terminated writes.
#[derive(Debug)]
pub struct Connection<Stream> {
    reader: LineReader<BufReader<Stream>>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Connection<Stream> {
    pub fn new(stream: Stream, max_line_length: usize) -> Self {
        Self {
            reader: LineReader::new(BufReader::new(stream), max_line_length),
        }
    }

    /// Write one line followed by CRLF. The line is not flushed.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn send<S: Display + Send + Sync>(&mut self, line: &S) -> ConnectionResult<usize> {
        // Reply lines are limited to 512 octets (RFC 5321 Section 4.5.3.1.5),
        // so most fit on the stack
        let mut buffer = arrayvec::ArrayString::<512>::new();

        let stream = self.reader.get_mut();
        if write!(&mut buffer, "{line}\r\n").is_ok() {
            stream.write_all(buffer.as_bytes()).await?;
            return Ok(buffer.len());
        }

        let mut long = String::new();
        write!(&mut long, "{line}\r\n")?;
        stream.write_all(long.as_bytes()).await?;
        Ok(long.len())
    }

    /// Write every line of `response` and flush.
    pub async fn respond(&mut self, response: &Response) -> ConnectionResult<usize> {
        let mut written = 0;

        for line in response.lines() {
            outgoing!("{line}");
            written += self.send(&line).await?;
        }

        self.reader.get_mut().flush().await?;
        Ok(written)
    }

    ///
    /// Read the next command line
    ///
    /// # Errors
    /// See [`LineReader::read_line`]
    ///
    pub async fn read_line(&mut self) -> Result<Option<String>, ReadError> {
        self.reader.read_line().await
    }

    ///
    /// Read the next line of message content
    ///
    /// # Errors
    /// See [`LineReader::read_data_line`]
    ///
    pub async fn read_data_line(&mut self, limit: usize) -> Result<Option<DataLine>, ReadError> {
        self.reader.read_data_line(limit).await
    }

    /// Flush anything pending and close the write half.
    ///
    /// # Errors
    /// If the stream could not be flushed or shut down
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        let stream = self.reader.get_mut();
        stream.flush().await?;
        stream.shutdown().await
    }
}
