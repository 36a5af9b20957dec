//! CRLF line framing for the command and message phases.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::ReadError;

/// One line of message content, with the line terminator removed.
///
/// `content` holds at most the number of octets the caller asked to buffer,
/// while `length` counts every octet the client actually sent on the line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataLine {
    pub content: Vec<u8>,
    pub length: usize,
}

impl DataLine {
    fn push(&mut self, byte: u8, limit: usize) {
        self.length += 1;
        if self.content.len() < limit {
            self.content.push(byte);
        }
    }

    /// Whether the whole line was kept.
    pub fn is_complete(&self) -> bool {
        self.content.len() == self.length
    }
}

/// Reads CRLF terminated lines, reporting bare CR or LF as a framing error.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    max_line_length: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    /// `max_line_length` includes the CRLF; zero disables the limit.
    pub const fn new(inner: R, max_line_length: usize) -> Self {
        Self {
            inner,
            max_line_length,
        }
    }

    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    const fn content_limit(&self) -> usize {
        if self.max_line_length == 0 {
            usize::MAX
        } else {
            self.max_line_length.saturating_sub(2)
        }
    }

    /// Read one command line, trimmed of surrounding whitespace.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream. A final line
    /// without a terminator is still returned.
    ///
    /// # Errors
    ///
    /// * [`ReadError::BareLineEnding`] when a CR or LF arrives alone. The
    ///   partial line is discarded; a byte following a bare CR is left for
    ///   the next read.
    /// * [`ReadError::LineTooLong`] when the line exceeds the configured
    ///   maximum. The line is consumed up to its terminator.
    /// * [`ReadError::Io`] when the stream fails.
    pub async fn read_line(&mut self) -> Result<Option<String>, ReadError> {
        let limit = self.content_limit();
        let mut line = Vec::new();
        let mut length = 0;
        let mut pending_cr = false;

        loop {
            let buf = self.inner.fill_buf().await?;

            if buf.is_empty() {
                if pending_cr {
                    return Err(ReadError::BareLineEnding { position: length });
                }
                if length == 0 {
                    return Ok(None);
                }
                return self.finish(&line, length).map(Some);
            }

            let mut consumed = 0;
            let mut terminated = None;

            for &byte in buf {
                if pending_cr {
                    // A byte after a bare CR belongs to the next line
                    terminated = Some(if byte == b'\n' {
                        consumed += 1;
                        Ok(())
                    } else {
                        Err(length)
                    });
                    break;
                }

                consumed += 1;
                match byte {
                    b'\r' => pending_cr = true,
                    b'\n' => {
                        terminated = Some(Err(length));
                        break;
                    }
                    _ => {
                        length += 1;
                        if line.len() < limit {
                            line.push(byte);
                        }
                    }
                }
            }

            self.inner.consume(consumed);

            match terminated {
                Some(Ok(())) => return self.finish(&line, length).map(Some),
                Some(Err(position)) => return Err(ReadError::BareLineEnding { position }),
                None => {}
            }
        }
    }

    fn finish(&self, line: &[u8], length: usize) -> Result<String, ReadError> {
        if length > self.content_limit() {
            return Err(ReadError::LineTooLong {
                limit: self.max_line_length,
            });
        }

        Ok(String::from_utf8_lossy(line).trim().to_string())
    }

    /// Read one line of message content, buffering at most `limit` octets.
    ///
    /// Both CRLF and a bare LF end the line; a CR that is not followed by LF
    /// is kept as content. Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Io`] when the stream fails.
    pub async fn read_data_line(&mut self, limit: usize) -> Result<Option<DataLine>, ReadError> {
        let mut line = DataLine::default();
        let mut started = false;
        let mut pending_cr = false;

        loop {
            let buf = self.inner.fill_buf().await?;

            if buf.is_empty() {
                if !started {
                    return Ok(None);
                }
                if pending_cr {
                    line.push(b'\r', limit);
                }
                return Ok(Some(line));
            }

            started = true;
            let mut consumed = 0;
            let mut terminated = false;

            for &byte in buf {
                consumed += 1;

                if byte == b'\n' {
                    terminated = true;
                    break;
                }

                if pending_cr {
                    line.push(b'\r', limit);
                }

                pending_cr = byte == b'\r';
                if !pending_cr {
                    line.push(byte, limit);
                }
            }

            self.inner.consume(consumed);

            if terminated {
                return Ok(Some(line));
            }
        }
    }
}
