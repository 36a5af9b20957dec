use std::{
    borrow::Cow,
    fmt::{self, Display, Formatter},
};

use postern_common::status::{EnhancedStatus, Status};

/// A reply to the client, possibly spanning several lines.
///
/// Every line carries the reply code; all but the last use `-` as the
/// separator (RFC 5321 Section 4.2.1). The enhanced status code, when
/// present, prefixes the text of every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    enhanced: Option<EnhancedStatus>,
    lines: Vec<Cow<'static, str>>,
}

impl Response {
    pub fn new(status: Status, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            enhanced: None,
            lines: vec![text.into()],
        }
    }

    pub fn enhanced(
        status: Status,
        enhanced: EnhancedStatus,
        text: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(status, text).with_enhanced(enhanced)
    }

    pub fn multiline<I, T>(status: Status, lines: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Cow<'static, str>>,
    {
        Self {
            status,
            enhanced: None,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub const fn with_enhanced(mut self, enhanced: EnhancedStatus) -> Self {
        self.enhanced = Some(enhanced);
        self
    }

    pub const fn status(&self) -> Status {
        self.status
    }

    pub fn text(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(AsRef::as_ref)
    }

    /// The wire lines of this response, without line terminators.
    pub fn lines(&self) -> impl Iterator<Item = Line<'_>> {
        let last = self.lines.len().saturating_sub(1);
        static EMPTY: [Cow<'static, str>; 1] = [Cow::Borrowed("")];

        let texts: &[Cow<'static, str>] = if self.lines.is_empty() {
            &EMPTY
        } else {
            &self.lines
        };

        texts.iter().enumerate().map(move |(idx, text)| Line {
            status: self.status,
            enhanced: self.enhanced,
            last: idx == last,
            text,
        })
    }
}

/// One formatted line of a [`Response`].
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    status: Status,
    enhanced: Option<EnhancedStatus>,
    last: bool,
    text: &'a str,
}

impl Display for Line<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        let separator = if self.last { ' ' } else { '-' };
        write!(fmt, "{}{separator}", self.status)?;

        if let Some(enhanced) = self.enhanced {
            write!(fmt, "{enhanced} ")?;
        }

        fmt.write_str(self.text)
    }
}

impl Display for Response {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        for (idx, line) in self.lines().enumerate() {
            if idx > 0 {
                fmt.write_str("\r\n")?;
            }
            Display::fmt(&line, fmt)?;
        }

        Ok(())
    }
}
