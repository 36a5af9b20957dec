use core::fmt::{self, Display, Formatter};

use ahash::AHashMap;

/// A client command line, split into its verb and optional argument.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Command {
    verb: String,
    argument: Option<String>,
}

impl Command {
    /// Split on the first space. The verb is uppercased; the argument is
    /// everything after that space, untouched.
    pub fn parse(line: &str) -> Self {
        line.split_once(' ').map_or_else(
            || Self {
                verb: line.to_ascii_uppercase(),
                argument: None,
            },
            |(verb, argument)| Self {
                verb: verb.to_ascii_uppercase(),
                argument: Some(argument.to_string()),
            },
        )
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// The argument with a case-insensitive `prefix` (e.g. `FROM:`) removed.
    pub fn argument_after(&self, prefix: &str) -> Option<&str> {
        let argument = self.argument()?.trim_start();
        let head = argument.get(..prefix.len())?;

        head.eq_ignore_ascii_case(prefix)
            .then(|| argument[prefix.len()..].trim())
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(argument) => write!(fmt, "{} {argument}", self.verb),
            None => fmt.write_str(&self.verb),
        }
    }
}

/// Split a `MAIL FROM`/`RCPT TO` argument into the path and its trailing
/// ESMTP parameters.
pub fn split_path(argument: &str) -> (&str, &str) {
    let argument = argument.trim();

    let end = if argument.starts_with('<') {
        argument.find('>').map(|idx| idx + 1)
    } else {
        argument.find(char::is_whitespace)
    };

    end.map_or((argument, ""), |end| {
        (&argument[..end], argument[end..].trim())
    })
}

/// ESMTP parameters for the MAIL FROM command (RFC 5321 Section 3.3).
///
/// Keys are normalised to uppercase. Parameters without a value (`FLAG`)
/// are stored with `None`.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MailParameters {
    params: AHashMap<String, Option<String>>,
}

impl MailParameters {
    /// Parses ESMTP parameters from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A parameter appears multiple times
    /// - SIZE parameter has a non-numeric value
    pub fn parse(params: &str) -> Result<Self, String> {
        let mut parsed = Self::default();

        for token in params.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .map_or((token, None), |(key, value)| (key, Some(value.to_string())));
            let key = key.to_ascii_uppercase();

            if key == "SIZE" && value.as_deref().is_none_or(|v| v.parse::<usize>().is_err()) {
                return Err(format!("Invalid SIZE parameter: {token}"));
            }

            if parsed.params.insert(key.clone(), value).is_some() {
                return Err(format!("Duplicate parameter: {key}"));
            }
        }

        Ok(parsed)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(&key.to_ascii_uppercase())
            .and_then(|value| value.as_deref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(&key.to_ascii_uppercase())
    }

    /// The declared message size, if the client sent one.
    pub fn size(&self) -> Option<usize> {
        self.get("SIZE").and_then(|size| size.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn split_on_first_space() {
        let command = Command::parse("MAIL FROM:<a@b.com>");
        assert_eq!(command.verb(), "MAIL");
        assert_eq!(command.argument(), Some("FROM:<a@b.com>"));

        let command = Command::parse("rcpt TO:<x@y.org> NOTIFY=NEVER");
        assert_eq!(command.verb(), "RCPT");
        assert_eq!(command.argument(), Some("TO:<x@y.org> NOTIFY=NEVER"));
    }

    #[test]
    fn no_space_means_no_argument() {
        let command = Command::parse("quit");
        assert_eq!(command.verb(), "QUIT");
        assert_eq!(command.argument(), None);
        assert_eq!(command.to_string(), "QUIT");
    }

    #[test]
    fn argument_after_prefix() {
        let command = Command::parse("MAIL from: <a@b.com> SIZE=10");
        assert_eq!(command.argument_after("FROM:"), Some("<a@b.com> SIZE=10"));
        assert_eq!(command.argument_after("TO:"), None);

        assert_eq!(Command::parse("MAIL").argument_after("FROM:"), None);
        assert_eq!(Command::parse("MAIL FR").argument_after("FROM:"), None);
    }

    #[test]
    fn path_and_parameters() {
        assert_eq!(split_path("<a@b.com> SIZE=10"), ("<a@b.com>", "SIZE=10"));
        assert_eq!(split_path("<>"), ("<>", ""));
        assert_eq!(split_path("a@b.com BODY=8BITMIME"), ("a@b.com", "BODY=8BITMIME"));
        assert_eq!(split_path("<unterminated"), ("<unterminated", ""));
    }

    #[test]
    fn mail_parameters() {
        let params = MailParameters::parse("size=1024 BODY=8BITMIME SMTPUTF8").unwrap();
        assert_eq!(params.size(), Some(1024));
        assert_eq!(params.get("body"), Some("8BITMIME"));
        assert!(params.contains("SMTPUTF8"));
        assert_eq!(params.get("SMTPUTF8"), None);

        assert!(MailParameters::parse("SIZE=abc").is_err());
        assert!(MailParameters::parse("SIZE").is_err());
        assert!(MailParameters::parse("BODY=7BIT body=8BITMIME").is_err());
        assert!(MailParameters::parse("").unwrap().is_empty());
    }
}
