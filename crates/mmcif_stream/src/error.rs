use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::{io, result, str};

use thiserror::Error;

pub type Result<T, E = ParseError> = result::Result<T, E>;

/// Longest slice of the offending line kept in an error, in characters.
pub const CONTEXT_LIMIT: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("I/O error")]
    Io,
    #[error("input was not valid UTF-8")]
    Utf8,
    #[error("input is empty")]
    EmptyInput,
    #[error("token stream is invalid")]
    InvalidToken,
    #[error("unrecognized construct")]
    UnknownConstruct,
    #[error("loop tag/value mismatch")]
    LoopMismatch,
    #[error("required table is empty")]
    EmptyTable,
    #[error("malformed text field")]
    TextField,
    #[error("value missing")]
    MissingValue,
    #[error("invalid numeric literal")]
    InvalidNumber,
    #[error("required column missing")]
    MissingColumn,
    #[error("_atom_site loop missing")]
    MissingAtomLoop,
}

#[derive(Debug)]
pub struct ParseError {
    kind: ParseErrorKind,
    message: Cow<'static, str>,
    line: Option<usize>,
    context: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            context: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 1-based line number of the logical line that triggered the error.
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Truncated copy of the offending line.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a line number and a snippet of the line, unless the error
    /// already carries a location from an earlier stage.
    pub fn at_line(mut self, line: usize, text: &[u8]) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
            self.context = (!text.is_empty()).then(|| snippet(text));
        }
        self
    }

    pub(crate) fn has_location(&self) -> bool {
        self.line.is_some()
    }
}

fn snippet(text: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(text);
    match lossy.char_indices().nth(CONTEXT_LIMIT) {
        Some((cut, _)) => lossy[..cut].to_string(),
        None => lossy.into_owned(),
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(line) = self.line {
            write!(f, " at line {line}")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " [{context}]")?;
        }
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        ParseError::new(ParseErrorKind::Io, err.to_string()).with_source(err)
    }
}

impl From<str::Utf8Error> for ParseError {
    fn from(err: str::Utf8Error) -> Self {
        ParseError::new(ParseErrorKind::Utf8, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_includes_location_and_context() {
        let err = ParseError::new(ParseErrorKind::InvalidToken, "unterminated quote")
            .at_line(12, b"_struct.title 'open");
        assert_eq!(
            err.to_string(),
            "token stream is invalid at line 12: unterminated quote [_struct.title 'open]"
        );
    }

    #[test]
    fn context_is_truncated() {
        let long = "x".repeat(200);
        let err = ParseError::new(ParseErrorKind::LoopMismatch, "too few components")
            .at_line(3, long.as_bytes());
        assert_eq!(err.context().map(str::len), Some(CONTEXT_LIMIT));
    }

    #[test]
    fn first_location_wins() {
        let err = ParseError::new(ParseErrorKind::InvalidNumber, "bad x")
            .at_line(7, b"ATOM 1")
            .at_line(40, b"loop_");
        assert_eq!(err.line(), Some(7));
        assert_eq!(err.context(), Some("ATOM 1"));
    }
}
