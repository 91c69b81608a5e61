//! Comment-stripping line scanner.
//!
//! Turns a byte stream into cleaned logical lines: trimmed, non-blank, and
//! not starting with `#`. The scanner owns the only copy of the current line
//! and latches the first fatal error; once latched, every later `advance`
//! reports [`Step::Failed`] so no caller can keep consuming a bad stream.

use std::io::{self, BufRead};

use crate::error::{ParseError, ParseErrorKind};

/// Outcome of [`LineScanner::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Line,
    Eof,
    Failed,
}

pub(crate) struct LineScanner<R> {
    reader: R,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    line_number: usize,
    bytes_read: u64,
    has_line: bool,
    at_eof: bool,
    error: Option<ParseError>,
}

impl<R: BufRead> LineScanner<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            start: 0,
            end: 0,
            line_number: 0,
            bytes_read: 0,
            has_line: false,
            at_eof: false,
            error: None,
        }
    }

    /// Move to the next logical line.
    pub(crate) fn advance(&mut self) -> Step {
        if self.error.is_some() {
            return Step::Failed;
        }
        if self.at_eof {
            return Step::Eof;
        }
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.has_line = false;
                    self.at_eof = true;
                    if self.bytes_read == 0 {
                        self.fail(ParseError::new(
                            ParseErrorKind::EmptyInput,
                            "zero-length input, nothing to parse",
                        ));
                        return Step::Failed;
                    }
                    return Step::Eof;
                }
                Ok(read) => {
                    self.bytes_read += read as u64;
                    self.line_number += 1;
                    let (start, end) = trim_bounds(&self.buf);
                    if start == end || self.buf[start] == b'#' {
                        continue;
                    }
                    self.start = start;
                    self.end = end;
                    self.has_line = true;
                    return Step::Line;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.has_line = false;
                    let line = self.line_number + 1;
                    self.fail(ParseError::from(err).at_line(line, b""));
                    return Step::Failed;
                }
            }
        }
    }

    /// Current logical line, or an empty slice when positioned past the end.
    pub(crate) fn line(&self) -> &[u8] {
        if self.has_line {
            &self.buf[self.start..self.end]
        } else {
            &[]
        }
    }

    pub(crate) fn has_line(&self) -> bool {
        self.has_line
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    /// Latch `err` unless an earlier failure is already held. The error is
    /// stamped with the current line when it carries no location yet.
    pub(crate) fn fail(&mut self, err: ParseError) {
        if self.error.is_some() {
            return;
        }
        let err = if err.has_location() {
            err
        } else {
            err.at_line(self.line_number, self.line())
        };
        self.error = Some(err);
        self.has_line = false;
    }

    pub(crate) fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn take_error(&mut self) -> Option<ParseError> {
        self.error.take()
    }
}

fn trim_bounds(bytes: &[u8]) -> (usize, usize) {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    (start, end)
}

/// True for lines that open a new construct: an item name, `loop_`, or a
/// block/frame header. Table rows never start this way unless they embed
/// such tokens unquoted, which is not supported.
pub(crate) fn is_directive(line: &[u8]) -> bool {
    match line.first() {
        Some(b'_') => true,
        Some(_) => {
            starts_with_keyword(line, b"loop_")
                || starts_with_keyword(line, b"data_")
                || starts_with_keyword(line, b"save_")
                || starts_with_keyword(line, b"global_")
        }
        None => false,
    }
}

pub(crate) fn starts_with_keyword(line: &[u8], keyword: &[u8]) -> bool {
    line.len() >= keyword.len() && line[..keyword.len()].eq_ignore_ascii_case(keyword)
}
