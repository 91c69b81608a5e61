//! Quote-aware splitting of one logical line into value tokens.
//!
//! Tokens are sub-slices of the line; nothing is copied. A quote opens a
//! quoted token only at the start of a token, and closes only when the same
//! quote is followed by whitespace or the end of the line, so `'O5''` style
//! names and embedded quotes of the other kind pass through verbatim.

use crate::error::{ParseError, ParseErrorKind, Result};

#[derive(Clone, Copy, Debug)]
enum State {
    Between,
    Unquoted { start: usize },
    Quoted { quote: u8, start: usize },
    Closed { quote: u8, start: usize, close: usize },
}

/// Split `line` into `out`. `out` is cleared first and left empty on error.
pub(crate) fn tokenize<'a>(line: &'a [u8], out: &mut Vec<&'a [u8]>) -> Result<()> {
    out.clear();
    let mut state = State::Between;
    for (idx, &byte) in line.iter().enumerate() {
        let blank = is_blank(byte);
        state = match state {
            State::Between if blank => State::Between,
            State::Between if is_quote(byte) => State::Quoted {
                quote: byte,
                start: idx + 1,
            },
            State::Between => State::Unquoted { start: idx },
            State::Unquoted { start } if blank => {
                out.push(&line[start..idx]);
                State::Between
            }
            State::Unquoted { .. } => state,
            State::Quoted { quote, start } if byte == quote => State::Closed {
                quote,
                start,
                close: idx,
            },
            State::Quoted { .. } => state,
            State::Closed { start, close, .. } if blank => {
                out.push(&line[start..close]);
                State::Between
            }
            State::Closed { quote, start, .. } if byte == quote => State::Closed {
                quote,
                start,
                close: idx,
            },
            State::Closed { quote, start, .. } => State::Quoted { quote, start },
        };
    }

    match state {
        State::Between => {}
        State::Unquoted { start } => out.push(&line[start..]),
        State::Closed { start, close, .. } => out.push(&line[start..close]),
        State::Quoted { quote, .. } => {
            out.clear();
            return Err(ParseError::new(
                ParseErrorKind::InvalidToken,
                format!("unterminated {} quote", quote as char),
            ));
        }
    }
    Ok(())
}

#[inline]
fn is_blank(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

#[inline]
fn is_quote(byte: u8) -> bool {
    byte == b'\'' || byte == b'"'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split(line: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        tokenize(line.as_bytes(), &mut out)?;
        Ok(out
            .iter()
            .map(|token| String::from_utf8_lossy(token).into_owned())
            .collect())
    }

    #[test]
    fn splits_on_whitespace_runs() {
        assert_eq!(
            split("ATOM   1 N \t N  MET").unwrap(),
            vec!["ATOM", "1", "N", "N", "MET"]
        );
    }

    #[test]
    fn quotes_are_stripped_and_content_kept() {
        assert_eq!(
            split("_struct.title 'CRYSTAL STRUCTURE  OF  X'").unwrap(),
            vec!["_struct.title", "CRYSTAL STRUCTURE  OF  X"]
        );
        assert_eq!(split(r#"HETATM "O5'" C"#).unwrap(), vec!["HETATM", "O5'", "C"]);
    }

    #[test]
    fn quote_inside_unquoted_token_is_literal() {
        assert_eq!(split(r#"a"b""#).unwrap(), vec![r#"a"b""#]);
    }

    #[test]
    fn same_quote_without_boundary_is_content() {
        assert_eq!(split("'it's here' x").unwrap(), vec!["it's here", "x"]);
        assert_eq!(split("'a'' b").unwrap(), vec!["a'", "b"]);
    }

    #[test]
    fn other_quote_inside_quoted_token_is_text() {
        assert_eq!(split(r#"'say "hi"' z"#).unwrap(), vec![r#"say "hi""#, "z"]);
    }

    #[test]
    fn empty_quoted_token() {
        assert_eq!(split("'' x").unwrap(), vec!["", "x"]);
    }

    #[test]
    fn abutting_quoted_segments_fail() {
        let err = split(r#"'word1'"word2""#).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::InvalidToken);
    }

    #[test]
    fn unterminated_quote_fails_atomically() {
        let line = br#"word1 "word2"#;
        let mut out = Vec::new();
        let err = tokenize(line, &mut out).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::InvalidToken);
        assert!(out.is_empty());
    }

    #[test]
    fn reuses_output_buffer() {
        let mut out = Vec::new();
        tokenize(b"a b c", &mut out).unwrap();
        tokenize(b"d", &mut out).unwrap();
        assert_eq!(out, vec![&b"d"[..]]);
    }
}
