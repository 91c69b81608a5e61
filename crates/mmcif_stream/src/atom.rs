use std::str;

use serde::{Deserialize, Serialize};

use crate::columns::{AtomField, ColumnMap};
use crate::error::{ParseError, ParseErrorKind, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AtomPosition {
    /// Placeholder for an atom that was not observed at a residue.
    pub const MISSING: AtomPosition = AtomPosition {
        x: f64::INFINITY,
        y: f64::INFINITY,
        z: f64::INFINITY,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        self.x == f64::INFINITY && self.y == f64::INFINITY && self.z == f64::INFINITY
    }
}

/// Fields of one kept `_atom_site` row, borrowed from the batch buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AtomRow<'a> {
    pub group: &'a [u8],
    pub atom: &'a [u8],
    pub residue: &'a [u8],
    pub chain: &'a [u8],
    pub seq: Option<i32>,
    pub ins_code: &'a [u8],
    pub model: u32,
    pub position: AtomPosition,
}

impl<'a> AtomRow<'a> {
    /// Decode the residue key and coordinates of a row that already passed
    /// the model, chain, and atom filters.
    pub(crate) fn decode(tokens: &[&'a [u8]], columns: &ColumnMap, model: u32) -> Result<Self> {
        let column = |field: AtomField| tokens[columns.index(field)];
        Ok(Self {
            group: column(AtomField::Group),
            atom: column(AtomField::AuthAtom),
            residue: column(AtomField::AuthComp),
            chain: column(AtomField::AuthAsym),
            seq: parse_optional_int(column(AtomField::AuthSeq), AtomField::AuthSeq)?,
            ins_code: normalize_scalar(column(AtomField::InsCode)).unwrap_or_default(),
            model,
            position: AtomPosition {
                x: parse_float(column(AtomField::X), AtomField::X)?,
                y: parse_float(column(AtomField::Y), AtomField::Y)?,
                z: parse_float(column(AtomField::Z), AtomField::Z)?,
            },
        })
    }

    #[inline]
    pub(crate) fn is_hetatm(&self) -> bool {
        self.group.eq_ignore_ascii_case(b"HETATM")
    }
}

/// Model number of a row; rows without one belong to model 1.
pub(crate) fn parse_model(value: &[u8]) -> Result<u32> {
    match normalize_scalar(value) {
        Some(clean) => {
            let text = str::from_utf8(clean)?;
            text.parse::<u32>().map_err(|_| {
                ParseError::new(
                    ParseErrorKind::InvalidNumber,
                    format!("invalid model number '{text}'"),
                )
            })
        }
        None => Ok(1),
    }
}

fn parse_float(value: &[u8], field: AtomField) -> Result<f64> {
    let Some(clean) = normalize_scalar(value) else {
        return Err(ParseError::new(
            ParseErrorKind::MissingValue,
            format!("required numeric value missing for _atom_site.{}", field.item()),
        ));
    };
    let text = strip_esd(str::from_utf8(clean)?);
    text.parse::<f64>().map_err(|_| {
        ParseError::new(
            ParseErrorKind::InvalidNumber,
            format!("invalid float '{text}' for _atom_site.{}", field.item()),
        )
    })
}

fn parse_optional_int(value: &[u8], field: AtomField) -> Result<Option<i32>> {
    match normalize_scalar(value) {
        Some(clean) => {
            let text = str::from_utf8(clean)?;
            text.parse::<i32>().map(Some).map_err(|_| {
                ParseError::new(
                    ParseErrorKind::InvalidNumber,
                    format!("invalid integer '{text}' for _atom_site.{}", field.item()),
                )
            })
        }
        None => Ok(None),
    }
}

/// `?` and `.` mark unknown and inapplicable values.
fn normalize_scalar(value: &[u8]) -> Option<&[u8]> {
    match value {
        b"" | b"?" | b"." => None,
        other => Some(other),
    }
}

fn strip_esd(value: &str) -> &str {
    match value.find('(') {
        Some(idx) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::tests::STANDARD_HEADER;
    use crate::tokenizer::tokenize;
    use pretty_assertions::assert_eq;

    fn decode(line: &str) -> Result<AtomRow<'_>> {
        let columns = ColumnMap::resolve(&STANDARD_HEADER).unwrap();
        let mut tokens = Vec::new();
        tokenize(line.as_bytes(), &mut tokens).unwrap();
        let model = parse_model(tokens[columns.index(AtomField::Model)])?;
        AtomRow::decode(&tokens, &columns, model)
    }

    #[test]
    fn decodes_author_fields() {
        let row = decode(
            "HETATM 9 O \"O5'\" . HOH C 3 . A 1.5 -2.25 3.0(2) 1.00 20.0 ? 101 HOH B \"O5'\" 2",
        )
        .unwrap();
        assert_eq!(row.atom, b"O5'");
        assert_eq!(row.chain, b"B");
        assert_eq!(row.seq, Some(101));
        assert_eq!(row.ins_code, b"A");
        assert_eq!(row.model, 2);
        assert_eq!(row.position, AtomPosition::new(1.5, -2.25, 3.0));
        assert!(row.is_hetatm());
    }

    #[test]
    fn unknown_insertion_code_is_empty() {
        let row =
            decode("ATOM 1 N N . MET A 1 1 ? 0 0 0 1 10 ? 1 MET A N 1").unwrap();
        assert_eq!(row.ins_code, b"");
        assert!(!row.is_hetatm());
    }

    #[test]
    fn bad_coordinate_is_fatal() {
        let err = decode("ATOM 1 N N . MET A 1 1 ? 0 abc 0 1 10 ? 1 MET A N 1").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::InvalidNumber);
        assert!(err.message().contains("Cartn_y"));
    }

    #[test]
    fn missing_model_defaults_to_one() {
        assert_eq!(parse_model(b"?").unwrap(), 1);
        assert_eq!(parse_model(b"7").unwrap(), 7);
        assert!(parse_model(b"x").is_err());
    }

    #[test]
    fn sentinel_is_distinct_from_origin() {
        assert!(AtomPosition::MISSING.is_missing());
        assert!(!AtomPosition::default().is_missing());
        assert!(!AtomPosition::new(f64::INFINITY, 0.0, 0.0).is_missing());
    }
}
