//! Column-position resolution for `_atom_site` loops.
//!
//! Resolution runs once per loop. The fast path checks the column order
//! written by the wwPDB; every field it cannot confirm is looked up by name,
//! with author-prefixed fields falling back to their label-prefixed alias.

use crate::error::{ParseError, ParseErrorKind, Result};

const CATEGORY_PREFIX: &str = "_atom_site.";

/// Canonical `_atom_site` fields consumed by the coordinate pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomField {
    Group,
    Serial,
    Element,
    LabelAtom,
    AltLoc,
    LabelComp,
    LabelAsym,
    LabelSeq,
    InsCode,
    X,
    Y,
    Z,
    Occupancy,
    BFactor,
    Charge,
    AuthSeq,
    AuthComp,
    AuthAsym,
    AuthAtom,
    Model,
}

impl AtomField {
    pub const COUNT: usize = 20;

    pub const ALL: [AtomField; Self::COUNT] = [
        AtomField::Group,
        AtomField::Serial,
        AtomField::Element,
        AtomField::LabelAtom,
        AtomField::AltLoc,
        AtomField::LabelComp,
        AtomField::LabelAsym,
        AtomField::LabelSeq,
        AtomField::InsCode,
        AtomField::X,
        AtomField::Y,
        AtomField::Z,
        AtomField::Occupancy,
        AtomField::BFactor,
        AtomField::Charge,
        AtomField::AuthSeq,
        AtomField::AuthComp,
        AtomField::AuthAsym,
        AtomField::AuthAtom,
        AtomField::Model,
    ];

    /// Item name without the `_atom_site.` prefix.
    pub fn item(self) -> &'static str {
        match self {
            AtomField::Group => "group_PDB",
            AtomField::Serial => "id",
            AtomField::Element => "type_symbol",
            AtomField::LabelAtom => "label_atom_id",
            AtomField::AltLoc => "label_alt_id",
            AtomField::LabelComp => "label_comp_id",
            AtomField::LabelAsym => "label_asym_id",
            AtomField::LabelSeq => "label_seq_id",
            AtomField::InsCode => "pdbx_PDB_ins_code",
            AtomField::X => "Cartn_x",
            AtomField::Y => "Cartn_y",
            AtomField::Z => "Cartn_z",
            AtomField::Occupancy => "occupancy",
            AtomField::BFactor => "B_iso_or_equiv",
            AtomField::Charge => "pdbx_formal_charge",
            AtomField::AuthSeq => "auth_seq_id",
            AtomField::AuthComp => "auth_comp_id",
            AtomField::AuthAsym => "auth_asym_id",
            AtomField::AuthAtom => "auth_atom_id",
            AtomField::Model => "pdbx_PDB_model_num",
        }
    }

    /// Column this field occupies in files written by the wwPDB, where
    /// `label_entity_id` sits between `label_asym_id` and `label_seq_id`.
    fn typical_index(self) -> usize {
        match self {
            AtomField::Group => 0,
            AtomField::Serial => 1,
            AtomField::Element => 2,
            AtomField::LabelAtom => 3,
            AtomField::AltLoc => 4,
            AtomField::LabelComp => 5,
            AtomField::LabelAsym => 6,
            AtomField::LabelSeq => 8,
            AtomField::InsCode => 9,
            AtomField::X => 10,
            AtomField::Y => 11,
            AtomField::Z => 12,
            AtomField::Occupancy => 13,
            AtomField::BFactor => 14,
            AtomField::Charge => 15,
            AtomField::AuthSeq => 16,
            AtomField::AuthComp => 17,
            AtomField::AuthAsym => 18,
            AtomField::AuthAtom => 19,
            AtomField::Model => 20,
        }
    }

    fn alias(self) -> Option<AtomField> {
        match self {
            AtomField::AuthSeq => Some(AtomField::LabelSeq),
            AtomField::AuthComp => Some(AtomField::LabelComp),
            AtomField::AuthAsym => Some(AtomField::LabelAsym),
            AtomField::AuthAtom => Some(AtomField::LabelAtom),
            _ => None,
        }
    }

    fn matches(self, header: &str) -> bool {
        header
            .get(..CATEGORY_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CATEGORY_PREFIX))
            && header[CATEGORY_PREFIX.len()..].eq_ignore_ascii_case(self.item())
    }
}

/// Field name to column index, fixed for one `_atom_site` loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMap {
    indices: [usize; AtomField::COUNT],
    width: usize,
    fast_path: bool,
}

impl ColumnMap {
    pub fn resolve<S: AsRef<str>>(header: &[S]) -> Result<Self> {
        let mut indices = [usize::MAX; AtomField::COUNT];
        let mut fast_path = true;

        for (slot, field) in indices.iter_mut().zip(AtomField::ALL) {
            let typical = field.typical_index();
            if header
                .get(typical)
                .is_some_and(|name| field.matches(name.as_ref()))
            {
                *slot = typical;
            } else {
                fast_path = false;
            }
        }

        if !fast_path {
            for (slot, field) in indices.iter_mut().zip(AtomField::ALL) {
                if *slot != usize::MAX {
                    continue;
                }
                *slot = search(header, field)
                    .or_else(|| field.alias().and_then(|alias| search(header, alias)))
                    .ok_or_else(|| {
                        ParseError::new(
                            ParseErrorKind::MissingColumn,
                            format!("_atom_site loop has no {}{}", CATEGORY_PREFIX, field.item()),
                        )
                    })?;
            }
        }

        Ok(Self {
            indices,
            width: header.len(),
            fast_path,
        })
    }

    #[inline]
    pub fn index(&self, field: AtomField) -> usize {
        self.indices[field as usize]
    }

    /// Number of columns declared by the loop header.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether the standard column order was confirmed without searching.
    pub fn used_fast_path(&self) -> bool {
        self.fast_path
    }
}

fn search<S: AsRef<str>>(header: &[S], field: AtomField) -> Option<usize> {
    header.iter().position(|name| field.matches(name.as_ref()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const STANDARD_HEADER: [&str; 21] = [
        "_atom_site.group_PDB",
        "_atom_site.id",
        "_atom_site.type_symbol",
        "_atom_site.label_atom_id",
        "_atom_site.label_alt_id",
        "_atom_site.label_comp_id",
        "_atom_site.label_asym_id",
        "_atom_site.label_entity_id",
        "_atom_site.label_seq_id",
        "_atom_site.pdbx_PDB_ins_code",
        "_atom_site.Cartn_x",
        "_atom_site.Cartn_y",
        "_atom_site.Cartn_z",
        "_atom_site.occupancy",
        "_atom_site.B_iso_or_equiv",
        "_atom_site.pdbx_formal_charge",
        "_atom_site.auth_seq_id",
        "_atom_site.auth_comp_id",
        "_atom_site.auth_asym_id",
        "_atom_site.auth_atom_id",
        "_atom_site.pdbx_PDB_model_num",
    ];

    #[test]
    fn standard_layout_takes_fast_path() {
        let map = ColumnMap::resolve(&STANDARD_HEADER).unwrap();
        assert!(map.used_fast_path());
        assert_eq!(map.width(), 21);
        assert_eq!(map.index(AtomField::X), 10);
        assert_eq!(map.index(AtomField::Model), 20);
    }

    #[test]
    fn shuffled_layout_falls_back_to_search() {
        let mut header = STANDARD_HEADER.to_vec();
        header.swap(10, 12);
        header.reverse();
        let map = ColumnMap::resolve(&header).unwrap();
        assert!(!map.used_fast_path());
        for field in AtomField::ALL {
            assert!(field.matches(header[map.index(field)]), "{field:?}");
        }
    }

    #[test]
    fn author_fields_fall_back_to_label_alias() {
        let header: Vec<&str> = STANDARD_HEADER
            .iter()
            .copied()
            .filter(|name| !name.contains(".auth_"))
            .collect();
        let map = ColumnMap::resolve(&header).unwrap();
        assert_eq!(map.index(AtomField::AuthAsym), map.index(AtomField::LabelAsym));
        assert_eq!(map.index(AtomField::AuthSeq), 8);
    }

    #[test]
    fn missing_field_is_named() {
        let header: Vec<&str> = STANDARD_HEADER
            .iter()
            .copied()
            .filter(|name| !name.ends_with("Cartn_y"))
            .collect();
        let err = ColumnMap::resolve(&header).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MissingColumn);
        assert!(err.message().contains("_atom_site.Cartn_y"));
    }

    #[test]
    fn names_compare_case_insensitively() {
        let header: Vec<String> = STANDARD_HEADER.iter().map(|h| h.to_uppercase()).collect();
        assert!(ColumnMap::resolve(&header).unwrap().used_fast_path());
    }
}
