//! Caller configuration applied before parsing begins.
//!
//! `ParserOptions` carries the coordinate filter (model cap, chain and atom
//! allow-lists) together with the scalar items and table categories the
//! caller wants back. Everything is fixed for the duration of one parse.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Highest `pdbx_PDB_model_num` to keep; `None` keeps every model.
    pub max_model: Option<u32>,
    /// Author chain ids to keep; empty keeps all chains.
    pub chains: HashSet<String>,
    /// Atom names to keep; empty keeps all atoms.
    pub atoms: HashSet<String>,
    /// Scalar data item names, e.g. `_cell.length_a`.
    pub items: HashSet<String>,
    /// Loop categories retained in full, e.g. `_struct_conn`.
    pub tables: HashSet<String>,
    /// Fail the parse if the input carries no `_atom_site` loop.
    pub require_atom_site_loop: bool,
}

impl ParserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_model(mut self, max_model: Option<u32>) -> Self {
        self.max_model = max_model;
        self
    }

    pub fn with_chains<I, S>(mut self, chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chains.extend(chains.into_iter().map(Into::into));
        self
    }

    pub fn with_atoms<I, S>(mut self, atoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.atoms.extend(atoms.into_iter().map(Into::into));
        self
    }

    pub fn want_item(mut self, name: impl Into<String>) -> Self {
        self.items.insert(name.into());
        self
    }

    pub fn with_items<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn want_table(mut self, category: impl Into<String>) -> Self {
        self.tables.insert(category.into());
        self
    }

    pub fn with_tables<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.extend(categories.into_iter().map(Into::into));
        self
    }

    pub fn require_atom_site_loop(mut self, required: bool) -> Self {
        self.require_atom_site_loop = required;
        self
    }

    pub(crate) fn item_registry(&self) -> NameRegistry {
        NameRegistry::new(&self.items)
    }

    pub(crate) fn table_registry(&self) -> NameRegistry {
        NameRegistry::new(&self.tables)
    }

    pub(crate) fn row_filter(&self) -> RowFilter {
        RowFilter {
            max_model: self.max_model,
            chains: self.chains.iter().map(|c| c.as_bytes().to_vec()).collect(),
            atoms: self.atoms.iter().map(|a| a.as_bytes().to_vec()).collect(),
        }
    }
}

/// Case-insensitive lookup of wanted names that hands back the caller's own
/// spelling, so results are keyed the way they were requested.
#[derive(Debug, Default)]
pub(crate) struct NameRegistry {
    by_folded: HashMap<String, String>,
}

impl NameRegistry {
    fn new(names: &HashSet<String>) -> Self {
        let by_folded = names
            .iter()
            .map(|name| (fold_name(name), name.clone()))
            .collect();
        Self { by_folded }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&str> {
        if self.by_folded.is_empty() {
            return None;
        }
        self.by_folded.get(&fold_name(name)).map(String::as_str)
    }
}

fn fold_name(name: &str) -> String {
    let trimmed = name.trim();
    let mut folded = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('_') {
        folded.push('_');
    }
    folded.push_str(&trimmed.to_ascii_lowercase());
    folded
}

/// Byte-level form of the coordinate filter used on the hot path.
#[derive(Debug, Default)]
pub(crate) struct RowFilter {
    max_model: Option<u32>,
    chains: HashSet<Vec<u8>>,
    atoms: HashSet<Vec<u8>>,
}

impl RowFilter {
    #[inline]
    pub(crate) fn keeps_model(&self, model: u32) -> bool {
        self.max_model.map_or(true, |max| model <= max)
    }

    #[inline]
    pub(crate) fn keeps_chain(&self, chain: &[u8]) -> bool {
        self.chains.is_empty() || self.chains.contains(chain)
    }

    #[inline]
    pub(crate) fn keeps_atom(&self, atom: &[u8]) -> bool {
        self.atoms.is_empty() || self.atoms.contains(atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_ignores_case_and_leading_underscore() {
        let options = ParserOptions::new()
            .want_item("_cell.length_a")
            .want_table("struct_conn");
        let items = options.item_registry();
        let tables = options.table_registry();
        assert_eq!(items.lookup("_CELL.Length_A"), Some("_cell.length_a"));
        assert_eq!(items.lookup("_cell.length_b"), None);
        assert_eq!(tables.lookup("_struct_conn"), Some("struct_conn"));
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let filter = ParserOptions::default().row_filter();
        assert!(filter.keeps_model(u32::MAX));
        assert!(filter.keeps_chain(b"Z"));
        assert!(filter.keeps_atom(b"OXT"));
    }

    #[test]
    fn filter_applies_cap_and_allow_lists() {
        let filter = ParserOptions::new()
            .with_max_model(Some(0))
            .with_chains(["A"])
            .with_atoms(["CA"])
            .row_filter();
        assert!(!filter.keeps_model(1));
        assert!(filter.keeps_model(0));
        assert!(filter.keeps_chain(b"A"));
        assert!(!filter.keeps_chain(b"B"));
        assert!(!filter.keeps_atom(b"CB"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: ParserOptions =
            serde_json::from_str(r#"{"max_model": 2, "atoms": ["CA"]}"#).expect("valid json");
        assert_eq!(options.max_model, Some(2));
        assert!(options.atoms.contains("CA"));
        assert!(options.chains.is_empty());
        assert!(!options.require_atom_site_loop);
    }
}
