use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::atom::AtomPosition;

/// Everything extracted from one mmCIF stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MmcifExtract {
    /// Name following the `data_` header, if any.
    pub block_name: Option<String>,
    /// Wanted scalar items, keyed by the name the caller registered.
    pub items: BTreeMap<String, String>,
    /// Wanted loop categories, keyed by the name the caller registered.
    pub tables: BTreeMap<String, Table>,
    /// Author chain id to per-model coordinates.
    pub chains: BTreeMap<String, ChainCoords>,
}

impl MmcifExtract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(&self, name: &str) -> Option<&str> {
        self.items.get(name).map(String::as_str)
    }

    pub fn table(&self, category: &str) -> Option<&Table> {
        self.tables.get(category)
    }

    pub fn chain(&self, id: &str) -> Option<&ChainCoords> {
        self.chains.get(id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    /// Number of observed (non-sentinel) positions across all chains and models.
    pub fn atom_count(&self) -> usize {
        self.chains
            .values()
            .flat_map(|chain| chain.models.iter())
            .flat_map(|model| model.atoms.values())
            .map(|positions| positions.iter().filter(|pos| !pos.is_missing()).count())
            .sum()
    }

    /// Append a finished snapshot to its chain, creating the chain on first sight.
    pub(crate) fn commit(&mut self, chain_id: &str, snapshot: ModelSnapshot, labels: ResidueLabels) {
        match self.chains.get_mut(chain_id) {
            Some(chain) => chain.absorb(snapshot, labels),
            None => {
                let mut chain = ChainCoords::default();
                chain.absorb(snapshot, labels);
                self.chains.insert(chain_id.to_string(), chain);
            }
        }
    }
}

/// A retained loop: header names in file order and the rows beneath them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Coordinates of one chain across models.
///
/// `residue_numbers`, `insertion_codes`, and `residue_names` run parallel to
/// each other and describe the residues of the chain's first retained model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainCoords {
    pub models: Vec<ModelSnapshot>,
    pub residue_numbers: Vec<Option<i32>>,
    pub insertion_codes: Vec<String>,
    pub residue_names: Vec<String>,
}

impl ChainCoords {
    pub fn residue_count(&self) -> usize {
        self.residue_numbers.len()
    }

    pub fn model(&self, number: u32) -> Option<&ModelSnapshot> {
        self.models.iter().find(|model| model.number == number)
    }

    pub fn first_model_number(&self) -> Option<u32> {
        self.models.first().map(|model| model.number)
    }

    fn absorb(&mut self, snapshot: ModelSnapshot, labels: ResidueLabels) {
        let first = self.first_model_number().unwrap_or(snapshot.number);
        if snapshot.number == first {
            self.residue_numbers.extend(labels.numbers);
            self.insertion_codes.extend(labels.insertion_codes);
            self.residue_names.extend(labels.names);
        }
        // Author chain ids can reappear later in the same model (waters,
        // ligands); those residues continue the earlier snapshot.
        match self.models.last_mut() {
            Some(last) if last.number == snapshot.number => last.merge(snapshot),
            _ => self.models.push(snapshot),
        }
    }
}

/// One conformer of one chain: atom name to per-residue positions.
///
/// Every array holds exactly `residue_count` slots; atoms absent from a
/// residue hold [`AtomPosition::MISSING`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub number: u32,
    pub residue_count: usize,
    pub atoms: BTreeMap<String, Vec<AtomPosition>>,
}

impl ModelSnapshot {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }

    pub fn positions(&self, atom: &str) -> Option<&[AtomPosition]> {
        self.atoms.get(atom).map(Vec::as_slice)
    }

    /// Count of residues where `atom` was actually observed.
    pub fn observed(&self, atom: &str) -> usize {
        self.positions(atom)
            .map_or(0, |positions| positions.iter().filter(|p| !p.is_missing()).count())
    }

    pub fn atom_names(&self) -> impl Iterator<Item = &str> {
        self.atoms.keys().map(String::as_str)
    }

    /// Whether `atom` already has a position at the current residue.
    pub(crate) fn holds_current(&self, atom: &str) -> bool {
        self.atoms
            .get(atom)
            .and_then(|positions| positions.last())
            .is_some_and(|position| !position.is_missing())
    }

    /// Open a new residue slot in every array.
    pub(crate) fn push_residue(&mut self) {
        self.residue_count += 1;
        for positions in self.atoms.values_mut() {
            positions.push(AtomPosition::MISSING);
        }
    }

    /// Store `position` for `atom` at the current residue. A slot that is
    /// already filled keeps its first observation; returns whether it was set.
    pub(crate) fn record(&mut self, atom: &str, position: AtomPosition) -> bool {
        debug_assert!(self.residue_count > 0, "record before first residue");
        let count = self.residue_count;
        if !self.atoms.contains_key(atom) {
            self.atoms
                .insert(atom.to_string(), vec![AtomPosition::MISSING; count]);
        }
        let Some(positions) = self.atoms.get_mut(atom) else {
            return false;
        };
        let slot = &mut positions[count - 1];
        if slot.is_missing() {
            *slot = position;
            true
        } else {
            false
        }
    }

    fn merge(&mut self, other: ModelSnapshot) {
        let before = self.residue_count;
        let added = other.residue_count;
        let mut incoming = other.atoms;
        for (name, positions) in self.atoms.iter_mut() {
            match incoming.remove(name) {
                Some(tail) => positions.extend(tail),
                None => positions.resize(before + added, AtomPosition::MISSING),
            }
        }
        for (name, tail) in incoming {
            let mut positions = vec![AtomPosition::MISSING; before];
            positions.extend(tail);
            self.atoms.insert(name, positions);
        }
        self.residue_count = before + added;
    }
}

/// Per-residue labels gathered while a snapshot is built.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ResidueLabels {
    pub numbers: Vec<Option<i32>>,
    pub insertion_codes: Vec<String>,
    pub names: Vec<String>,
}

impl ResidueLabels {
    pub(crate) fn push(&mut self, number: Option<i32>, insertion_code: &str, name: &str) {
        self.numbers.push(number);
        self.insertion_codes.push(insertion_code.to_string());
        self.names.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pos(v: f64) -> AtomPosition {
        AtomPosition::new(v, v, v)
    }

    fn snapshot(number: u32, residues: &[&[(&str, f64)]]) -> ModelSnapshot {
        let mut model = ModelSnapshot::new(number);
        for residue in residues {
            model.push_residue();
            for (atom, v) in residue.iter() {
                model.record(atom, pos(*v));
            }
        }
        model
    }

    fn labels(numbers: &[i32]) -> ResidueLabels {
        let mut labels = ResidueLabels::default();
        for number in numbers {
            labels.push(Some(*number), "", "ALA");
        }
        labels
    }

    #[test]
    fn arrays_stay_synchronized_with_sentinels() {
        let model = snapshot(1, &[&[("N", 1.0)], &[("N", 2.0), ("CB", 3.0)], &[("N", 4.0)]]);
        assert_eq!(model.residue_count, 3);
        assert_eq!(
            model.positions("CB").unwrap(),
            &[AtomPosition::MISSING, pos(3.0), AtomPosition::MISSING]
        );
        assert_eq!(model.observed("N"), 3);
        assert_eq!(model.observed("CB"), 1);
    }

    #[test]
    fn duplicate_atom_keeps_first_position() {
        let mut model = ModelSnapshot::new(1);
        model.push_residue();
        assert!(model.record("CA", pos(1.0)));
        assert!(!model.record("CA", pos(9.0)));
        assert_eq!(model.positions("CA").unwrap(), &[pos(1.0)]);
    }

    #[test]
    fn same_model_snapshots_merge() {
        let mut extract = MmcifExtract::new();
        extract.commit("A", snapshot(1, &[&[("CA", 1.0)]]), labels(&[1]));
        extract.commit("A", snapshot(1, &[&[("O", 2.0)], &[("O", 3.0)]]), labels(&[201, 202]));
        let chain = extract.chain("A").unwrap();
        assert_eq!(chain.models.len(), 1);
        let model = &chain.models[0];
        assert_eq!(model.residue_count, 3);
        assert_eq!(model.positions("CA").unwrap().len(), 3);
        assert_eq!(
            model.positions("O").unwrap(),
            &[AtomPosition::MISSING, pos(2.0), pos(3.0)]
        );
        assert_eq!(chain.residue_numbers, vec![Some(1), Some(201), Some(202)]);
    }

    #[test]
    fn labels_follow_first_model_only() {
        let mut extract = MmcifExtract::new();
        extract.commit("A", snapshot(1, &[&[("CA", 1.0)], &[("CA", 2.0)]]), labels(&[1, 2]));
        extract.commit("A", snapshot(2, &[&[("CA", 1.5)], &[("CA", 2.5)]]), labels(&[1, 2]));
        let chain = extract.chain("A").unwrap();
        assert_eq!(chain.models.len(), 2);
        assert_eq!(chain.residue_count(), 2);
        assert_eq!(chain.model(2).unwrap().positions("CA").unwrap()[1], pos(2.5));
        assert_eq!(extract.atom_count(), 4);
    }

    #[test]
    fn table_lookup_by_column_name() {
        let table = Table {
            columns: vec!["_struct_conn.id".into(), "_struct_conn.conn_type_id".into()],
            rows: vec![vec!["disulf1".into(), "disulf".into()]],
        };
        assert_eq!(table.value(0, "_struct_conn.conn_type_id"), Some("disulf"));
        assert_eq!(table.value(1, "_struct_conn.id"), None);
        assert_eq!(table.len(), 1);
    }
}
