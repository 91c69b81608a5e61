#![forbid(unsafe_code)]
//! Streaming reader for mmCIF/PDBx files.
//!
//! A parse walks the input once and keeps only what [`ParserOptions`] asks
//! for: selected scalar items, selected loop categories, and the
//! `_atom_site` coordinates filtered by model, chain, and atom name. The
//! coordinates come back grouped per author chain as [`ModelSnapshot`]s in
//! which every atom name maps to one position per residue, with
//! [`AtomPosition::MISSING`] marking residues where that atom was not seen.
//!
//! ```no_run
//! use mmcif_stream::{parse_file, ParserOptions};
//!
//! let options = ParserOptions::new()
//!     .with_max_model(Some(1))
//!     .with_atoms(["CA"])
//!     .want_item("_cell.length_a");
//! let extract = parse_file("1abc.cif.gz", &options)?;
//! for id in extract.chain_ids() {
//!     let chain = extract.chain(id).unwrap();
//!     println!("{id}: {} residues", chain.residue_count());
//! }
//! # Ok::<(), mmcif_stream::ParseError>(())
//! ```

pub mod atom;
pub mod columns;
pub mod error;
pub mod model;
pub mod options;
pub mod parser;

mod pipeline;
mod pool;
mod scanner;
mod tokenizer;

pub use atom::AtomPosition;
pub use columns::{AtomField, ColumnMap};
pub use error::{ParseError, ParseErrorKind, Result};
pub use model::{ChainCoords, MmcifExtract, ModelSnapshot, Table};
pub use options::ParserOptions;
pub use parser::{parse_file, parse_reader, parse_str};
