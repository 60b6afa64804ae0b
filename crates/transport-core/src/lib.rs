//! Conversion engine for TRANSPORT lattice descriptions.
//!
//! Input decks and TRANSPORT standard output files are tokenized, classified
//! into an element registry, optionally reconciled against the fitting
//! section of an output file, and re-emitted as BDSIM gmad and MAD-X
//! lattices. The `convert` module ties the stages together; everything else
//! is usable on its own.

pub mod beam;
pub mod builder;
pub mod common;
pub mod convert;
pub mod domain;
pub mod fitting;
pub mod lattice;
pub mod reader;
pub mod registry;
pub mod tokenizer;

pub use convert::{convert_file, ConversionReport};
pub use domain::{ConversionConfig, TransportError, TransportResult};
