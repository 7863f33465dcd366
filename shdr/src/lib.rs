//! SHDR (Simple Hierarchical Data Representation) wire protocol.
//!
//! This crate is the line-oriented decoder for the adapter-facing TCP
//! protocol: protocol commands (`* key: value`), multiline continuations,
//! and timestamped observation lines, plus the DATA_SET value grammar. It
//! has no knowledge of the device model — resolving a data-item key against
//! a `DataItem` and deciding whether its value should be parsed as a data
//! set is the ingestion pipeline's job, one layer up.

pub mod codec;
pub mod data_set;
pub mod error;
pub mod line;

pub use codec::ShdrDecoder;
pub use data_set::{parse_data_set, ParsedDataSet};
pub use error::ShdrError;
pub use line::{parse_line, DataLine, ShdrRecord};
