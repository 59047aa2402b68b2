//! Conversion core: the field-resolution engine, the per-document pipeline,
//! and visit reconciliation.

pub mod datetime;
pub mod document;
pub mod engine;
pub mod functions;
pub mod hash;
pub mod pipeline;
pub mod pk_table;
pub mod visit;

pub use document::{DocumentQuery, NodeId, TEXT_ATTRIBUTE};
pub use engine::{ConfigRows, FieldPhase, HEADER_TABLES, PhaseContext, run_config};
pub use functions::{ArgMap, FunctionRegistry};
pub use hash::hash_text;
pub use pipeline::{DocumentOutput, process_document};
pub use pk_table::PkTable;
