//! CLI library components for the CCDA to OMOP converter.

pub mod logging;
pub mod metadata;
