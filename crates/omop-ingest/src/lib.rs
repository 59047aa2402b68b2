//! CCDA document loading: XML parsing into an element tree and evaluation
//! of the path expressions the parse configurations use.

pub mod error;
pub mod path;
pub mod tree;

pub use error::{IngestError, Result};
pub use path::PathExpr;
pub use tree::XmlDocument;
