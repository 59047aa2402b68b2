pub mod error;
pub mod record;
pub mod spec;
pub mod value;

pub use error::{ModelError, Result};
pub use record::{ErrorFieldSet, OutputRecord, dedupe_records};
pub use spec::{ConfigSpec, DataType, FieldKind, FieldSpec, Metadata, PrioritySpec, ROOT_KEY};
pub use value::Value;
