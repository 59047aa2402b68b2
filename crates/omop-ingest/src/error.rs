use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed xml attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("document is not valid utf-8: {0}")]
    Encoding(String),
    #[error("unsupported path expression `{path}`: {reason}")]
    Path { path: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
