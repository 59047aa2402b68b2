use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("config `{0}` lacks a root entry")]
    MissingRoot(String),
    #[error("config `{0}` root lacks an `element` path")]
    MissingRootElement(String),
    #[error("config `{config}` field `{field}` references unknown function `{function}`")]
    UnknownFunction {
        config: String,
        field: String,
        function: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
