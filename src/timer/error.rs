use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
