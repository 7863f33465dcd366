use thiserror::Error;

/// Failures raised while decoding a single SHDR line.
///
/// These are always non-fatal to the connection: a caller logs and drops
/// the offending line (or pair) and keeps reading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShdrError {
    #[error("line exceeded max length of {max} bytes")]
    LineTooLong { max: usize },

    #[error("multiline body exceeded max length of {max} bytes while waiting for terminator {terminator:?}")]
    MultilineTooLong { terminator: String, max: usize },

    #[error("empty data line")]
    EmptyDataLine,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ShdrError {
    fn from(err: std::io::Error) -> Self {
        ShdrError::Io(err.to_string())
    }
}
