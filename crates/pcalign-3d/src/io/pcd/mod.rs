mod parser;
pub use parser::*;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
pub enum PcdError {
    /// Failed to read PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// The header is incomplete or inconsistent
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// Only `ascii` and `binary` bodies are supported
    #[error("Unsupported PCD data encoding: {0}")]
    UnsupportedEncoding(String),

    /// A field type or count cannot be decoded
    #[error("Unsupported PCD field: {0}")]
    UnsupportedProperty(String),

    /// A required field is missing
    #[error("Missing PCD field: {0}")]
    MissingField(&'static str),

    /// A value in an ascii body is not a number
    #[error("Invalid PCD value: {0}")]
    InvalidValue(String),

    /// The body has fewer points than the header declares
    #[error("PCD data is truncated")]
    Truncated,
}
