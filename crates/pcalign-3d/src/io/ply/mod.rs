mod parser;
mod properties;
mod writer;

pub use parser::*;
pub use properties::*;
pub use writer::*;

/// Error types for the PLY module.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    /// Failed to read or write the PLY file
    #[error("Failed to read PLY file")]
    Io(#[from] std::io::Error),

    /// The file is not a PLY file or its header cannot be understood
    #[error("Malformed PLY header: {0}")]
    MalformedHeader(String),

    /// Unsupported PLY property type
    #[error("Unsupported PLY property type: {0}")]
    UnsupportedProperty(String),

    /// A required property is missing
    #[error("Missing PLY property: {0}")]
    MissingProperty(&'static str),

    /// A value in the body cannot be parsed
    #[error("Invalid PLY value: {0}")]
    InvalidValue(String),
}
