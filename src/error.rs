use thiserror::Error;

/// Failure categories for sprite, container, and palette-library operations.
///
/// Failures are local: a failed load or save leaves prior in-memory state
/// unchanged, and the caller decides how to surface the message.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic, unsupported version, or malformed structure.
    #[error("format error: {0}")]
    Format(String),

    /// Declared sizes disagree with the actual pixel payload.
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// An operation would produce non-positive or over-limit dimensions.
    #[error("dimension error: {0}")]
    Dimension(String),

    /// A value is outside its permitted range (palette id, color index).
    #[error("validation error: {0}")]
    Validation(String),

    /// A standard-palette lookup was attempted without a loaded library.
    #[error("standard palette library not loaded")]
    LibraryNotLoaded,
}

pub type Result<T> = std::result::Result<T, Error>;
