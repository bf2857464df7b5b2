use thiserror::Error;

/// General coding errors.
///
/// A slice surfaces at most one of these; the coder never best-effort
/// continues past the first failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The payload violates the bitstream syntax (impossible occupancy,
    /// truncated stream, residual overflow).
    #[error("Syntax error at byte {offset}: {reason}")]
    Syntax { offset: usize, reason: String },
    /// The payload decoded cleanly but the result contradicts the slice
    /// header (point count mismatch, coordinate out of bounds, reference
    /// index out of range).
    #[error("Semantic error: {0}")]
    Semantic(String),
    /// The parameter set is rejected before any payload byte is read.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A specialised `Result` type for coding operations.
pub type Result<T> = ::std::result::Result<T, Error>;
