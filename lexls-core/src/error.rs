//! Error types for the lexicographic solver.

use thiserror::Error;

/// Errors that can occur while building or solving a problem.
///
/// Structural errors are fatal and reported at the call where the fault
/// originates; running out of factorizations is a normal termination status,
/// not an error.
#[derive(Error, Debug)]
pub enum LexError {
    /// Dimension mismatch, inconsistent bounds, or an out-of-range index
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The equality solver produced non-finite values and regularization
    /// cannot be applied
    #[error("singular system: {0}")]
    Singular(String),
}

/// Result type for solver operations.
pub type LexResult<T> = Result<T, LexError>;
