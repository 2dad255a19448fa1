#![allow(missing_docs)]
use thiserror::Error;

/// Custom Result type used in this crate
pub type ProtomoldResult<T> = Result<T, ProtomoldError>;

#[derive(Debug, Error)]
pub enum ProtomoldError {
    /// The whole parsing search was exhausted without a single consistent
    /// split of the input.
    #[error("no valid parse for '{data}'")]
    NoValidParse { data: String },
    /// A relation field completed the walk without its dependencies ever
    /// becoming available.
    #[error("relation of field '{path}' never resolved its dependencies")]
    RelationUnresolved { path: String },
    /// A field has no constant, no memorized value and no generatable type.
    #[error("cannot specialize field '{path}': {reason}")]
    CannotSpecialize { path: String, reason: String },
    /// A candidate bit range does not satisfy a field type. Only used while
    /// backtracking, never surfaced to the caller.
    #[error("candidate does not satisfy the type of field '{path}'")]
    TypeMismatch { path: String },
    /// End of a fuzzing sequence. This is a termination marker, not a failure.
    #[error("mutation budget exhausted")]
    BudgetExhausted,
    #[error("invalid format definition: {reason}")]
    InvalidFormat { reason: String },
    #[error("could not load preset rules: {reason}")]
    Rules { reason: String },
    #[error("{err}")]
    IoError { err: std::io::Error },
}

impl From<std::io::Error> for ProtomoldError {
    fn from(err: std::io::Error) -> Self {
        ProtomoldError::IoError { err }
    }
}
