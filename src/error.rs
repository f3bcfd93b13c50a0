use std::fmt;

/// Crate-wide error type.
///
/// Structural misuse (schema, hooks, unknown methods) is returned as an
/// error and expected to propagate. Data-corruption risk from output
/// formatting is deliberately NOT an error: it is recorded as a page
/// status flag and rejected later by the page store at save time.
#[derive(Debug)]
pub enum WireError {
    /// No template assigned, or a schema was required and missing.
    Schema(String),
    /// Dispatch found neither a canonical implementation nor any hook.
    UnknownMethod(String),
    /// Malformed hook registration, or an attempt to hook a concrete method.
    InvalidHook(String),
    /// Malformed structural value at the set() layer.
    Validation(String),
    NotFound(String),
    /// Failure at the persistence collaborator boundary.
    Storage(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Schema(msg) => write!(f, "Schema error: {}", msg),
            WireError::UnknownMethod(msg) => write!(f, "Unknown method: {}", msg),
            WireError::InvalidHook(msg) => write!(f, "Invalid hook: {}", msg),
            WireError::Validation(msg) => write!(f, "Validation error: {}", msg),
            WireError::NotFound(msg) => write!(f, "Not found: {}", msg),
            WireError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for WireError {}

pub type WireResult<T> = Result<T, WireError>;
