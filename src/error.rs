//! Recoverable errors raised by graph construction and rewriting.
//!
//! Only domain errors live here. Ownership-contract violations (removing a
//! node whose outputs are still used, touching a removed node, destroying a
//! region under an active traverser) are programmer errors and panic.

use thiserror::Error;

use crate::types::Type;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An edge would connect ports of different types.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Type, found: Type },

    /// An edge would cross a region boundary without an argument/result pair.
    #[error("invalid operand region: {0}")]
    RegionMismatch(&'static str),

    /// An operation received the wrong number of operands.
    #[error("{operation} expects {expected} operands, got {found}")]
    ArityMismatch {
        operation: String,
        expected: usize,
        found: usize,
    },

    /// A structural operation was passed to simple node creation, or vice versa.
    #[error("operation {0} cannot be created here")]
    InvalidOperation(String),

    /// A structural node lacks the ports its operation requires.
    #[error("malformed structural node: {0}")]
    Malformed(String),

    /// The requested flag does not exist on this normal form.
    #[error("normal form {kind} has no {flag} flag")]
    UnsupportedFlag { kind: String, flag: String },

    /// An immediate would need two symbolic labels in one slot.
    #[error("cannot {0} immediates: conflicting labels")]
    ImmediateLabels(&'static str),

    /// The normal form configuration document could not be read.
    #[error("invalid normal form configuration: {0}")]
    Config(String),
}
