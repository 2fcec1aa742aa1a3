//! Error types for the object runtime.
//!
//! Every failure the runtime can surface is a variant here. All errors are
//! raised synchronously from the operation that detects them; the runtime
//! never retries on its own, and a failed operation never leaves partial
//! state behind (atomicity is per-operation, not per-scope).

use thiserror::Error;

/// Maximum number of links followed when walking an owner chain upward.
///
/// Cycle detection at assignment time should make a longer chain
/// impossible; exceeding this bound means the ownership graph is corrupt.
pub const MAX_OWNER_DEPTH: usize = 100;

/// Errors surfaced by the object runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A mutation was attempted on a context-gated object with no active
    /// matching change scope.
    #[error("'{op}' requires an active change scope; wrap the mutation in change(obj, |o| ...)")]
    MutationOutsideScope {
        /// Name of the attempted operation (`"set"`, `"push"`, ...).
        op: &'static str,
    },

    /// An assigned value failed structural assertion against the declared
    /// schema. The write did not apply.
    #[error("schema mismatch at '{path}': expected {expected}, found {found}")]
    SchemaMismatch {
        /// Property path of the offending value, relative to the target.
        path: String,
        /// Description of the expected shape.
        expected: String,
        /// Description of the value that was actually supplied.
        found: String,
    },

    /// A schema used to create an object was not object-shaped.
    #[error("object schema must be object-shaped, found {0}")]
    InvalidSchema(String),

    /// An assignment would give a plain nested value a second owner.
    #[error("value at '{path}' is already owned by a different object; deep-copy it before attaching")]
    OwnershipViolation {
        /// Property path of the assignment that was rejected.
        path: String,
    },

    /// An assignment would embed an object inside its own subtree.
    #[error("assignment at '{path}' would create an ownership cycle")]
    OwnershipCycle {
        /// Property path of the assignment that was rejected.
        path: String,
    },

    /// A caller-supplied object id does not match the required format.
    #[error("invalid object id '{0}': expected 26 Crockford base32 characters")]
    InvalidId(String),

    /// Walking the owner chain exceeded [`MAX_OWNER_DEPTH`] links. This is
    /// a programming-error-class fault: cycle detection should have made
    /// such a chain impossible.
    #[error("owner chain exceeded {MAX_OWNER_DEPTH} links; ownership graph is malformed")]
    OwnerDepthExceeded,

    /// A relation was created with an endpoint that is not an identified
    /// root object.
    #[error("relation endpoints must be identified root objects")]
    RelationEndpoint,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
