//! Error types for the warren entity core.

use crate::entity::EntityId;
use thiserror::Error;

/// Errors raised while delivering or executing entity RPCs.
#[derive(Debug, Error)]
pub enum EntityError {
    /// Requested RPC method is not in the type's descriptor.
    #[error("unknown RPC method: {0}")]
    UnknownMethod(String),

    /// RPC argument payload could not be decoded.
    #[error("bad RPC arguments: {0}")]
    BadArguments(#[from] serde_json::Error),

    /// Target entity is not resident on this server.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Method invoker reported a failure.
    #[error("RPC execution failed: {0}")]
    ExecutionFailed(String),
}

/// Errors related to storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O error (file, network, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage system unavailable.
    #[error("storage unavailable")]
    Unavailable,

    /// Record not found (only for operations that require existence).
    #[error("record not found: {0}")]
    NotFound(String),

    /// Generic storage operation failure.
    #[error("storage operation failed: {0}")]
    OperationFailed(String),
}

/// Errors detected while building a freeze snapshot.
///
/// Both conditions leave the running resident set untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FreezeError {
    /// No resident nil-space; the space topology has no root to rebuild from.
    #[error("nil space not found")]
    NilSpaceMissing,

    /// More than one resident nil-space.
    #[error("found duplicate nil space")]
    DuplicateNilSpace,
}

/// Error wrapping a panic raised while rebuilding a freeze snapshot.
///
/// The partially restored state is left as-is for operator inspection.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// A restore phase panicked; carries the panic payload text.
    #[error("panic during restore: {0}")]
    Panicked(String),
}
