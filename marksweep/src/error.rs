use rawalloc::ChunkError;
use thiserror::Error;

use crate::header::TypeId;
use crate::heap::QueueIndex;

/// Recoverable allocation failures. Broken collector invariants are not represented here;
/// they panic.
#[derive(Debug, Error, PartialEq)]
pub enum GcError {
    /// The requested object size cannot be represented. Raised before any raw allocation.
    #[error("out of memory: requested object size overflows the address space")]
    OutOfMemory,

    /// The raw allocation primitive failed
    #[error("raw allocation failed: {0}")]
    AllocationFailed(#[from] ChunkError),

    #[error("unknown type {0:?}")]
    UnknownType(TypeId),

    /// The allocation request does not agree with the registered layout of the type
    #[error("allocation request does not match the layout of {0:?}")]
    LayoutMismatch(TypeId),

    #[error("unknown finalizer queue {0:?}")]
    UnknownFinalizerQueue(QueueIndex),
}
