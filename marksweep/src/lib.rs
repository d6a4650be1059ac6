//! A non-moving, stop-the-world mark-sweep collector.
//!
//! Every object is a header word followed by a payload and is tracked in an allocation
//! registry. A collection marks from the roots, schedules finalizers for unreachable
//! finalizable objects, clears weak slots whose targets died, sweeps, and finally runs the
//! scheduled finalizers once each.

extern crate rawalloc;

mod allocator;
mod collect;
mod config;
mod constants;
mod error;
mod finalizer;
mod header;
mod heap;
mod mark;
mod object;
mod registry;
mod roots;
mod sweep;
#[cfg(test)]
mod testing;
mod types;
mod weakref;

pub use allocator::{alloc_size_of, allocation_cost, RawMemory, SystemMemory};

pub use config::GcConfig;

pub use constants::{HEADER_SIZE, WORD_SIZE};

pub use error::GcError;

pub use header::{decode, encode, GcFlags, Header, TypeId};

pub use heap::{CollectionStats, CollectorState, FinalizerFn, Heap, QueueIndex};

pub use object::{ObjectRef, ObjectView};

pub use roots::{RootId, RootSet, RootTable};

pub use types::{no_refs, ObjectLayout, TraceFn, TypeDescriptor, TypeTable};

pub use rawalloc::ChunkError;
