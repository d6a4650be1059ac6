use std::mem::size_of;

/// Size of a machine word, the unit of header and reference slots
pub const WORD_SIZE: usize = size_of::<usize>();

/// Every object begins with a single header word
pub const HEADER_SIZE: usize = WORD_SIZE;

/// Allocation costs are rounded up to this many bytes
pub const ALLOC_ALIGN: usize = WORD_SIZE;
pub const ALLOC_ALIGN_MASK: usize = !(ALLOC_ALIGN - 1);

/// The low bits of a header word hold the type id, the flags sit above them
pub const TYPE_ID_BITS: usize = 16;
pub const TYPE_ID_MASK: usize = (1 << TYPE_ID_BITS) - 1;

pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;
pub const DEFAULT_INITIAL_HEAP_SIZE: usize = 4096;
