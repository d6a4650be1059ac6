use std::ptr::NonNull;

use rawalloc::{Chunk, ChunkError};

use crate::constants::{ALLOC_ALIGN, ALLOC_ALIGN_MASK, HEADER_SIZE};

/// The raw allocation primitive underneath the collector. Implementations hand out
/// zero-initialized memory; `raw_free()` receives the same size that was allocated.
pub trait RawMemory {
    /// Allocate `size` bytes of zeroed memory
    fn raw_allocate(&mut self, size: usize) -> Result<NonNull<u8>, ChunkError>;

    /// Release memory previously returned by `raw_allocate(size)`. Unsafe because the
    /// pointer must not be used again and must not have been released already.
    unsafe fn raw_free(&mut self, ptr: NonNull<u8>, size: usize);
}

/// `RawMemory` backed by the global allocator through `rawalloc` chunks
#[derive(Debug, Default)]
pub struct SystemMemory;

impl RawMemory for SystemMemory {
    fn raw_allocate(&mut self, size: usize) -> Result<NonNull<u8>, ChunkError> {
        Ok(Chunk::new(size)?.into_mut_ptr())
    }

    unsafe fn raw_free(&mut self, ptr: NonNull<u8>, size: usize) {
        drop(Chunk::from_raw_parts(ptr, size));
    }
}

/// Round an object size up to the allocation alignment, or `None` on overflow
pub fn alloc_size_of(object_size: usize) -> Option<usize> {
    object_size
        .checked_add(ALLOC_ALIGN - 1)
        .map(|size| size & ALLOC_ALIGN_MASK)
}

/// The number of bytes an object with the given payload size accounts for in the heap:
/// header plus payload, aligned.
pub fn allocation_cost(payload_size: usize) -> Option<usize> {
    alloc_size_of(HEADER_SIZE.checked_add(payload_size)?)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::constants::WORD_SIZE;

    #[test]
    fn test_alloc_size_of() {
        assert_eq!(alloc_size_of(0), Some(0));
        assert_eq!(alloc_size_of(1), Some(ALLOC_ALIGN));
        assert_eq!(alloc_size_of(ALLOC_ALIGN), Some(ALLOC_ALIGN));
        assert_eq!(alloc_size_of(ALLOC_ALIGN + 1), Some(2 * ALLOC_ALIGN));
        assert_eq!(alloc_size_of(usize::MAX), None);
    }

    #[test]
    fn test_allocation_cost() {
        assert_eq!(allocation_cost(0), Some(HEADER_SIZE));
        assert_eq!(allocation_cost(2 * WORD_SIZE), Some(HEADER_SIZE + 2 * WORD_SIZE));
        assert_eq!(allocation_cost(3), Some(HEADER_SIZE + ALLOC_ALIGN));
        assert_eq!(allocation_cost(usize::MAX - 1), None);
    }

    #[test]
    fn test_system_memory() {
        let mut memory = SystemMemory;
        let ptr = memory.raw_allocate(64).unwrap();

        assert_eq!(unsafe { *ptr.as_ptr().add(63) }, 0);
        unsafe { memory.raw_free(ptr, 64) };

        assert_eq!(memory.raw_allocate(0), Err(ChunkError::BadRequest));
    }
}
