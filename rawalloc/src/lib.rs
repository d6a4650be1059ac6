/// A raw allocator for chunks of memory that must be:
///  - aligned to at least two machine words
///  - zero-initialized, so any reference slot in a fresh chunk reads as empty
///
/// Internally this calls the stabilized std Alloc API.
/// https://doc.rust-lang.org/std/alloc/index.html
///
/// Usage:
/// ```
/// use rawalloc::Chunk;
///
/// let chunk = Chunk::new(48).unwrap();
/// assert_eq!(chunk.size(), 48);
/// ```
///
/// Normal scoping rules will call Chunk::drop() when `chunk` goes out of scope
/// causing the memory to be fully deallocated. A garbage collector that frees
/// objects explicitly uses `into_mut_ptr()` and `from_raw_parts()` to hand the
/// memory over and take it back.
use std::ptr::NonNull;

pub type ChunkPtr = NonNull<u8>;
pub type ChunkSize = usize;

/// Alignment of every chunk, in bytes
pub const CHUNK_ALIGN: usize = std::mem::size_of::<usize>() * 2;

/// Set of possible chunk allocation failures
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ChunkError {
    /// Zero-sized request, or a size too large to describe as a memory layout
    BadRequest,
    /// Insufficient memory, couldn't allocate a chunk
    OOM,
}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ChunkError::BadRequest => write!(f, "invalid chunk size requested"),
            ChunkError::OOM => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for ChunkError {}

/// A zeroed, aligned region of memory
pub struct Chunk {
    ptr: ChunkPtr,
    size: ChunkSize,
}

impl Chunk {
    /// Instantiate a new zeroed chunk of the given size.
    pub fn new(size: ChunkSize) -> Result<Chunk, ChunkError> {
        if size == 0 {
            return Err(ChunkError::BadRequest);
        }

        Ok(Chunk {
            ptr: internal::alloc_chunk(size)?,
            size,
        })
    }

    /// Consume and return the pointer only. The memory is no longer released on drop.
    pub fn into_mut_ptr(self) -> ChunkPtr {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }

    /// Return the size in bytes of the chunk
    pub fn size(&self) -> ChunkSize {
        self.size
    }

    /// Unsafely reassemble from pointer and size. The pair must have come from
    /// `into_mut_ptr()` on a chunk of exactly this size.
    pub unsafe fn from_raw_parts(ptr: ChunkPtr, size: ChunkSize) -> Chunk {
        Chunk { ptr, size }
    }

    /// Return a bare pointer to the base of the chunk
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        internal::dealloc_chunk(self.ptr, self.size);
    }
}

mod internal {
    use super::{ChunkError, ChunkPtr, ChunkSize, CHUNK_ALIGN};
    use std::alloc::{alloc_zeroed, dealloc, Layout};
    use std::ptr::NonNull;

    pub fn alloc_chunk(size: ChunkSize) -> Result<ChunkPtr, ChunkError> {
        let layout = Layout::from_size_align(size, CHUNK_ALIGN).map_err(|_| ChunkError::BadRequest)?;

        unsafe {
            let ptr = alloc_zeroed(layout);
            NonNull::new(ptr).ok_or(ChunkError::OOM)
        }
    }

    pub fn dealloc_chunk(ptr: ChunkPtr, size: ChunkSize) {
        unsafe {
            // the layout was validated when the chunk was allocated
            let layout = Layout::from_size_align_unchecked(size, CHUNK_ALIGN);

            dealloc(ptr.as_ptr(), layout);
        }
    }
}
