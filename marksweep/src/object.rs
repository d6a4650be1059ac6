/// Handles to managed objects and the only place raw object memory is read or written.
///
/// An object is laid out as one header word followed by its payload. An `ObjectRef` is the
/// address of the header; payload offsets are relative to the first byte after it.
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::slice;

use crate::constants::{HEADER_SIZE, WORD_SIZE};
use crate::header::{GcFlags, Header, TypeId};

/// An opaque, copyable handle to a managed object. Objects never move, so a handle stays
/// valid for as long as the object is live.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    ptr: NonNull<u8>,
}

impl ObjectRef {
    pub(crate) fn new(ptr: NonNull<u8>) -> ObjectRef {
        ObjectRef { ptr }
    }

    /// The handle as a word, the encoding used for reference slots
    pub fn as_word(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Decode a reference slot word. Zero is the empty reference.
    pub fn from_word(word: usize) -> Option<ObjectRef> {
        NonNull::new(word as *mut u8).map(ObjectRef::new)
    }

    pub(crate) fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) unsafe fn header(&self) -> Header {
        Header::decode(ptr::read(self.ptr.as_ptr() as *const usize))
    }

    pub(crate) unsafe fn set_header(&self, header: Header) {
        ptr::write(self.ptr.as_ptr() as *mut usize, header.encode());
    }

    pub(crate) unsafe fn flags(&self) -> GcFlags {
        self.header().flags()
    }

    pub(crate) unsafe fn set_flags(&self, flags: GcFlags) {
        let header = self.header();
        self.set_header(header.with_flags(flags));
    }

    pub(crate) unsafe fn is_surviving(&self) -> bool {
        self.flags().contains(GcFlags::SURVIVING)
    }

    pub(crate) unsafe fn payload_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr().add(HEADER_SIZE)
    }

    pub(crate) unsafe fn read_payload_word(&self, offset: usize) -> usize {
        ptr::read_unaligned(self.payload_ptr().add(offset) as *const usize)
    }

    pub(crate) unsafe fn write_payload_word(&self, offset: usize, word: usize) {
        ptr::write_unaligned(self.payload_ptr().add(offset) as *mut usize, word)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.as_word())
    }
}

/// Panic unless `width` bytes at `offset` lie inside a payload of `payload_len` bytes
pub(crate) fn check_bounds(offset: usize, width: usize, payload_len: usize) {
    let in_bounds = match offset.checked_add(width) {
        Some(end) => end <= payload_len,
        None => false,
    };

    assert!(
        in_bounds,
        "access of {} bytes at offset {} is outside a payload of {} bytes",
        width,
        offset,
        payload_len
    );
}

/// A read-only view of a live object's payload, limited to the lifetime of the heap borrow
/// it was derived from. Trace callbacks receive one of these.
#[derive(Copy, Clone)]
pub struct ObjectView<'heap> {
    object: ObjectRef,
    type_id: TypeId,
    payload_len: usize,
    _heap: PhantomData<&'heap ()>,
}

impl<'heap> ObjectView<'heap> {
    /// The object must be live and `payload_len` must be its true payload size.
    pub(crate) unsafe fn new(object: ObjectRef, type_id: TypeId, payload_len: usize) -> ObjectView<'heap> {
        ObjectView {
            object,
            type_id,
            payload_len,
            _heap: PhantomData,
        }
    }

    pub fn object(&self) -> ObjectRef {
        self.object
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Read a word from the payload. Panics if out of bounds.
    pub fn read_word(&self, offset: usize) -> usize {
        check_bounds(offset, WORD_SIZE, self.payload_len);
        unsafe { self.object.read_payload_word(offset) }
    }

    /// Read a reference slot from the payload. Panics if out of bounds.
    pub fn read_ref(&self, offset: usize) -> Option<ObjectRef> {
        ObjectRef::from_word(self.read_word(offset))
    }

    /// The whole payload as bytes
    pub fn bytes(&self) -> &'heap [u8] {
        unsafe { slice::from_raw_parts(self.object.payload_ptr(), self.payload_len) }
    }
}

impl<'heap> fmt::Debug for ObjectView<'heap> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ObjectView")
            .field("object", &self.object)
            .field("type_id", &self.type_id)
            .field("payload_len", &self.payload_len)
            .finish()
    }
}
