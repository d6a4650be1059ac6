/// Test fixtures: a small set of managed types and a raw memory wrapper that records every
/// allocation and free.
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use fnv::{FnvHashMap, FnvHashSet};
use rawalloc::ChunkError;

use crate::allocator::{RawMemory, SystemMemory};
use crate::config::GcConfig;
use crate::constants::WORD_SIZE;
use crate::header::TypeId;
use crate::heap::Heap;
use crate::object::{ObjectRef, ObjectView};
use crate::types::{TypeDescriptor, TypeTable};

/// Two strong reference slots
pub const NODE_SIZE: usize = 2 * WORD_SIZE;
/// A weak slot at offset 0 followed by a strong slot
pub const WEAK_SIZE: usize = 2 * WORD_SIZE;
/// The length word
pub const ARRAY_BASE: usize = WORD_SIZE;
/// One strong reference slot per item
pub const ARRAY_ITEM: usize = WORD_SIZE;
/// The length word followed by a weak slot, then strong items of `ARRAY_ITEM` bytes
pub const WEAK_ARRAY_BASE: usize = 2 * WORD_SIZE;

pub struct TestTypes {
    pub node: TypeId,
    pub weak: TypeId,
    pub array: TypeId,
    pub weak_array: TypeId,
    pub leaf: TypeId,
}

fn trace_node(object: ObjectView<'_>, visitor: &mut dyn FnMut(ObjectRef)) {
    for offset in (0..NODE_SIZE).step_by(WORD_SIZE) {
        if let Some(child) = object.read_ref(offset) {
            visitor(child);
        }
    }
}

fn trace_weak(object: ObjectView<'_>, visitor: &mut dyn FnMut(ObjectRef)) {
    if let Some(child) = object.read_ref(WORD_SIZE) {
        visitor(child);
    }
}

fn trace_array(object: ObjectView<'_>, visitor: &mut dyn FnMut(ObjectRef)) {
    let length = object.read_word(0);
    for index in 0..length {
        if let Some(child) = object.read_ref(ARRAY_BASE + index * ARRAY_ITEM) {
            visitor(child);
        }
    }
}

fn trace_weak_array(object: ObjectView<'_>, visitor: &mut dyn FnMut(ObjectRef)) {
    let length = object.read_word(0);
    for index in 0..length {
        if let Some(child) = object.read_ref(WEAK_ARRAY_BASE + index * ARRAY_ITEM) {
            visitor(child);
        }
    }
}

pub fn test_types() -> (TypeTable, TestTypes) {
    let mut types = TypeTable::new();

    let node = types.register(TypeDescriptor::fixed("node", NODE_SIZE).with_trace(trace_node));
    let weak = types.register(
        TypeDescriptor::fixed("weak", WEAK_SIZE)
            .with_weak_offset(0)
            .with_trace(trace_weak),
    );
    let array = types.register(
        TypeDescriptor::varsize("array", ARRAY_BASE, ARRAY_ITEM, 0).with_trace(trace_array),
    );
    let weak_array = types.register(
        TypeDescriptor::varsize("weak_array", WEAK_ARRAY_BASE, ARRAY_ITEM, 0)
            .with_weak_offset(WORD_SIZE)
            .with_trace(trace_weak_array),
    );
    let leaf = types.register(TypeDescriptor::fixed("leaf", WORD_SIZE));

    (
        types,
        TestTypes {
            node,
            weak,
            array,
            weak_array,
            leaf,
        },
    )
}

/// A heap whose threshold is out of reach, so only explicit calls collect
pub fn test_heap() -> (Heap, TestTypes) {
    let (types, t) = test_types();
    let config = GcConfig::default().with_initial_heap_size(1 << 30);
    (Heap::new(types, config), t)
}

pub fn counting_heap(config: GcConfig) -> (Heap, TestTypes, Rc<RefCell<MemoryLog>>) {
    let (types, t) = test_types();
    let log = Rc::new(RefCell::new(MemoryLog::default()));

    let memory = CountingMemory {
        inner: SystemMemory,
        log: log.clone(),
    };

    (Heap::with_memory(types, config, Box::new(memory)), t, log)
}

#[derive(Debug, Default)]
pub struct MemoryLog {
    live: FnvHashMap<usize, usize>,
    freed: FnvHashSet<usize>,
    allocations: usize,
    frees: usize,
    failing: bool,
}

impl MemoryLog {
    /// Whether the object's memory has been released and not handed out again
    pub fn was_freed(&self, object: ObjectRef) -> bool {
        self.freed.contains(&object.as_word())
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn frees(&self) -> usize {
        self.frees
    }

    /// While set, every raw allocation fails with `ChunkError::OOM`
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }
}

pub struct CountingMemory {
    inner: SystemMemory,
    log: Rc<RefCell<MemoryLog>>,
}

impl RawMemory for CountingMemory {
    fn raw_allocate(&mut self, size: usize) -> Result<NonNull<u8>, ChunkError> {
        if self.log.borrow().failing {
            return Err(ChunkError::OOM);
        }

        let ptr = self.inner.raw_allocate(size)?;
        let address = ptr.as_ptr() as usize;

        let mut log = self.log.borrow_mut();
        log.allocations += 1;
        log.freed.remove(&address);
        log.live.insert(address, size);

        Ok(ptr)
    }

    unsafe fn raw_free(&mut self, ptr: NonNull<u8>, size: usize) {
        let address = ptr.as_ptr() as usize;

        {
            let mut log = self.log.borrow_mut();
            match log.live.remove(&address) {
                Some(allocated) => assert_eq!(allocated, size, "freed with a different size"),
                None => panic!("double free of {:#x}", address),
            }
            log.freed.insert(address);
            log.frees += 1;
        }

        self.inner.raw_free(ptr, size);
    }
}
