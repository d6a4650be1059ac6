use std::rc::Rc;
use std::slice;

use tracing::debug;

use crate::allocator::{allocation_cost, RawMemory, SystemMemory};
use crate::config::GcConfig;
use crate::constants::WORD_SIZE;
use crate::error::GcError;
use crate::header::{GcFlags, Header, TypeId};
use crate::object::{check_bounds, ObjectRef, ObjectView};
use crate::registry::{AllocationRegistry, FinalizerEntry, FinalizerRegistry, WeakRegistry};
use crate::roots::{RootId, RootSet, RootTable};
use crate::types::{ObjectLayout, TypeTable};

/// A finalizer callback. It runs after the sweep of the collection that found the object
/// unreachable, with the collection lock still held: it may allocate, mutate objects and
/// re-root the object it finalizes, but it cannot start a nested collection.
pub type FinalizerFn = Rc<dyn Fn(&mut Heap, ObjectRef)>;

/// Identifies a finalizer callback registered with `Heap::add_finalizer_queue()`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueueIndex(pub(crate) usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Collecting,
}

/// Counters accumulated over the life of a heap
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionStats {
    pub collections: usize,
    pub objects_freed: usize,
    pub bytes_freed: usize,
    /// All finalizers run, light ones included
    pub finalizers_run: usize,
    pub light_finalizers_run: usize,
    pub weakrefs_cleared: usize,
    pub last_marked: usize,
    pub last_freed: usize,
    pub last_freed_bytes: usize,
}

/// A non-moving mark-sweep heap and the single context every collector operation runs in.
///
/// Objects are allocated with `allocate_fixed()`, `allocate_varsize()` or
/// `allocate_external()` and addressed through `ObjectRef` handles. Reachability starts
/// from the heap's root table, any added root scanners and all external objects.
///
/// Handles passed to the accessor methods must refer to live objects. The heap cannot
/// detect a handle to an object that has already been swept.
pub struct Heap {
    pub(crate) config: GcConfig,
    pub(crate) types: TypeTable,
    pub(crate) memory: Box<dyn RawMemory>,

    pub(crate) objects: AllocationRegistry,
    pub(crate) external: Vec<ObjectRef>,
    pub(crate) finalizers: FinalizerRegistry,
    pub(crate) weakrefs: WeakRegistry,
    pub(crate) queues: Vec<FinalizerFn>,

    pub(crate) roots: RootTable,
    pub(crate) scanners: Vec<Box<dyn RootSet>>,

    pub(crate) heap_size: usize,
    pub(crate) previous_heap_size: usize,
    pub(crate) state: CollectorState,
    pub(crate) stats: CollectionStats,
}

impl Heap {
    pub fn new(types: TypeTable, config: GcConfig) -> Heap {
        Heap::with_memory(types, config, Box::new(SystemMemory))
    }

    /// Instantiate a heap over a specific raw allocation primitive
    pub fn with_memory(types: TypeTable, config: GcConfig, memory: Box<dyn RawMemory>) -> Heap {
        config.validate();

        Heap {
            previous_heap_size: config.initial_heap_size,
            config,
            types,
            memory,
            objects: AllocationRegistry::new(),
            external: Vec::new(),
            finalizers: FinalizerRegistry::new(),
            weakrefs: WeakRegistry::new(),
            queues: Vec::new(),
            roots: RootTable::new(),
            scanners: Vec::new(),
            heap_size: 0,
            state: CollectorState::Idle,
            stats: CollectionStats::default(),
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Register a finalizer callback, to be named when allocating finalizable objects
    pub fn add_finalizer_queue<F>(&mut self, callback: F) -> QueueIndex
    where
        F: Fn(&mut Heap, ObjectRef) + 'static,
    {
        self.queues.push(Rc::new(callback));
        QueueIndex(self.queues.len() - 1)
    }

    pub fn add_root(&mut self, object: ObjectRef) -> RootId {
        self.roots.add(Some(object))
    }

    pub fn set_root(&mut self, id: RootId, object: Option<ObjectRef>) {
        self.roots.set(id, object);
    }

    pub fn get_root(&self, id: RootId) -> Option<ObjectRef> {
        self.roots.get(id)
    }

    pub fn remove_root(&mut self, id: RootId) {
        self.roots.remove(id);
    }

    /// Add an external root enumerator, consulted on every collection
    pub fn add_root_scanner(&mut self, scanner: Box<dyn RootSet>) {
        self.scanners.push(scanner);
    }

    /// Allocate a fixed-size object. `size` must be the type's registered payload size and
    /// `contains_weakptr` requires the type to declare a weak slot. Objects of a type with a
    /// weak slot are registered for weak invalidation whatever `contains_weakptr` says.
    pub fn allocate_fixed(
        &mut self,
        type_id: TypeId,
        size: usize,
        finalizer: Option<QueueIndex>,
        is_finalizer_light: bool,
        contains_weakptr: bool,
    ) -> Result<ObjectRef, GcError> {
        let descriptor = self.types.get(type_id).ok_or(GcError::UnknownType(type_id))?;
        let has_weak_slot = descriptor.weak_offset.is_some();

        if descriptor.layout != (ObjectLayout::Fixed { size })
            || (contains_weakptr && !has_weak_slot)
        {
            return Err(GcError::LayoutMismatch(type_id));
        }

        if let Some(queue) = finalizer {
            if queue.0 >= self.queues.len() {
                return Err(GcError::UnknownFinalizerQueue(queue));
            }
        }

        let cost = allocation_cost(size).ok_or(GcError::OutOfMemory)?;
        let object = self.allocate_raw(type_id, cost)?;

        if let Some(queue) = finalizer {
            self.finalizers.push_back(FinalizerEntry {
                object,
                queue,
                light: is_finalizer_light,
            });
        }

        if has_weak_slot {
            self.weakrefs.insert(object);
        }

        Ok(object)
    }

    /// Allocate a variable-size object of `base_size + length * item_size` payload bytes,
    /// recording `length` at `length_field_offset`. Size overflow fails with `OutOfMemory`
    /// before any memory is requested.
    pub fn allocate_varsize(
        &mut self,
        type_id: TypeId,
        length: usize,
        base_size: usize,
        item_size: usize,
        length_field_offset: usize,
    ) -> Result<ObjectRef, GcError> {
        let descriptor = self.types.get(type_id).ok_or(GcError::UnknownType(type_id))?;

        let expected = ObjectLayout::VarSize {
            base_size,
            item_size,
            length_offset: length_field_offset,
        };
        if descriptor.layout != expected {
            return Err(GcError::LayoutMismatch(type_id));
        }
        let has_weak_slot = descriptor.weak_offset.is_some();

        let cost = item_size
            .checked_mul(length)
            .and_then(|items| items.checked_add(base_size))
            .and_then(allocation_cost)
            .ok_or(GcError::OutOfMemory)?;

        let object = self.allocate_raw(type_id, cost)?;
        unsafe { object.write_payload_word(length_field_offset, length) };

        if has_weak_slot {
            self.weakrefs.insert(object);
        }

        Ok(object)
    }

    /// Allocate an immortal fixed-size object. It is never swept, is not counted in the
    /// heap size and acts as a root on every collection.
    pub fn allocate_external(&mut self, type_id: TypeId, size: usize) -> Result<ObjectRef, GcError> {
        let descriptor = self.types.get(type_id).ok_or(GcError::UnknownType(type_id))?;

        if descriptor.layout != (ObjectLayout::Fixed { size }) {
            return Err(GcError::LayoutMismatch(type_id));
        }
        let has_weak_slot = descriptor.weak_offset.is_some();

        let cost = allocation_cost(size).ok_or(GcError::OutOfMemory)?;
        let object = ObjectRef::new(self.memory.raw_allocate(cost)?);

        unsafe { object.set_header(Header::new(type_id, GcFlags::EXTERNAL)) };
        self.external.push(object);

        if has_weak_slot {
            self.weakrefs.insert(object);
        }

        Ok(object)
    }

    /// Growth check, raw allocation, header initialization and registration
    fn allocate_raw(&mut self, type_id: TypeId, cost: usize) -> Result<ObjectRef, GcError> {
        if self.exceeds_threshold(cost) {
            debug!(
                requested = cost,
                heap_size = self.heap_size,
                threshold = self.growth_threshold(),
                "allocation exceeds growth threshold"
            );
            self.collect();
        }

        let object = ObjectRef::new(self.memory.raw_allocate(cost)?);

        unsafe { object.set_header(Header::new(type_id, GcFlags::empty())) };
        self.objects.push_back(object);
        self.heap_size += cost;

        Ok(object)
    }

    fn exceeds_threshold(&self, requested: usize) -> bool {
        let wanted = self.heap_size as f64 + requested as f64;
        wanted > self.config.growth_factor * self.previous_heap_size as f64
    }

    /// The heap size past which the next allocation triggers a collection
    pub fn growth_threshold(&self) -> usize {
        (self.config.growth_factor * self.previous_heap_size as f64) as usize
    }

    pub fn previous_heap_size(&self) -> usize {
        self.previous_heap_size
    }

    /// Total allocation cost of every object in the allocation registry
    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Whether the object is in the allocation registry. External objects are not.
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.objects.contains(object)
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.objects.iter()
    }

    pub fn is_collecting(&self) -> bool {
        self.state == CollectorState::Collecting
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Number of finalizers registered but not yet scheduled
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.len()
    }

    pub fn has_pending_finalizer(&self, object: ObjectRef) -> bool {
        self.finalizers.contains(object)
    }

    pub fn weak_count(&self) -> usize {
        self.weakrefs.len()
    }

    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    pub fn header(&self, object: ObjectRef) -> Header {
        unsafe { object.header() }
    }

    pub fn type_of(&self, object: ObjectRef) -> TypeId {
        self.header(object).type_id()
    }

    pub fn flags(&self, object: ObjectRef) -> GcFlags {
        self.header(object).flags()
    }

    pub fn view(&self, object: ObjectRef) -> ObjectView<'_> {
        unsafe { self.types.view(object) }
    }

    pub fn payload_len(&self, object: ObjectRef) -> usize {
        self.view(object).payload_len()
    }

    /// The recorded length of a variable-size object, `None` for fixed-size objects
    pub fn length_of(&self, object: ObjectRef) -> Option<usize> {
        match self.types.expect(self.type_of(object)).layout {
            ObjectLayout::Fixed { .. } => None,
            ObjectLayout::VarSize { length_offset, .. } => {
                Some(unsafe { object.read_payload_word(length_offset) })
            }
        }
    }

    pub fn read_word(&self, object: ObjectRef, offset: usize) -> usize {
        self.view(object).read_word(offset)
    }

    pub fn read_ref(&self, object: ObjectRef, offset: usize) -> Option<ObjectRef> {
        self.view(object).read_ref(offset)
    }

    /// Write a payload word. The length word of a variable-size object cannot be written.
    pub fn write_word(&mut self, object: ObjectRef, offset: usize, word: usize) {
        self.check_writable(object, offset, WORD_SIZE);
        unsafe { object.write_payload_word(offset, word) };
    }

    pub fn write_ref(&mut self, object: ObjectRef, offset: usize, target: Option<ObjectRef>) {
        let word = target.map_or(0, |target| target.as_word());
        self.write_word(object, offset, word);
    }

    pub fn payload(&self, object: ObjectRef) -> &[u8] {
        self.view(object).bytes()
    }

    /// Mutable access to the payload: all of it for a fixed-size object, everything after
    /// the length word for a variable-size one. Bytes before the length word are written
    /// with `write_word`.
    pub fn payload_mut(&mut self, object: ObjectRef) -> &mut [u8] {
        let len = self.payload_len(object);
        let start = match self.types.expect(self.type_of(object)).layout {
            ObjectLayout::Fixed { .. } => 0,
            ObjectLayout::VarSize { length_offset, .. } => length_offset + WORD_SIZE,
        };
        unsafe { slice::from_raw_parts_mut(object.payload_ptr().add(start), len - start) }
    }

    fn check_writable(&self, object: ObjectRef, offset: usize, width: usize) {
        check_bounds(offset, width, self.payload_len(object));

        let layout = self.types.expect(self.type_of(object)).layout;
        if let ObjectLayout::VarSize { length_offset, .. } = layout {
            assert!(
                offset + width <= length_offset || length_offset + WORD_SIZE <= offset,
                "the length word of {:?} is read-only",
                object
            );
        }
    }

    /// Release every object, clear every registry and counter. Finalizers do not run.
    /// The type table, finalizer queues and root scanners are kept; the root table is
    /// emptied. Panics if called while a collection is running.
    pub fn reset(&mut self) {
        assert!(!self.is_collecting(), "reset called during a collection");

        self.release_all();

        self.finalizers = FinalizerRegistry::new();
        self.weakrefs = WeakRegistry::new();
        self.roots.clear();
        self.heap_size = 0;
        self.previous_heap_size = self.config.initial_heap_size;
        self.state = CollectorState::Idle;
        self.stats = CollectionStats::default();
    }

    fn release_all(&mut self) {
        while let Some(object) = self.objects.pop_front() {
            let cost = unsafe { self.types.allocation_cost(object) };
            unsafe { self.memory.raw_free(object.as_non_null(), cost) };
        }

        for object in self.external.drain(..) {
            let cost = unsafe { self.types.allocation_cost(object) };
            unsafe { self.memory.raw_free(object.as_non_null(), cost) };
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::testing::{
        counting_heap, test_heap, ARRAY_BASE, ARRAY_ITEM, NODE_SIZE, WEAK_ARRAY_BASE, WEAK_SIZE,
    };
    use rawalloc::ChunkError;

    #[test]
    fn test_allocate_fixed() {
        let (mut heap, t) = test_heap();
        let object = heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();

        assert_eq!(heap.type_of(object), t.node);
        assert_eq!(heap.flags(object), GcFlags::empty());
        assert_eq!(heap.payload_len(object), NODE_SIZE);
        assert!(heap.payload(object).iter().all(|b| *b == 0));
        assert_eq!(heap.read_ref(object, 0), None);
        assert_eq!(heap.length_of(object), None);
        assert_eq!(heap.heap_size(), allocation_cost(NODE_SIZE).unwrap());
        assert_eq!(heap.object_count(), 1);
        assert!(heap.contains(object));
    }

    #[test]
    fn test_allocate_varsize() {
        let (mut heap, t) = test_heap();
        let array = heap.allocate_varsize(t.array, 3, ARRAY_BASE, ARRAY_ITEM, 0).unwrap();
        let empty = heap.allocate_varsize(t.array, 0, ARRAY_BASE, ARRAY_ITEM, 0).unwrap();

        assert_eq!(heap.length_of(array), Some(3));
        assert_eq!(heap.payload_len(array), ARRAY_BASE + 3 * ARRAY_ITEM);
        assert_eq!(heap.length_of(empty), Some(0));
        assert_eq!(
            heap.heap_size(),
            allocation_cost(ARRAY_BASE + 3 * ARRAY_ITEM).unwrap() + allocation_cost(ARRAY_BASE).unwrap()
        );
    }

    #[test]
    fn test_registration() {
        let (mut heap, t) = test_heap();
        let queue = heap.add_finalizer_queue(|_, _| {});

        let plain = heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();
        let finalizable = heap.allocate_fixed(t.node, NODE_SIZE, Some(queue), false, false).unwrap();
        let weak = heap.allocate_fixed(t.weak, WEAK_SIZE, None, false, true).unwrap();

        assert!(!heap.has_pending_finalizer(plain));
        assert!(heap.has_pending_finalizer(finalizable));
        assert_eq!(heap.pending_finalizers(), 1);
        assert_eq!(heap.weak_count(), 1);
        assert!(heap.weakrefs.contains(weak));
    }

    #[test]
    fn test_weak_registration_follows_type() {
        let (mut heap, t) = test_heap();

        let unflagged = heap.allocate_fixed(t.weak, WEAK_SIZE, None, false, false).unwrap();
        let array = heap
            .allocate_varsize(t.weak_array, 1, WEAK_ARRAY_BASE, ARRAY_ITEM, 0)
            .unwrap();
        let pinned = heap.allocate_external(t.weak, WEAK_SIZE).unwrap();
        heap.allocate_varsize(t.array, 1, ARRAY_BASE, ARRAY_ITEM, 0).unwrap();
        heap.allocate_external(t.node, NODE_SIZE).unwrap();

        assert_eq!(heap.weak_count(), 3);
        for object in &[unflagged, array, pinned] {
            assert!(heap.weakrefs.contains(*object));
        }
    }

    #[test]
    fn test_raw_allocation_failure() {
        let (mut heap, t, log) = counting_heap(GcConfig::default().with_initial_heap_size(1 << 30));
        let queue = heap.add_finalizer_queue(|_, _| {});
        heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();

        log.borrow_mut().set_failing(true);
        let oom = Err(GcError::AllocationFailed(ChunkError::OOM));

        assert_eq!(heap.allocate_fixed(t.weak, WEAK_SIZE, Some(queue), true, true), oom);
        assert_eq!(heap.allocate_varsize(t.weak_array, 4, WEAK_ARRAY_BASE, ARRAY_ITEM, 0), oom);
        assert_eq!(heap.allocate_external(t.node, NODE_SIZE), oom);

        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.heap_size(), allocation_cost(NODE_SIZE).unwrap());
        assert_eq!(heap.pending_finalizers(), 0);
        assert_eq!(heap.weak_count(), 0);
        assert_eq!(log.borrow().allocations(), 1);

        // nothing is retried; the next request succeeds once memory is back
        log.borrow_mut().set_failing(false);
        heap.allocate_fixed(t.weak, WEAK_SIZE, Some(queue), true, true).unwrap();
        assert_eq!(heap.object_count(), 2);
        assert_eq!(log.borrow().allocations(), 2);
    }

    #[test]
    fn test_request_errors() {
        let (mut heap, t) = test_heap();

        assert_eq!(
            heap.allocate_fixed(TypeId::new(99), NODE_SIZE, None, false, false),
            Err(GcError::UnknownType(TypeId::new(99)))
        );
        assert_eq!(
            heap.allocate_fixed(t.node, NODE_SIZE + 1, None, false, false),
            Err(GcError::LayoutMismatch(t.node))
        );
        assert_eq!(
            heap.allocate_fixed(t.node, NODE_SIZE, None, false, true),
            Err(GcError::LayoutMismatch(t.node))
        );
        assert_eq!(
            heap.allocate_varsize(t.node, 1, NODE_SIZE, 1, 0),
            Err(GcError::LayoutMismatch(t.node))
        );
        assert_eq!(
            heap.allocate_fixed(t.node, NODE_SIZE, Some(QueueIndex(3)), false, false),
            Err(GcError::UnknownFinalizerQueue(QueueIndex(3)))
        );
        assert_eq!(heap.object_count(), 0);
    }

    #[test]
    fn test_varsize_overflow_before_raw_allocation() {
        let (mut heap, t, log) = counting_heap(GcConfig::default());

        let result = heap.allocate_varsize(t.array, usize::MAX / 2, ARRAY_BASE, ARRAY_ITEM, 0);

        assert_eq!(result, Err(GcError::OutOfMemory));
        assert_eq!(log.borrow().allocations(), 0);
        assert_eq!(heap.stats().collections, 0);
        assert_eq!(heap.heap_size(), 0);
    }

    #[test]
    #[should_panic(expected = "read-only")]
    fn test_length_word_read_only() {
        let (mut heap, t) = test_heap();
        let array = heap.allocate_varsize(t.array, 2, ARRAY_BASE, ARRAY_ITEM, 0).unwrap();
        heap.write_word(array, 0, 1000);
    }

    #[test]
    fn test_payload_mut_skips_length_word() {
        let (mut heap, t) = test_heap();
        let array = heap.allocate_varsize(t.array, 2, ARRAY_BASE, ARRAY_ITEM, 0).unwrap();
        let node = heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();

        let items = heap.payload_mut(array);
        assert_eq!(items.len(), 2 * ARRAY_ITEM);
        for byte in items.iter_mut() {
            *byte = 0xff;
        }

        assert_eq!(heap.length_of(array), Some(2));
        assert_eq!(heap.read_word(array, ARRAY_BASE), usize::MAX);
        assert_eq!(heap.payload_mut(node).len(), NODE_SIZE);

        heap.write_word(array, ARRAY_BASE, 0);
        heap.write_word(array, ARRAY_BASE + ARRAY_ITEM, 0);
    }

    #[test]
    #[should_panic(expected = "reset called during a collection")]
    fn test_reset_from_finalizer() {
        let (mut heap, t) = test_heap();
        let queue = heap.add_finalizer_queue(|heap, _| heap.reset());

        heap.allocate_fixed(t.node, NODE_SIZE, Some(queue), false, false).unwrap();
        heap.allocate_fixed(t.node, NODE_SIZE, Some(queue), false, false).unwrap();
        heap.collect();
    }

    #[test]
    #[should_panic(expected = "outside a payload")]
    fn test_write_out_of_bounds() {
        let (mut heap, t) = test_heap();
        let object = heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();
        heap.write_ref(object, NODE_SIZE, None);
    }

    #[test]
    fn test_external_objects() {
        let (mut heap, t) = test_heap();
        let pinned = heap.allocate_external(t.node, NODE_SIZE).unwrap();

        assert_eq!(heap.flags(pinned), GcFlags::EXTERNAL);
        assert_eq!(heap.heap_size(), 0);
        assert!(!heap.contains(pinned));
    }

    #[test]
    fn test_reset() {
        let (mut heap, t, log) = counting_heap(GcConfig::default());
        let queue = heap.add_finalizer_queue(|_, _| panic!("finalizers must not run on reset"));

        let a = heap.allocate_fixed(t.node, NODE_SIZE, Some(queue), false, false).unwrap();
        heap.allocate_fixed(t.weak, WEAK_SIZE, None, false, true).unwrap();
        heap.allocate_external(t.node, NODE_SIZE).unwrap();
        heap.add_root(a);
        heap.collect();

        heap.reset();

        assert_eq!(heap.heap_size(), 0);
        assert_eq!(heap.object_count(), 0);
        assert_eq!(heap.pending_finalizers(), 0);
        assert_eq!(heap.weak_count(), 0);
        assert_eq!(heap.previous_heap_size(), heap.config().initial_heap_size);
        assert_eq!(heap.stats(), &CollectionStats::default());
        assert_eq!(log.borrow().live(), 0);

        // the heap is usable again and the finalizer queue survived
        heap.allocate_fixed(t.node, NODE_SIZE, Some(queue), false, false).unwrap();
        assert_eq!(heap.object_count(), 1);
        heap.reset();
    }

    #[test]
    fn test_drop_releases_everything() {
        let (mut heap, t, log) = counting_heap(GcConfig::default());

        heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();
        heap.allocate_varsize(t.array, 10, ARRAY_BASE, ARRAY_ITEM, 0).unwrap();
        heap.allocate_external(t.node, NODE_SIZE).unwrap();
        assert_eq!(log.borrow().live(), 3);

        drop(heap);
        assert_eq!(log.borrow().live(), 0);
        assert_eq!(log.borrow().frees(), 3);
    }
}
