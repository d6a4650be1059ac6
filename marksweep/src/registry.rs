/// The collector's bookkeeping collections: every allocated object, the objects awaiting
/// finalization and the objects holding a weak slot.
use std::collections::VecDeque;

use fnv::FnvHashSet;

use crate::heap::QueueIndex;
use crate::object::ObjectRef;

/// Every allocated, not yet freed object, in allocation order
#[derive(Debug, Default)]
pub struct AllocationRegistry {
    objects: VecDeque<ObjectRef>,
}

impl AllocationRegistry {
    pub fn new() -> AllocationRegistry {
        AllocationRegistry {
            objects: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, object: ObjectRef) {
        self.objects.push_back(object);
    }

    pub fn pop_front(&mut self) -> Option<ObjectRef> {
        self.objects.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Linear scan
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.objects.contains(&object)
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.objects.iter().copied()
    }
}

/// An object whose finalizer has not yet been scheduled
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FinalizerEntry {
    pub object: ObjectRef,
    pub queue: QueueIndex,
    pub light: bool,
}

#[derive(Debug, Default)]
pub struct FinalizerRegistry {
    entries: VecDeque<FinalizerEntry>,
}

impl FinalizerRegistry {
    pub fn new() -> FinalizerRegistry {
        FinalizerRegistry {
            entries: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, entry: FinalizerEntry) {
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<FinalizerEntry> {
        self.entries.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        self.entries.iter().any(|entry| entry.object == object)
    }
}

/// Objects containing a weak slot. Re-checked every collection while registered.
#[derive(Debug, Default)]
pub struct WeakRegistry {
    objects: FnvHashSet<ObjectRef>,
}

impl WeakRegistry {
    pub fn new() -> WeakRegistry {
        WeakRegistry {
            objects: FnvHashSet::default(),
        }
    }

    pub fn insert(&mut self, object: ObjectRef) {
        self.objects.insert(object);
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&ObjectRef) -> bool,
    {
        self.objects.retain(keep);
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        self.objects.contains(&object)
    }
}
