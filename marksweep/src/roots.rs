/// Root enumeration. The heap keeps its own table of roots and may also consult any
/// number of external scanners implementing `RootSet`.
use std::cell::RefCell;
use std::rc::Rc;

use crate::object::ObjectRef;

/// Something that can list externally reachable objects
pub trait RootSet {
    fn enumerate_roots(&self, visitor: &mut dyn FnMut(ObjectRef));
}

impl RootSet for Vec<ObjectRef> {
    fn enumerate_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        for object in self {
            visitor(*object);
        }
    }
}

/// A shared scanner, so the embedder can keep mutating roots the heap enumerates
impl<T: RootSet + ?Sized> RootSet for Rc<RefCell<T>> {
    fn enumerate_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        self.borrow().enumerate_roots(visitor);
    }
}

/// Index of a slot in a `RootTable`. Slots are reused after removal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RootId(usize);

#[derive(Copy, Clone, Debug)]
enum Slot {
    Occupied(Option<ObjectRef>),
    Vacant,
}

/// A table of root slots, each empty or holding one object. Setting or removing a slot
/// that was already removed panics, since its id may have been handed out again.
#[derive(Debug, Default)]
pub struct RootTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl RootTable {
    pub fn new() -> RootTable {
        RootTable {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn add(&mut self, object: Option<ObjectRef>) -> RootId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Slot::Occupied(object);
                RootId(index)
            }
            None => {
                self.slots.push(Slot::Occupied(object));
                RootId(self.slots.len() - 1)
            }
        }
    }

    pub fn set(&mut self, id: RootId, object: Option<ObjectRef>) {
        *self.occupied(id) = Slot::Occupied(object);
    }

    /// The object in a slot, `None` for an empty or removed one
    pub fn get(&self, id: RootId) -> Option<ObjectRef> {
        match self.slots.get(id.0) {
            Some(Slot::Occupied(object)) => *object,
            _ => None,
        }
    }

    pub fn remove(&mut self, id: RootId) {
        *self.occupied(id) = Slot::Vacant;
        self.free.push(id.0);
    }

    fn occupied(&mut self, id: RootId) -> &mut Slot {
        match self.slots.get_mut(id.0) {
            Some(slot) if matches!(slot, Slot::Occupied(_)) => slot,
            _ => panic!("{:?} is not an allocated root slot", id),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Number of slots holding an object
    pub fn len(&self) -> usize {
        self.objects().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn objects(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(object) => *object,
            Slot::Vacant => None,
        })
    }
}

impl RootSet for RootTable {
    fn enumerate_roots(&self, visitor: &mut dyn FnMut(ObjectRef)) {
        for object in self.objects() {
            visitor(object);
        }
    }
}
