/// The shell's object model: four managed types and the slot layout of each.
use std::fmt;

use marksweep::{no_refs, Heap, ObjectRef, ObjectView, TypeDescriptor, TypeId, TypeTable, WORD_SIZE};

pub const CELL_SIZE: usize = 2 * WORD_SIZE;
pub const WEAK_SIZE: usize = WORD_SIZE;
/// Vectors and blobs both start with their length word
pub const LENGTH_SIZE: usize = WORD_SIZE;
pub const BLOB_ITEM: usize = 1;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Kind {
    Cell,
    Vector,
    Blob,
    Weak,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Kind::Cell => "cell",
            Kind::Vector => "vector",
            Kind::Blob => "blob",
            Kind::Weak => "weak",
        };
        write!(f, "{}", name)
    }
}

fn trace_cell(object: ObjectView<'_>, visitor: &mut dyn FnMut(ObjectRef)) {
    for offset in &[0, WORD_SIZE] {
        if let Some(child) = object.read_ref(*offset) {
            visitor(child);
        }
    }
}

fn trace_vector(object: ObjectView<'_>, visitor: &mut dyn FnMut(ObjectRef)) {
    let length = object.read_word(0);
    for index in 0..length {
        if let Some(child) = object.read_ref(LENGTH_SIZE + index * WORD_SIZE) {
            visitor(child);
        }
    }
}

/// Type ids of the shell's managed types
pub struct Model {
    pub cell: TypeId,
    pub vector: TypeId,
    pub blob: TypeId,
    pub weak: TypeId,
}

impl Model {
    pub fn new() -> (TypeTable, Model) {
        let mut types = TypeTable::new();

        let cell = types.register(TypeDescriptor::fixed("cell", CELL_SIZE).with_trace(trace_cell));
        let vector = types.register(
            TypeDescriptor::varsize("vector", LENGTH_SIZE, WORD_SIZE, 0).with_trace(trace_vector),
        );
        let blob = types.register(
            TypeDescriptor::varsize("blob", LENGTH_SIZE, BLOB_ITEM, 0).with_trace(no_refs),
        );
        let weak = types.register(TypeDescriptor::fixed("weak", WEAK_SIZE).with_weak_offset(0));

        (
            types,
            Model {
                cell,
                vector,
                blob,
                weak,
            },
        )
    }

    pub fn kind_of(&self, heap: &Heap, object: ObjectRef) -> Kind {
        let type_id = heap.type_of(object);

        if type_id == self.cell {
            Kind::Cell
        } else if type_id == self.vector {
            Kind::Vector
        } else if type_id == self.blob {
            Kind::Blob
        } else {
            Kind::Weak
        }
    }

    /// Payload offset of a reference slot, or `None` if the object has no such slot
    pub fn slot_offset(&self, heap: &Heap, object: ObjectRef, slot: usize) -> Option<usize> {
        match self.kind_of(heap, object) {
            Kind::Cell if slot < 2 => Some(slot * WORD_SIZE),
            Kind::Vector if slot < heap.length_of(object).unwrap_or(0) => {
                Some(LENGTH_SIZE + slot * WORD_SIZE)
            }
            Kind::Weak if slot == 0 => heap
                .types()
                .get(heap.type_of(object))
                .and_then(|descriptor| descriptor.weak_offset),
            _ => None,
        }
    }
}
