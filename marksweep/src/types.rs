/// Per-type metadata: payload layout, weak slot position and the trace callback that
/// reports an object's outgoing references. Selected by `TypeId` through a `TypeTable`.
use std::fmt;

use crate::allocator::allocation_cost;
use crate::constants::{TYPE_ID_MASK, WORD_SIZE};
use crate::header::TypeId;
use crate::object::{ObjectRef, ObjectView};

/// Calls the visitor once for every managed reference held in the object. A weak slot
/// must not be reported.
pub type TraceFn = fn(ObjectView<'_>, &mut dyn FnMut(ObjectRef));

/// Trace callback for types that hold no references
pub fn no_refs(_object: ObjectView<'_>, _visitor: &mut dyn FnMut(ObjectRef)) {}

/// How the payload size of an object is determined
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ObjectLayout {
    /// Every instance has the same payload size
    Fixed { size: usize },
    /// `base_size + length * item_size` bytes, with `length` stored as a word at
    /// `length_offset` inside the base part
    VarSize {
        base_size: usize,
        item_size: usize,
        length_offset: usize,
    },
}

/// Everything the collector needs to know about one managed type
#[derive(Clone)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub layout: ObjectLayout,
    pub weak_offset: Option<usize>,
    pub trace: TraceFn,
}

impl TypeDescriptor {
    /// A fixed-size type with no references
    pub fn fixed(name: &'static str, size: usize) -> TypeDescriptor {
        TypeDescriptor {
            name,
            layout: ObjectLayout::Fixed { size },
            weak_offset: None,
            trace: no_refs,
        }
    }

    /// A variable-size type with no references
    pub fn varsize(
        name: &'static str,
        base_size: usize,
        item_size: usize,
        length_offset: usize,
    ) -> TypeDescriptor {
        TypeDescriptor {
            name,
            layout: ObjectLayout::VarSize {
                base_size,
                item_size,
                length_offset,
            },
            weak_offset: None,
            trace: no_refs,
        }
    }

    pub fn with_trace(self, trace: TraceFn) -> TypeDescriptor {
        TypeDescriptor { trace, ..self }
    }

    pub fn with_weak_offset(self, offset: usize) -> TypeDescriptor {
        TypeDescriptor {
            weak_offset: Some(offset),
            ..self
        }
    }

    /// Payload size of an instance with the given length, or `None` on overflow.
    /// The length is ignored for fixed-size types.
    pub fn payload_size(&self, length: usize) -> Option<usize> {
        match self.layout {
            ObjectLayout::Fixed { size } => Some(size),
            ObjectLayout::VarSize {
                base_size,
                item_size,
                ..
            } => item_size.checked_mul(length)?.checked_add(base_size),
        }
    }

    /// Payload size of a live instance. Variable-size objects do not record their size in
    /// the header, so the length word is read back.
    unsafe fn payload_size_of(&self, object: ObjectRef) -> usize {
        match self.layout {
            ObjectLayout::Fixed { size } => size,
            ObjectLayout::VarSize {
                base_size,
                item_size,
                length_offset,
            } => base_size + object.read_payload_word(length_offset) * item_size,
        }
    }

    /// Size of the part of the payload that does not vary with length
    fn fixed_part(&self) -> usize {
        match self.layout {
            ObjectLayout::Fixed { size } => size,
            ObjectLayout::VarSize { base_size, .. } => base_size,
        }
    }

    fn validate(&self) {
        let fixed_part = self.fixed_part();

        if let ObjectLayout::VarSize { length_offset, .. } = self.layout {
            assert!(
                length_offset + WORD_SIZE <= fixed_part,
                "type {}: length word at {} lies outside its base of {} bytes",
                self.name,
                length_offset,
                fixed_part
            );
        }

        if let Some(offset) = self.weak_offset {
            assert!(
                offset + WORD_SIZE <= fixed_part,
                "type {}: weak slot at {} lies outside its fixed part of {} bytes",
                self.name,
                offset,
                fixed_part
            );
        }

        if let (Some(offset), ObjectLayout::VarSize { length_offset, .. }) =
            (self.weak_offset, self.layout)
        {
            assert!(
                offset + WORD_SIZE <= length_offset || length_offset + WORD_SIZE <= offset,
                "type {}: weak slot at {} overlaps the length word",
                self.name,
                offset
            );
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("weak_offset", &self.weak_offset)
            .finish()
    }
}

/// The table of managed types, indexed by `TypeId`
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    types: Vec<TypeDescriptor>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable { types: Vec::new() }
    }

    /// Add a type and return its id. Panics if the layout is inconsistent or the table is
    /// full.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> TypeId {
        descriptor.validate();

        assert!(
            self.types.len() <= TYPE_ID_MASK,
            "type table is full, cannot register {}",
            descriptor.name
        );

        let id = TypeId::new(self.types.len());
        self.types.push(descriptor);
        id
    }

    pub fn get(&self, type_id: TypeId) -> Option<&TypeDescriptor> {
        self.types.get(type_id.index())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up a type id read from a live object header. An unknown id means the header
    /// is corrupt.
    pub(crate) fn expect(&self, type_id: TypeId) -> &TypeDescriptor {
        self.get(type_id)
            .unwrap_or_else(|| panic!("object header carries unregistered {:?}", type_id))
    }

    /// Build a view of a live object
    pub(crate) unsafe fn view(&self, object: ObjectRef) -> ObjectView<'_> {
        let type_id = object.header().type_id();
        let payload_len = self.expect(type_id).payload_size_of(object);
        ObjectView::new(object, type_id, payload_len)
    }

    /// The number of bytes a live object accounts for in the heap size
    pub(crate) unsafe fn allocation_cost(&self, object: ObjectRef) -> usize {
        let payload_len = self.view(object).payload_len();
        allocation_cost(payload_len)
            .unwrap_or_else(|| panic!("live {:?} has an unrepresentable size", object))
    }
}
