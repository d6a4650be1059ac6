/// The object header codec. Each managed object starts with one machine word packing a
/// 16 bit type id into the low bits and the collector flags into the remaining high bits.
use std::fmt;

use bitflags::bitflags;

use crate::constants::{TYPE_ID_BITS, TYPE_ID_MASK};

/// Identifies an entry in the `TypeTable`. Always fits in 16 bits.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u16);

impl TypeId {
    /// Build a type id from a table index. An index wider than 16 bits is a caller
    /// contract violation and panics.
    pub fn new(index: usize) -> TypeId {
        assert!(
            index <= TYPE_ID_MASK,
            "type id {} does not fit in {} bits",
            index,
            TYPE_ID_BITS
        );
        TypeId(index as u16)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for TypeId {
    fn from(id: u16) -> TypeId {
        TypeId(id)
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

bitflags! {
    /// Collector flags carried in the high bits of the header word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GcFlags: usize {
        /// Reached during the current collection. Never set outside a cycle.
        const SURVIVING = 1 << 0;
        /// Immortal object outside the allocation registry.
        const EXTERNAL = 1 << 1;
        /// The object's finalizer has been scheduled and its registry entry consumed.
        const FINALIZER_REACHABLE = 1 << 2;
    }
}

/// Decoded form of a header word
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    type_id: TypeId,
    flags: GcFlags,
}

impl Header {
    pub fn new(type_id: TypeId, flags: GcFlags) -> Header {
        Header { type_id, flags }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn flags(&self) -> GcFlags {
        self.flags
    }

    pub fn with_flags(self, flags: GcFlags) -> Header {
        Header {
            type_id: self.type_id,
            flags,
        }
    }

    /// Pack into a single word
    pub fn encode(&self) -> usize {
        encode(self.type_id, self.flags)
    }

    /// Unpack from a word produced by `encode()`
    pub fn decode(word: usize) -> Header {
        let (type_id, flags) = decode(word);
        Header { type_id, flags }
    }
}

pub fn encode(type_id: TypeId, flags: GcFlags) -> usize {
    (flags.bits() << TYPE_ID_BITS) | type_id.index()
}

pub fn decode(word: usize) -> (TypeId, GcFlags) {
    let type_id = TypeId((word & TYPE_ID_MASK) as u16);
    let flags = GcFlags::from_bits_retain(word >> TYPE_ID_BITS);
    (type_id, flags)
}
