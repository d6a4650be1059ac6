/// Weak reference invalidation, run between mark and sweep while every header is still
/// readable. A weak slot whose target did not survive is overwritten with the empty
/// reference.
use crate::object::ObjectRef;
use crate::registry::WeakRegistry;
use crate::types::TypeTable;

/// Returns the number of slots cleared
pub(crate) fn invalidate(registry: &mut WeakRegistry, types: &TypeTable) -> usize {
    let mut cleared = 0;

    registry.retain(|object| unsafe {
        // the holder itself is about to be swept, its slot goes with it
        if !object.is_surviving() {
            return false;
        }

        let type_id = object.header().type_id();
        let offset = match types.expect(type_id).weak_offset {
            Some(offset) => offset,
            None => panic!("{:?} registered as weak but {:?} has no weak slot", object, type_id),
        };

        if let Some(target) = ObjectRef::from_word(object.read_payload_word(offset)) {
            if !target.is_surviving() {
                object.write_payload_word(offset, 0);
                cleared += 1;
            }
        }

        // a surviving holder stays registered so a slot written later is still checked
        true
    });

    cleared
}
