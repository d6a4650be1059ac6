/// The sweep phase: one pass over the allocation registry that frees every unmarked object,
/// returns survivors to the unmarked state and keeps the heap size counter exact.
use crate::allocator::RawMemory;
use crate::header::GcFlags;
use crate::object::ObjectRef;
use crate::registry::AllocationRegistry;
use crate::types::TypeTable;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct SweepOutcome {
    pub freed: usize,
    pub freed_bytes: usize,
}

pub(crate) fn sweep(
    objects: &mut AllocationRegistry,
    external: &[ObjectRef],
    types: &TypeTable,
    memory: &mut dyn RawMemory,
    heap_size: &mut usize,
) -> SweepOutcome {
    let mut survivors = AllocationRegistry::new();
    let mut outcome = SweepOutcome::default();

    while let Some(object) = objects.pop_front() {
        let flags = unsafe { object.flags() };

        if flags.contains(GcFlags::SURVIVING) {
            unsafe { object.set_flags(flags - GcFlags::SURVIVING) };
            survivors.push_back(object);
        } else {
            let cost = unsafe { types.allocation_cost(object) };

            let remaining = heap_size.checked_sub(cost).unwrap_or_else(|| {
                panic!(
                    "heap size underflow: freeing {} bytes from a heap of {} bytes",
                    cost, heap_size
                )
            });
            *heap_size = remaining;

            unsafe { memory.raw_free(object.as_non_null(), cost) };

            outcome.freed += 1;
            outcome.freed_bytes += cost;
        }
    }

    *objects = survivors;

    // immortal objects are never freed but are marked like everything else
    for object in external {
        unsafe { object.set_flags(object.flags() - GcFlags::SURVIVING) };
    }

    outcome
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::allocator::allocation_cost;
    use crate::config::GcConfig;
    use crate::testing::{counting_heap, ARRAY_BASE, ARRAY_ITEM, NODE_SIZE};

    #[test]
    fn test_sweep_frees_unmarked() {
        let (mut heap, t, log) = counting_heap(GcConfig::default().with_initial_heap_size(1 << 20));
        let cost = allocation_cost(NODE_SIZE).unwrap();
        let array_cost = allocation_cost(ARRAY_BASE + 5 * ARRAY_ITEM).unwrap();

        let keep = heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();
        let lose = heap.allocate_fixed(t.node, NODE_SIZE, None, false, false).unwrap();
        let array = heap.allocate_varsize(t.array, 5, ARRAY_BASE, ARRAY_ITEM, 0).unwrap();
        assert_eq!(heap.heap_size(), 2 * cost + array_cost);

        unsafe { keep.set_flags(GcFlags::SURVIVING) };

        let outcome = heap.sweep_objects();

        assert_eq!(outcome, SweepOutcome { freed: 2, freed_bytes: cost + array_cost });
        assert_eq!(heap.heap_size(), cost);
        assert_eq!(heap.object_count(), 1);
        assert!(heap.contains(keep));
        assert!(!heap.contains(lose));
        assert!(!heap.flags(keep).contains(GcFlags::SURVIVING));

        let log = log.borrow();
        assert!(log.was_freed(lose));
        assert!(log.was_freed(array));
        assert!(!log.was_freed(keep));
    }

    #[test]
    fn test_sweep_clears_external_marks() {
        let (mut heap, t, log) = counting_heap(GcConfig::default());
        let pinned = heap.allocate_external(t.node, NODE_SIZE).unwrap();

        unsafe { pinned.set_flags(pinned.flags() | GcFlags::SURVIVING) };
        let outcome = heap.sweep_objects();

        assert_eq!(outcome.freed, 0);
        assert_eq!(heap.flags(pinned), GcFlags::EXTERNAL);
        assert!(!log.borrow().was_freed(pinned));
    }
}
