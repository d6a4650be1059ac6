/// Finalizer partitioning. Runs after the initial mark: entries whose object is still
/// reachable stay registered, the rest are removed for good, re-marked together with
/// everything they reference, and handed back to be run once sweep has finished.
use tracing::trace;

use crate::header::GcFlags;
use crate::mark::Tracer;
use crate::registry::{FinalizerEntry, FinalizerRegistry};

pub(crate) fn schedule(registry: &mut FinalizerRegistry, tracer: &mut Tracer<'_>) -> Vec<FinalizerEntry> {
    let mut pending = FinalizerRegistry::new();
    let mut scheduled = Vec::new();

    while let Some(entry) = registry.pop_front() {
        let flags = unsafe { entry.object.flags() };

        if flags.contains(GcFlags::SURVIVING) {
            pending.push_back(entry);
            continue;
        }

        assert!(
            !flags.contains(GcFlags::FINALIZER_REACHABLE),
            "finalizer for {:?} scheduled twice",
            entry.object
        );
        unsafe { entry.object.set_flags(flags | GcFlags::FINALIZER_REACHABLE) };

        trace!(object = ?entry.object, queue = ?entry.queue, "scheduling finalizer");

        // keep the object and its subgraph alive through the sweep
        tracer.push(entry.object);
        tracer.run();

        scheduled.push(entry);
    }

    *registry = pending;
    scheduled
}
