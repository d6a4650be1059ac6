/// The collection cycle. Phases run in a fixed order: mark, finalizer scheduling, weak
/// reference invalidation, sweep, finalizer execution. The heap is `Collecting` from the
/// first phase until the baseline for the next growth check is committed.
use std::cmp;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::finalizer;
use crate::header::GcFlags;
use crate::heap::{CollectorState, Heap};
use crate::mark::Tracer;
use crate::registry::FinalizerEntry;
use crate::roots::RootSet;
use crate::sweep::{self, SweepOutcome};
use crate::weakref;

impl Heap {
    /// Run a full collection. Calling this while a collection is in progress, for example
    /// from a finalizer, does nothing.
    pub fn collect(&mut self) {
        if self.state == CollectorState::Collecting {
            trace!("collection already in progress");
            return;
        }
        self.state = CollectorState::Collecting;

        debug!(
            heap_size = self.heap_size,
            objects = self.objects.len(),
            "collection started"
        );

        self.assert_unmarked();

        let (marked, scheduled) = self.mark();
        let cleared = self.invalidate_weakrefs();
        let outcome = self.sweep_objects();

        self.stats.collections += 1;
        self.stats.objects_freed += outcome.freed;
        self.stats.bytes_freed += outcome.freed_bytes;
        self.stats.weakrefs_cleared += cleared;
        self.stats.last_marked = marked;
        self.stats.last_freed = outcome.freed;
        self.stats.last_freed_bytes = outcome.freed_bytes;

        self.run_finalizers(scheduled);

        self.previous_heap_size = cmp::max(self.heap_size, self.config.min_heap_size);
        self.state = CollectorState::Idle;

        debug!(
            marked,
            freed = outcome.freed,
            freed_bytes = outcome.freed_bytes,
            weakrefs_cleared = cleared,
            heap_size = self.heap_size,
            threshold = self.growth_threshold(),
            "collection finished"
        );
    }

    /// Mark from every root, then move unreachable finalizable objects out of the
    /// finalizer registry, keeping them and what they reference alive for this cycle.
    fn mark(&mut self) -> (usize, Vec<FinalizerEntry>) {
        let mut tracer = Tracer::new(&self.types);

        self.roots.enumerate_roots(&mut |object| tracer.push(object));
        for scanner in &self.scanners {
            scanner.enumerate_roots(&mut |object| tracer.push(object));
        }
        for object in &self.external {
            tracer.push(*object);
        }

        let reachable = tracer.run();

        let scheduled = if self.finalizers.is_empty() {
            Vec::new()
        } else {
            finalizer::schedule(&mut self.finalizers, &mut tracer)
        };

        let marked = tracer.run();
        debug!(
            reachable,
            finalizers_scheduled = scheduled.len(),
            revived = marked - reachable,
            "mark finished"
        );

        (marked, scheduled)
    }

    fn invalidate_weakrefs(&mut self) -> usize {
        if self.weakrefs.is_empty() {
            return 0;
        }
        weakref::invalidate(&mut self.weakrefs, &self.types)
    }

    pub(crate) fn sweep_objects(&mut self) -> SweepOutcome {
        sweep::sweep(
            &mut self.objects,
            &self.external,
            &self.types,
            self.memory.as_mut(),
            &mut self.heap_size,
        )
    }

    /// Call each scheduled finalizer once, in scheduling order
    fn run_finalizers(&mut self, scheduled: Vec<FinalizerEntry>) {
        for entry in scheduled {
            let callback = Rc::clone(&self.queues[entry.queue.0]);

            trace!(object = ?entry.object, light = entry.light, "running finalizer");
            callback(self, entry.object);

            self.stats.finalizers_run += 1;
            if entry.light {
                self.stats.light_finalizers_run += 1;
            }
        }
    }

    /// Between collections no object may carry `SURVIVING`. A leftover mark would let an
    /// unreachable object outlive the sweep, so this runs in release builds too.
    fn assert_unmarked(&self) {
        for object in self.objects.iter().chain(self.external.iter().copied()) {
            assert!(
                !unsafe { object.flags() }.contains(GcFlags::SURVIVING),
                "{:?} is SURVIVING outside of a collection",
                object
            );
        }
    }
}
