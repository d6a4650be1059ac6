/// The mark phase: an explicit-stack depth-first walk that sets `SURVIVING` on every object
/// it reaches, exactly once per collection.
use crate::header::GcFlags;
use crate::object::ObjectRef;
use crate::types::TypeTable;

pub(crate) struct Tracer<'types> {
    types: &'types TypeTable,
    stack: Vec<ObjectRef>,
    marked: usize,
}

impl<'types> Tracer<'types> {
    pub fn new(types: &'types TypeTable) -> Tracer<'types> {
        Tracer {
            types,
            stack: Vec::new(),
            marked: 0,
        }
    }

    /// Queue an object to be visited by the next `run()`
    pub fn push(&mut self, object: ObjectRef) {
        self.stack.push(object);
    }

    /// Visit everything reachable from the queued objects. Objects already carrying
    /// `SURVIVING` are skipped, which breaks cycles and makes repeated runs within one
    /// collection cheap. Returns the total number of objects marked by this tracer.
    pub fn run(&mut self) -> usize {
        let types = self.types;
        let stack = &mut self.stack;

        while let Some(object) = stack.pop() {
            let flags = unsafe { object.flags() };
            if flags.contains(GcFlags::SURVIVING) {
                continue;
            }

            unsafe { object.set_flags(flags | GcFlags::SURVIVING) };
            self.marked += 1;

            let view = unsafe { types.view(object) };
            let trace = types.expect(view.type_id()).trace;
            trace(view, &mut |child| stack.push(child));
        }

        self.marked
    }
}
