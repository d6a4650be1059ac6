/// The heap shell: a line-oriented command language that allocates objects into a
/// collector heap, links them, binds them to names and drives collection.
use std::cell::RefCell;
use std::rc::Rc;

use fnv::{FnvHashMap, FnvHashSet};
use itertools::Itertools;
use tracing::debug;

use marksweep::{GcConfig, Heap, ObjectRef, QueueIndex, RootId, WORD_SIZE};

use crate::error::{err_syntax, ShellError};
use crate::model::{Model, BLOB_ITEM, CELL_SIZE, LENGTH_SIZE, WEAK_SIZE};

type Labels = Rc<RefCell<FnvHashMap<ObjectRef, String>>>;
type Messages = Rc<RefCell<Vec<String>>>;

const HELP: &str = "\
cell NAME                 allocate a cell with two reference slots
vector NAME LEN           allocate a vector of LEN reference slots
blob NAME LEN             allocate LEN bytes holding no references
weak NAME TARGET          allocate a weak reference to TARGET
finalizable NAME [light]  allocate a cell with a finalizer
set NAME SLOT TARGET|nil  store a reference in a slot
get NAME SLOT             show the object referenced by a slot
drop NAME                 unbind a name, the object is no longer a root
roots                     list bound names
collect                   run a collection
stats                     show heap and collection counters
help                      show this text";

/// Build a finalizer callback that reports the object it finalizes by the name it was
/// created under
fn reporter(labels: &Labels, messages: &Messages, light: bool) -> impl Fn(&mut Heap, ObjectRef) {
    let labels = labels.clone();
    let messages = messages.clone();

    move |_heap: &mut Heap, object: ObjectRef| {
        let name = match labels.borrow().get(&object) {
            Some(name) => name.clone(),
            None => format!("{:?}", object),
        };

        let message = if light {
            format!("finalized {} (light)", name)
        } else {
            format!("finalized {}", name)
        };
        messages.borrow_mut().push(message);
    }
}

pub struct Shell {
    heap: Heap,
    model: Model,
    /// Named bindings, each holding its object in the heap's root table
    bindings: FnvHashMap<String, RootId>,
    /// Creation names of live objects, kept after the name is unbound or rebound
    labels: Labels,
    /// Output produced by finalizers since the last command
    messages: Messages,
    finalizer: QueueIndex,
    light_finalizer: QueueIndex,
}

impl Shell {
    pub fn new(config: GcConfig) -> Shell {
        let (types, model) = Model::new();
        let mut heap = Heap::new(types, config);

        let labels = Labels::default();
        let messages = Messages::default();

        let finalizer = heap.add_finalizer_queue(reporter(&labels, &messages, false));
        let light_finalizer = heap.add_finalizer_queue(reporter(&labels, &messages, true));

        Shell {
            heap,
            model,
            bindings: FnvHashMap::default(),
            labels,
            messages,
            finalizer,
            light_finalizer,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Run one command line, returning the lines to print. Finalizer reports from any
    /// collection the command caused come first.
    pub fn execute(&mut self, line: &str) -> Result<Vec<String>, ShellError> {
        let collections = self.heap.stats().collections;

        let code = line.split('#').next().unwrap_or("");
        let words: Vec<&str> = code.split_whitespace().collect();

        let result = self.command(&words);

        if self.heap.stats().collections != collections {
            self.forget_dead_labels();
        }

        let mut output: Vec<String> = self.messages.borrow_mut().drain(..).collect();
        output.extend(result?);
        Ok(output)
    }

    fn command(&mut self, words: &[&str]) -> Result<Vec<String>, ShellError> {
        match words {
            [] => Ok(Vec::new()),

            ["cell", name] => {
                let object = self
                    .heap
                    .allocate_fixed(self.model.cell, CELL_SIZE, None, false, false)?;
                self.bind(name, object);
                Ok(vec![format!("{} = cell", name)])
            }

            ["vector", name, length] => {
                let length = parse_number(length)?;
                let object = self.heap.allocate_varsize(
                    self.model.vector,
                    length,
                    LENGTH_SIZE,
                    WORD_SIZE,
                    0,
                )?;
                self.bind(name, object);
                Ok(vec![format!("{} = vector[{}]", name, length)])
            }

            ["blob", name, length] => {
                let length = parse_number(length)?;
                let object =
                    self.heap
                        .allocate_varsize(self.model.blob, length, LENGTH_SIZE, BLOB_ITEM, 0)?;
                self.bind(name, object);
                Ok(vec![format!("{} = blob[{}]", name, length)])
            }

            ["weak", name, target] => {
                let target = self.resolve_target(target)?;
                let object = self
                    .heap
                    .allocate_fixed(self.model.weak, WEAK_SIZE, None, false, true)?;
                self.heap.write_ref(object, 0, target);
                self.bind(name, object);
                Ok(vec![format!("{} = weak -> {}", name, self.describe(target))])
            }

            ["finalizable", name] => self.finalizable(name, false),
            ["finalizable", name, "light"] => self.finalizable(name, true),

            ["set", name, slot, target] => {
                let object = self.resolve(name)?;
                let offset = self.slot_offset(name, object, slot)?;
                let target = self.resolve_target(target)?;

                self.heap.write_ref(object, offset, target);
                Ok(vec![format!("{}.{} = {}", name, slot, self.describe(target))])
            }

            ["get", name, slot] => {
                let object = self.resolve(name)?;
                let offset = self.slot_offset(name, object, slot)?;
                let target = self.heap.read_ref(object, offset);

                Ok(vec![format!("{}.{} = {}", name, slot, self.describe(target))])
            }

            ["drop", name] => {
                let root = self
                    .bindings
                    .remove(*name)
                    .ok_or_else(|| ShellError::UnknownName(name.to_string()))?;
                self.heap.remove_root(root);
                Ok(vec![format!("dropped {}", name)])
            }

            ["roots"] => Ok(self
                .bindings
                .iter()
                .sorted_by(|a, b| a.0.cmp(b.0))
                .filter_map(|(name, root)| {
                    let object = self.heap.get_root(*root)?;
                    Some(format!("{}: {}", name, self.model.kind_of(&self.heap, object)))
                })
                .collect()),

            ["collect"] => {
                let cleared = self.heap.stats().weakrefs_cleared;
                self.heap.collect();

                let stats = self.heap.stats();
                Ok(vec![format!(
                    "freed {} objects ({} bytes), cleared {} weak refs, heap size {}",
                    stats.last_freed,
                    stats.last_freed_bytes,
                    stats.weakrefs_cleared - cleared,
                    self.heap.heap_size()
                )])
            }

            ["stats"] => Ok(self.stats()),

            ["help"] => Ok(HELP.lines().map(String::from).collect()),

            [command, ..] => Err(ShellError::Syntax(format!(
                "unknown command or wrong arguments: {}",
                command
            ))),
        }
    }

    fn finalizable(&mut self, name: &str, light: bool) -> Result<Vec<String>, ShellError> {
        let queue = if light {
            self.light_finalizer
        } else {
            self.finalizer
        };

        let object = self
            .heap
            .allocate_fixed(self.model.cell, CELL_SIZE, Some(queue), light, false)?;
        self.bind(name, object);

        Ok(vec![format!("{} = finalizable cell", name)])
    }

    fn stats(&self) -> Vec<String> {
        let heap = &self.heap;
        let stats = heap.stats();

        vec![
            format!("heap size:          {}", heap.heap_size()),
            format!("objects:            {}", heap.object_count()),
            format!("growth threshold:   {}", heap.growth_threshold()),
            format!("pending finalizers: {}", heap.pending_finalizers()),
            format!("weak holders:       {}", heap.weak_count()),
            format!("collections:        {}", stats.collections),
            format!("objects freed:      {}", stats.objects_freed),
            format!("bytes freed:        {}", stats.bytes_freed),
            format!(
                "finalizers run:     {} ({} light)",
                stats.finalizers_run, stats.light_finalizers_run
            ),
            format!("weak refs cleared:  {}", stats.weakrefs_cleared),
        ]
    }

    fn bind(&mut self, name: &str, object: ObjectRef) {
        self.labels.borrow_mut().insert(object, name.to_string());

        match self.bindings.get(name) {
            Some(root) => self.heap.set_root(*root, Some(object)),
            None => {
                let root = self.heap.add_root(object);
                self.bindings.insert(name.to_string(), root);
            }
        }

        debug!(binding = name, ?object, "bound");
    }

    fn resolve(&self, name: &str) -> Result<ObjectRef, ShellError> {
        self.bindings
            .get(name)
            .and_then(|root| self.heap.get_root(*root))
            .ok_or_else(|| ShellError::UnknownName(name.to_string()))
    }

    fn resolve_target(&self, name: &str) -> Result<Option<ObjectRef>, ShellError> {
        if name == "nil" {
            Ok(None)
        } else {
            self.resolve(name).map(Some)
        }
    }

    fn slot_offset(&self, name: &str, object: ObjectRef, slot: &str) -> Result<usize, ShellError> {
        let slot = parse_number(slot)?;

        self.model
            .slot_offset(&self.heap, object, slot)
            .ok_or_else(|| ShellError::BadSlot {
                name: name.to_string(),
                slot,
            })
    }

    fn describe(&self, object: Option<ObjectRef>) -> String {
        match object {
            None => String::from("nil"),
            Some(object) => match self.labels.borrow().get(&object) {
                Some(name) => name.clone(),
                None => format!("{:?}", object),
            },
        }
    }

    /// Drop the labels of freed objects so a reused address is not misnamed
    fn forget_dead_labels(&mut self) {
        let live: FnvHashSet<ObjectRef> = self.heap.objects().collect();
        self.labels.borrow_mut().retain(|object, _| live.contains(object));
    }
}

fn parse_number(word: &str) -> Result<usize, ShellError> {
    word.parse()
        .map_err(|_| err_syntax(&format!("expected a number, found '{}'", word)))
}
