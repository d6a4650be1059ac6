use crate::constants::{DEFAULT_GROWTH_FACTOR, DEFAULT_INITIAL_HEAP_SIZE};

/// Heap growth policy. A collection is triggered when an allocation would take the heap
/// size past `growth_factor` times the size recorded at the end of the previous collection.
#[derive(Clone, Debug, PartialEq)]
pub struct GcConfig {
    pub growth_factor: f64,
    /// The baseline before the first collection
    pub initial_heap_size: usize,
    /// The lowest baseline a collection may commit. Zero commits the surviving heap size
    /// exactly.
    pub min_heap_size: usize,
}

impl GcConfig {
    pub fn with_growth_factor(self, growth_factor: f64) -> GcConfig {
        GcConfig {
            growth_factor,
            ..self
        }
    }

    pub fn with_initial_heap_size(self, initial_heap_size: usize) -> GcConfig {
        GcConfig {
            initial_heap_size,
            ..self
        }
    }

    pub fn with_min_heap_size(self, min_heap_size: usize) -> GcConfig {
        GcConfig {
            min_heap_size,
            ..self
        }
    }

    /// Panics on a growth factor that is not a positive finite number
    pub(crate) fn validate(&self) {
        assert!(
            self.growth_factor.is_finite() && self.growth_factor > 0.0,
            "growth factor must be positive and finite, got {}",
            self.growth_factor
        );
    }
}

impl Default for GcConfig {
    fn default() -> GcConfig {
        GcConfig {
            growth_factor: DEFAULT_GROWTH_FACTOR,
            initial_heap_size: DEFAULT_INITIAL_HEAP_SIZE,
            min_heap_size: DEFAULT_INITIAL_HEAP_SIZE,
        }
    }
}
