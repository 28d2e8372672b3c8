//! Time-step catalog: ordered step values plus an exact-match index.

use hashbrown::HashMap;

/// Ordered time values, one per container step.
#[derive(Clone, Debug, Default)]
pub struct TimeStepCatalog {
    values: Vec<f64>,
    index: HashMap<u64, usize>,
}

impl TimeStepCatalog {
    /// Build the catalog. When a value repeats, the first step wins.
    pub fn new(values: Vec<f64>) -> Self {
        let mut index = HashMap::with_capacity(values.len());
        for (i, t) in values.iter().enumerate() {
            index.entry(key(*t)).or_insert(i);
        }
        Self { values, index }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Step index whose time equals `time` exactly.
    pub fn index_of(&self, time: f64) -> Option<usize> {
        self.index.get(&key(time)).copied()
    }

    /// Time value of step `step`.
    pub fn time_of(&self, step: usize) -> Option<f64> {
        self.values.get(step).copied()
    }
}

// Bit pattern with -0.0 folded onto 0.0 so both resolve the same step.
fn key(t: f64) -> u64 {
    if t == 0.0 { 0 } else { t.to_bits() }
}
