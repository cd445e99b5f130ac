//! Parameter sources: one value drawn per task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::task::TaskParam;

/// Produces the parameter of each task.
///
/// `next` is called once per task from the launching loop and must never fail.
/// Implementations are shared across tasks, so any internal state must be
/// synchronized.
pub trait ParamSource: Send + Sync + 'static {
    /// Parameter type handed to the pipeline.
    type Param: TaskParam;

    /// Draw the parameter for the next task.
    fn next(&self) -> Self::Param;
}

/// Uniformly random values in the closed range `[lo, hi]`.
///
/// Uses the thread-local generator, so concurrent callers never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomRange {
    lo: u64,
    hi: u64,
}

impl RandomRange {
    /// Create a range; bounds given in the wrong order are swapped.
    pub fn new(lo: u64, hi: u64) -> Self {
        Self {
            lo: lo.min(hi),
            hi: lo.max(hi),
        }
    }

    /// Lower bound (inclusive).
    pub fn lo(&self) -> u64 {
        self.lo
    }

    /// Upper bound (inclusive).
    pub fn hi(&self) -> u64 {
        self.hi
    }
}

impl ParamSource for RandomRange {
    type Param = u64;

    fn next(&self) -> u64 {
        rand::thread_rng().gen_range(self.lo..=self.hi)
    }
}

/// Reproducible values in the closed range `[lo, hi]`, driven by a seed.
#[derive(Debug)]
pub struct SeededRange {
    range: RandomRange,
    rng: Mutex<StdRng>,
}

impl SeededRange {
    /// Create a seeded range; bounds given in the wrong order are swapped.
    pub fn new(lo: u64, hi: u64, seed: u64) -> Self {
        Self {
            range: RandomRange::new(lo, hi),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl ParamSource for SeededRange {
    type Param = u64;

    fn next(&self) -> u64 {
        let range = self.range.lo..=self.range.hi;
        // A poisoned lock still holds a usable generator.
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(range),
            Err(poisoned) => poisoned.into_inner().gen_range(range),
        }
    }
}

/// A fixed list of values handed out in order, wrapping around at the end.
#[derive(Debug)]
pub struct Sequence<P> {
    values: Vec<P>,
    cursor: AtomicUsize,
}

impl<P: TaskParam> Sequence<P> {
    /// Create a sequence. Returns `None` for an empty list.
    pub fn new(values: Vec<P>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            values,
            cursor: AtomicUsize::new(0),
        })
    }
}

impl<P: TaskParam> ParamSource for Sequence<P> {
    type Param = P;

    fn next(&self) -> P {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.values[i % self.values.len()].clone()
    }
}
