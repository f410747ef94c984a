//! Fixed-capacity accumulation of timestamped force samples.

use std::num::NonZeroUsize;

use serde::Serialize;

/// One load-cell reading, stamped with whole seconds since the benchmark started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForceSample {
    pub time: u64,
    pub force: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Accepted,
    /// The append filled the batch; the samples are handed over and the
    /// batcher is empty again.
    Ready(Vec<ForceSample>),
}

#[derive(Debug, Clone)]
pub struct MeasurementBatcher {
    capacity: NonZeroUsize,
    samples: Vec<ForceSample>,
}

impl MeasurementBatcher {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity.get()),
        }
    }

    pub fn append(&mut self, sample: ForceSample) -> BatchOutcome {
        self.samples.push(sample);
        if self.samples.len() >= self.capacity.get() {
            let full = std::mem::replace(
                &mut self.samples,
                Vec::with_capacity(self.capacity.get()),
            );
            BatchOutcome::Ready(full)
        } else {
            BatchOutcome::Accepted
        }
    }

    /// Drop any partial batch.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl Default for MeasurementBatcher {
    fn default() -> Self {
        Self::new(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: u64) -> ForceSample {
        ForceSample { time, force: 1.5 }
    }

    #[test]
    fn capacity_one_flushes_every_append() {
        let mut b = MeasurementBatcher::default();
        assert_eq!(b.append(sample(0)), BatchOutcome::Ready(vec![sample(0)]));
        assert!(b.is_empty());
    }

    #[test]
    fn flushes_in_order_at_capacity() {
        let mut b = MeasurementBatcher::new(NonZeroUsize::new(3).unwrap());
        assert_eq!(b.append(sample(0)), BatchOutcome::Accepted);
        assert_eq!(b.append(sample(1)), BatchOutcome::Accepted);
        assert_eq!(b.len(), 2);
        assert_eq!(
            b.append(sample(2)),
            BatchOutcome::Ready(vec![sample(0), sample(1), sample(2)])
        );
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn clear_discards_partial_batch() {
        let mut b = MeasurementBatcher::new(NonZeroUsize::new(2).unwrap());
        b.append(sample(0));
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.append(sample(5)), BatchOutcome::Accepted);
        assert_eq!(b.capacity(), 2);
    }
}
