//! Fixed-capacity slot arrays shared across kernel threads.

use std::cell::UnsafeCell;

/// One parallel array of a structure-of-arrays ray queue.
///
/// Writers reserve distinct slots through an atomic counter before storing,
/// and a pipeline barrier separates every producing pass from the consuming
/// one, so a cell is never written twice within a pass nor read while
/// written.
pub struct Slots<T> {
    cells: Vec<UnsafeCell<T>>,
}

// SAFETY: the single-producer-per-reserved-slot discipline above means no
// two threads touch the same cell concurrently.
unsafe impl<T: Send> Sync for Slots<T> {}

impl<T: Copy + Default> Slots<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: (0..capacity).map(|_| UnsafeCell::new(T::default())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Store into a reserved slot.
    #[inline]
    pub fn set(&self, slot: usize, value: T) {
        // SAFETY: `slot` was reserved by this writer; see type docs.
        unsafe {
            *self.cells[slot].get() = value;
        }
    }

    /// Load from a slot written by a previous pass.
    #[inline]
    pub fn get(&self, slot: usize) -> T {
        // SAFETY: producing pass completed before this read; see type docs.
        unsafe { *self.cells[slot].get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_roundtrip() {
        let slots: Slots<f32> = Slots::new(8);
        assert_eq!(slots.len(), 8);
        assert_eq!(slots.get(3), 0.0);

        slots.set(3, 2.5);
        assert_eq!(slots.get(3), 2.5);
        assert_eq!(slots.get(2), 0.0);
    }

    #[test]
    fn test_slots_parallel_distinct_writes() {
        use rayon::prelude::*;
        use std::sync::atomic::{AtomicU32, Ordering};

        let slots: Slots<u32> = Slots::new(1000);
        let counter = AtomicU32::new(0);

        (0..1000u32).into_par_iter().for_each(|v| {
            let slot = counter.fetch_add(1, Ordering::Relaxed) as usize;
            slots.set(slot, v);
        });

        let mut seen: Vec<u32> = (0..1000).map(|i| slots.get(i)).collect();
        seen.sort_unstable();
        let expected: Vec<u32> = (0..1000).collect();
        assert_eq!(seen, expected);
    }
}
