use std::cell::Cell;

/// A memoized value slot.
///
/// Holds `Some(value)` while the cached value is valid and `None` while it
/// is stale; "dirty" and "empty" are the same state. [`CacheCell::get`]
/// recomputes through the supplied closure only on a miss, so repeated reads
/// between invalidations cost a single `Cell` load.
#[derive(Debug, Clone)]
pub struct CacheCell<T: Copy> {
    slot: Cell<Option<T>>,
}

impl<T: Copy> CacheCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Cell::new(None),
        }
    }

    /// Returns the cached value, computing and storing it first if the slot
    /// is empty.
    pub fn get(&self, compute: impl FnOnce() -> T) -> T {
        match self.slot.get() {
            Some(value) => value,
            None => {
                let value = compute();
                self.slot.set(Some(value));
                value
            }
        }
    }

    /// Empties the slot, forcing the next read to recompute.
    pub fn clear(&self) {
        self.slot.set(None);
    }

    /// True while the slot holds a valid value.
    pub fn is_cached(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T: Copy> Default for CacheCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let cell: CacheCell<i32> = CacheCell::new();
        assert!(!cell.is_cached());
    }

    #[test]
    fn test_get_computes_once() {
        let cell = CacheCell::new();
        let mut calls = 0;

        let a = cell.get(|| {
            calls += 1;
            42
        });
        let b = cell.get(|| {
            calls += 1;
            42
        });

        assert_eq!(a, 42);
        assert_eq!(b, 42);
        assert_eq!(calls, 1);
        assert!(cell.is_cached());
    }

    #[test]
    fn test_clear_forces_recompute() {
        let cell = CacheCell::new();
        let mut calls = 0;
        let mut read = |value: i32| {
            cell.get(|| {
                calls += 1;
                value
            })
        };

        assert_eq!(read(1), 1);
        cell.clear();
        assert_eq!(read(2), 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let cell = CacheCell::new();
        cell.get(|| 7);
        cell.clear();
        cell.clear();
        assert!(!cell.is_cached());
    }
}
