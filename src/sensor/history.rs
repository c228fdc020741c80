//! Fixed-capacity circular history
//!
//! Always holds exactly `capacity` slots. Pushing overwrites the oldest slot
//! and advances the head, so iteration order stays chronological
//! (oldest first) without shifting any element.

/// Fixed-size FIFO that never grows
#[derive(Debug, Clone)]
pub struct History<T> {
    slots: Vec<T>,
    /// Index of the oldest slot
    head: usize,
}

impl<T: Clone> History<T> {
    /// Create a history with `capacity` copies of `fill`
    ///
    /// # Panics
    /// Panics if `capacity` is zero; callers validate geometry first.
    pub fn filled(capacity: usize, fill: T) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            slots: vec![fill; capacity],
            head: 0,
        }
    }

    /// Replace every slot with `fill`
    pub fn fill(&mut self, fill: T) {
        for slot in &mut self.slots {
            *slot = fill.clone();
        }
        self.head = 0;
    }
}

impl<T> History<T> {
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append `value` as newest, returning the evicted oldest value
    pub fn push(&mut self, value: T) -> T {
        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.slots.len();
        evicted
    }

    /// Most recently pushed slot
    pub fn newest(&self) -> &T {
        let n = self.slots.len();
        &self.slots[(self.head + n - 1) % n]
    }

    /// Slot at chronological position `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        Some(&self.slots[(self.head + index) % self.slots.len()])
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// The `count` newest slots, oldest first
    pub fn newest_n(&self, count: usize) -> impl Iterator<Item = &T> + '_ {
        let n = self.slots.len();
        let count = count.min(n);
        self.iter().skip(n - count)
    }
}

impl<T: Clone> History<T> {
    /// Chronological copy of all slots
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
