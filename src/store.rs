//! Bounded LIFO storage for idle instances

use std::time::{Duration, Instant};

/// An instance plus the bookkeeping the pool keeps about it
#[derive(Debug)]
pub(crate) struct Slot<T> {
    pub instance: T,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub valid: bool,
}

impl<T> Slot<T> {
    pub fn new(instance: T) -> Self {
        let now = Instant::now();
        Self {
            instance,
            created_at: now,
            last_used_at: now,
            valid: true,
        }
    }

    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }
}

/// Idle slots, most recently pushed on top.
///
/// Not synchronized: the pool keeps it behind its state lock, and the pool's
/// condition variable provides the blocking pop.
#[derive(Debug)]
pub(crate) struct SlotStore<T> {
    slots: Vec<Slot<T>>,
    capacity: usize,
}

impl<T> SlotStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn try_pop(&mut self) -> Option<Slot<T>> {
        self.slots.pop()
    }

    /// Push a slot, handing it back when the store is full
    pub fn push(&mut self, slot: Slot<T>) -> Result<(), Slot<T>> {
        if self.slots.len() >= self.capacity {
            return Err(slot);
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Remove every slot, oldest first
    pub fn drain_for_scan(&mut self) -> Vec<Slot<T>> {
        std::mem::take(&mut self.slots)
    }

    /// Put back survivors of a scan, in the order given
    pub fn restore(&mut self, slots: Vec<Slot<T>>) {
        debug_assert!(self.slots.len() + slots.len() <= self.capacity);
        self.slots.extend(slots);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_order() {
        let mut store = SlotStore::new(3);
        store.push(Slot::new("a")).unwrap();
        store.push(Slot::new("b")).unwrap();

        assert_eq!(store.try_pop().unwrap().instance, "b");
        assert_eq!(store.try_pop().unwrap().instance, "a");
        assert!(store.try_pop().is_none());
    }

    #[test]
    fn test_push_rejected_at_capacity() {
        let mut store = SlotStore::new(1);
        store.push(Slot::new(1)).unwrap();

        let rejected = store.push(Slot::new(2)).unwrap_err();
        assert_eq!(rejected.instance, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.capacity(), 1);
    }

    #[test]
    fn test_drain_keeps_push_order() {
        let mut store = SlotStore::new(3);
        for i in 0..3 {
            store.push(Slot::new(i)).unwrap();
        }

        let drained: Vec<_> = store.drain_for_scan().into_iter().map(|s| s.instance).collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_idle_for() {
        let slot = Slot::new(());
        let later = slot.last_used_at + Duration::from_millis(5);
        assert_eq!(slot.idle_for(later), Duration::from_millis(5));
        assert_eq!(slot.idle_for(slot.last_used_at), Duration::ZERO);
    }
}
