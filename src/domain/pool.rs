// Bounded, pre-warmed pools for transient combat entities.
//
// Each kind owns a dense slot arena plus a free queue of indices. Checked-out
// slots are addressed through generational handles, so a handle that outlives
// its entity (double release, late timer) degrades to a no-op instead of
// corrupting the queue.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

use tracing::debug;

/// Opaque ticket for one checked-out pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle<K> {
    kind: K,
    index: u32,
    generation: u32,
}

impl<K: Copy> Handle<K> {
    pub fn kind(&self) -> K {
        self.kind
    }
}

struct Slot<T> {
    value: T,
    generation: u32,
    active: bool,
}

struct KindPool<T> {
    prototype: T,
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
}

/// Fixed-capacity pool of `T` instances, pre-instantiated per kind from a
/// prototype at construction time. Pools never grow; exhaustion is a normal,
/// silent outcome the caller skips over.
pub struct Pool<K, T> {
    kinds: HashMap<K, KindPool<T>>,
    capacity: usize,
}

impl<K, T> Pool<K, T>
where
    K: Copy + Eq + Hash + Debug,
    T: Clone,
{
    pub fn new(prototypes: impl IntoIterator<Item = (K, T)>, capacity: usize) -> Self {
        let kinds = prototypes
            .into_iter()
            .map(|(kind, prototype)| {
                let slots = (0..capacity)
                    .map(|_| Slot {
                        value: prototype.clone(),
                        generation: 0,
                        active: false,
                    })
                    .collect();
                let free = (0..capacity as u32).collect();
                (
                    kind,
                    KindPool {
                        prototype,
                        slots,
                        free,
                    },
                )
            })
            .collect();
        Self { kinds, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entities of `kind` currently checked out.
    pub fn active_count(&self, kind: K) -> usize {
        self.kinds
            .get(&kind)
            .map_or(0, |pool| self.capacity - pool.free.len())
    }

    /// Dequeues one instance of `kind`, resetting its simulation state from
    /// the prototype. Returns `None` when the kind is unconfigured or its
    /// queue is empty; callers treat that as "skip the action".
    pub fn checkout(&mut self, kind: K) -> Option<Handle<K>> {
        let pool = self.kinds.get_mut(&kind)?;
        let Some(index) = pool.free.pop_front() else {
            debug!(?kind, "pool exhausted; request skipped");
            return None;
        };
        let slot = &mut pool.slots[index as usize];
        slot.value = pool.prototype.clone();
        slot.active = true;
        Some(Handle {
            kind,
            index,
            generation: slot.generation,
        })
    }

    /// Deactivates the entity and requeues its slot. Stale handles (already
    /// released, possibly recycled) are ignored.
    pub fn release(&mut self, handle: Handle<K>) {
        let Some(pool) = self.kinds.get_mut(&handle.kind) else {
            return;
        };
        let Some(slot) = pool.slots.get_mut(handle.index as usize) else {
            debug!(kind = ?handle.kind, index = handle.index, "out-of-range release ignored");
            return;
        };
        if !slot.active || slot.generation != handle.generation {
            debug!(kind = ?handle.kind, index = handle.index, "stale release ignored");
            return;
        }
        slot.active = false;
        slot.generation = slot.generation.wrapping_add(1);
        pool.free.push_back(handle.index);
    }

    pub fn get(&self, handle: Handle<K>) -> Option<&T> {
        let slot = self.kinds.get(&handle.kind)?.slots.get(handle.index as usize)?;
        (slot.active && slot.generation == handle.generation).then_some(&slot.value)
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut T> {
        let slot = self
            .kinds
            .get_mut(&handle.kind)?
            .slots
            .get_mut(handle.index as usize)?;
        (slot.active && slot.generation == handle.generation).then_some(&mut slot.value)
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.kinds.iter().flat_map(|(kind, pool)| {
            pool.slots.iter().enumerate().filter_map(|(index, slot)| {
                slot.active.then_some((
                    Handle {
                        kind: *kind,
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &slot.value,
                ))
            })
        })
    }

    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = (Handle<K>, &mut T)> {
        self.kinds.iter_mut().flat_map(|(kind, pool)| {
            pool.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
                slot.active.then_some((
                    Handle {
                        kind: *kind,
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &mut slot.value,
                ))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool(capacity: usize) -> Pool<&'static str, u32> {
        Pool::new([("Normal", 7u32)], capacity)
    }

    #[test]
    fn when_pool_is_exhausted_then_third_checkout_returns_none() {
        let mut pool = small_pool(2);

        let first = pool.checkout("Normal");
        let second = pool.checkout("Normal");
        let third = pool.checkout("Normal");

        assert!(first.is_some());
        assert!(second.is_some());
        assert!(third.is_none());
        assert_eq!(pool.active_count("Normal"), 2);
    }

    #[test]
    fn when_active_entities_are_counted_then_capacity_is_never_exceeded() {
        let mut pool = small_pool(3);
        let mut handles = Vec::new();
        for _ in 0..10 {
            if let Some(h) = pool.checkout("Normal") {
                handles.push(h);
            }
            assert!(pool.active_count("Normal") <= pool.capacity());
        }
        for h in handles.drain(..) {
            pool.release(h);
        }
        assert_eq!(pool.active_count("Normal"), 0);
    }

    #[test]
    fn when_released_then_slot_is_reused_with_prototype_state() {
        let mut pool = small_pool(1);

        let handle = pool.checkout("Normal").expect("checkout");
        *pool.get_mut(handle).expect("live handle") = 99;
        pool.release(handle);

        let recycled = pool.checkout("Normal").expect("recycled checkout");
        assert_eq!(*pool.get(recycled).expect("live handle"), 7);
    }

    #[test]
    fn when_handle_is_stale_then_release_and_lookup_are_no_ops() {
        let mut pool = small_pool(1);

        let handle = pool.checkout("Normal").expect("checkout");
        pool.release(handle);
        // Double release must not corrupt the free queue.
        pool.release(handle);
        assert!(pool.get(handle).is_none());

        let recycled = pool.checkout("Normal").expect("recycled checkout");
        // The stale handle must not reach the recycled occupant either.
        pool.release(handle);
        assert!(pool.get(recycled).is_some());
        assert_eq!(pool.active_count("Normal"), 1);
    }

    #[test]
    fn when_a_handle_outranges_the_pool_then_release_is_a_no_op() {
        let mut big = small_pool(2);
        let _first = big.checkout("Normal").expect("checkout");
        let second = big.checkout("Normal").expect("checkout");

        // `second` indexes slot 1, which this pool does not have.
        let mut small = small_pool(1);
        small.release(second);

        let local = small.checkout("Normal").expect("checkout");
        assert!(small.get(local).is_some());
        assert_eq!(small.active_count("Normal"), 1);
    }

    #[test]
    fn when_kind_is_unconfigured_then_checkout_returns_none() {
        let mut pool = small_pool(2);
        assert!(pool.checkout("Ghost").is_none());
    }
}
