//! The handle registry.
//!
//! Contexts cross the language boundary as integers, never as
//! pointers. A [`Handle`] packs a slot index and a per-slot
//! generation; the generation changes every time a slot is
//! vacated, so a handle kept past its context's destruction can
//! only miss, even if the slot has been reused.
//!
//! Removal is a single atomic claim: of all the parties that might
//! free a context, whoever claims the slot first gets the value,
//! and everyone else sees [`StaleHandle`]. That one property is
//! what makes the destroy/finalizer race safe.

use core::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock,
    atomic::{AtomicUsize, Ordering},
};

use buggy::{Bug, BugExt, bug};

/// Generations start above zero so the all-zero wire handle is
/// never valid.
const FIRST_GENERATION: u32 = 1;

/// Names a context in a [`Registry`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Packs the handle into the integer form that crosses the
    /// boundary: slot index in the low half, generation in the
    /// high half.
    pub fn to_wire(self) -> i64 {
        let bits = (u64::from(self.generation) << 32) | u64::from(self.index);
        i64::from_ne_bytes(bits.to_ne_bytes())
    }

    /// Unpacks a handle from its wire form.
    ///
    /// Every 64-bit value unpacks; whether it names anything is
    /// decided by the registry lookup, not here.
    pub fn from_wire(wire: i64) -> Self {
        let bits = u64::from_ne_bytes(wire.to_ne_bytes());
        Self {
            index: (bits & u64::from(u32::MAX)) as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.generation)
    }
}

/// The handle does not name a live context.
///
/// Either it never did, or the context has already been destroyed.
/// The two are indistinguishable on purpose.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StaleHandle(pub Handle);

impl core::error::Error for StaleHandle {}

impl fmt::Display for StaleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle {} does not name a live context", self.0)
    }
}

enum SlotState<T> {
    /// Unoccupied. `next_generation` is what the next occupant
    /// will stamp its handle with.
    Vacant { next_generation: u32 },
    Live { generation: u32, value: T },
    /// Generation space exhausted; the slot is never reused.
    Retired,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Slot<T> {
    fn state(&self) -> MutexGuard<'_, SlotState<T>> {
        // A poisoned slot means a caller's closure panicked; the
        // state machine itself is still coherent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A concurrent arena of contexts, addressed by [`Handle`].
pub struct Registry<T> {
    slots: RwLock<Vec<Arc<Slot<T>>>>,
    free: Mutex<Vec<u32>>,
    live: AtomicUsize,
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
        }
    }

    /// The number of live contexts.
    ///
    /// Useful for leak accounting: after every handle has been
    /// destroyed or finalized this must be zero.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Whether the registry holds no live contexts.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, index: u32) -> Option<Arc<Slot<T>>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(index as usize).cloned()
    }

    /// Inserts `value`, returning the handle that now names it.
    pub fn insert(&self, value: T) -> Result<Handle, Bug> {
        let reused = {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.pop()
        };
        let (index, slot) = match reused {
            Some(index) => {
                let slot = self
                    .slot(index)
                    .assume("free list only holds allocated slots")?;
                (index, slot)
            }
            None => {
                let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
                let index = u32::try_from(slots.len()).assume("slot arena fits the handle space")?;
                let slot = Arc::new(Slot {
                    state: Mutex::new(SlotState::Vacant {
                        next_generation: FIRST_GENERATION,
                    }),
                });
                slots.push(Arc::clone(&slot));
                (index, slot)
            }
        };

        let mut state = slot.state();
        let generation = match &*state {
            SlotState::Vacant { next_generation } => *next_generation,
            SlotState::Live { .. } | SlotState::Retired => {
                bug!("free-listed slot is not vacant")
            }
        };
        *state = SlotState::Live { generation, value };
        drop(state);

        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(Handle { index, generation })
    }

    /// Runs `f` over the context `handle` names.
    ///
    /// The context stays locked for the duration of `f`, so
    /// concurrent operations on the same handle serialize.
    pub fn with_mut<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, StaleHandle> {
        let Some(slot) = self.slot(handle.index) else {
            return Err(StaleHandle(handle));
        };
        let mut state = slot.state();
        match &mut *state {
            SlotState::Live { generation, value } if *generation == handle.generation => {
                Ok(f(value))
            }
            _ => Err(StaleHandle(handle)),
        }
    }

    /// Removes the context `handle` names, returning it.
    ///
    /// This is the claim both the destroy path and the finalizer
    /// path go through: exactly one concurrent claimant can win.
    pub fn claim(&self, handle: Handle) -> Result<T, StaleHandle> {
        let Some(slot) = self.slot(handle.index) else {
            return Err(StaleHandle(handle));
        };

        let mut state = slot.state();
        match &*state {
            SlotState::Live { generation, .. } if *generation == handle.generation => {}
            _ => return Err(StaleHandle(handle)),
        }
        let replacement = match handle.generation.checked_add(1) {
            Some(next_generation) => SlotState::Vacant { next_generation },
            None => SlotState::Retired,
        };
        let recycle = matches!(replacement, SlotState::Vacant { .. });
        let old = core::mem::replace(&mut *state, replacement);
        drop(state);

        self.live.fetch_sub(1, Ordering::Relaxed);
        if recycle {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.push(handle.index);
        }
        match old {
            SlotState::Live { value, .. } => Ok(value),
            // Checked live under the same lock above.
            SlotState::Vacant { .. } | SlotState::Retired => Err(StaleHandle(handle)),
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use proptest::prelude::*;
    use test_log::test;

    use super::*;

    #[test]
    fn test_insert_and_use() {
        let registry = Registry::new();
        let a = registry.insert(10_u64).expect("insert");
        let b = registry.insert(20_u64).expect("insert");
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.with_mut(a, |v| *v += 1).expect("live");
        assert_eq!(registry.with_mut(a, |v| *v), Ok(11));
        assert_eq!(registry.with_mut(b, |v| *v), Ok(20));
    }

    #[test]
    fn test_claim_makes_handle_stale() {
        let registry = Registry::new();
        let handle = registry.insert("ctx").expect("insert");

        assert_eq!(registry.claim(handle), Ok("ctx"));
        assert_eq!(registry.len(), 0);

        assert_eq!(registry.claim(handle), Err(StaleHandle(handle)));
        assert_eq!(registry.with_mut(handle, |_| ()), Err(StaleHandle(handle)));
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let registry = Registry::new();
        let first = registry.insert(1_u32).expect("insert");
        registry.claim(first).expect("claim");

        let second = registry.insert(2_u32).expect("insert");
        // The slot is reused, the handle is not.
        assert_ne!(first, second);
        assert_ne!(first.to_wire(), second.to_wire());

        assert_eq!(registry.with_mut(first, |v| *v), Err(StaleHandle(first)));
        assert_eq!(registry.with_mut(second, |v| *v), Ok(2));
    }

    #[test]
    fn test_never_valid_handles() {
        let registry = Registry::<u32>::new();
        registry.insert(7).expect("insert");

        // The all-zero wire value can never name anything because
        // generations start at one.
        let zero = Handle::from_wire(0);
        assert_eq!(registry.with_mut(zero, |_| ()), Err(StaleHandle(zero)));

        let wild = Handle::from_wire(-1);
        assert_eq!(registry.claim(wild), Err(StaleHandle(wild)));
    }

    #[test]
    fn test_claimed_value_is_dropped() {
        struct Probe(Arc<AtomicUsize>);

        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        let handle = registry
            .insert(Probe(Arc::clone(&drops)))
            .expect("insert");

        assert_eq!(drops.load(Ordering::Relaxed), 0);
        drop(registry.claim(handle).expect("claim"));
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let registry = Arc::new(Registry::new());
        let handle = registry.insert(String::from("once")).expect("insert");

        let wins = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if registry.claim(handle).is_ok() {
                        wins.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("no panics");
        }

        assert_eq!(wins.load(Ordering::Relaxed), 1);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_insert_while_claiming() {
        let registry = Arc::new(Registry::new());
        let seeded: Vec<_> = (0..64)
            .map(|i| registry.insert(i).expect("insert"))
            .collect();

        let claimer = {
            let registry = Arc::clone(&registry);
            let seeded = seeded.clone();
            std::thread::spawn(move || {
                for handle in seeded {
                    registry.claim(handle).expect("first claim wins");
                }
            })
        };
        let inserter = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                (0..64)
                    .map(|i| registry.insert(i + 1000).expect("insert"))
                    .collect::<Vec<_>>()
            })
        };

        claimer.join().expect("no panics");
        let fresh = inserter.join().expect("no panics");

        assert_eq!(registry.len(), 64);
        for handle in fresh {
            let value = registry.with_mut(handle, |v| *v).expect("live");
            assert!(value >= 1000);
        }
    }

    proptest! {
        #[test]
        fn test_wire_round_trip(index: u32, generation: u32) {
            let handle = Handle { index, generation };
            prop_assert_eq!(Handle::from_wire(handle.to_wire()), handle);
        }

        #[test]
        fn test_wire_unpack_repack(wire: i64) {
            prop_assert_eq!(Handle::from_wire(wire).to_wire(), wire);
        }
    }
}
