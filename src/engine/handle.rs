//! Ref-counted, aliveness-checking component handles.
//!
//! A handle pairs a raw pointer into pool storage with the slot's shared
//! bookkeeping state. Copying a handle increments the slot refcount,
//! dropping decrements it; the count reaching zero frees nothing by
//! itself, it only marks the slot compactable for
//! [`EntitySystem::clean_components`](crate::engine::system::EntitySystem::clean_components).
//!
//! Handles detect staleness through the slot generation: destroying the
//! component bumps the shared generation, so every outstanding handle
//! starts answering `is_alive() == false` and resolves to `None`.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use crate::engine::types::{ComponentId, SlotGeneration};

/// Shared bookkeeping of one pool slot.
///
/// Lives behind an `Arc` so the state survives growth of the slot
/// metadata table and outlives the slot itself when stale handles are
/// still around.
///
/// ## Invariants
/// - `generation` never reads 0 (the id sentinel); bumps skip it.
/// - A present slot holds at least the entity system's own reference, so
///   `ref_count >= 1` outside of mid-destruction.
pub struct SlotState {
    generation: AtomicU16,
    ref_count: AtomicU32,
    /// References abandoned by [`ComponentHandle::unlink`], settled by the
    /// entity system when it destroys the slot's component.
    transferred: AtomicU32,
}

impl SlotState {
    /// Creates the state of a fresh slot, owned once by the entity system.
    pub(crate) fn new() -> Self {
        Self {
            generation: AtomicU16::new(1),
            ref_count: AtomicU32::new(1),
            transferred: AtomicU32::new(0),
        }
    }

    /// Current generation of the slot.
    #[inline]
    pub fn generation(&self) -> SlotGeneration {
        self.generation.load(Ordering::Acquire)
    }

    /// Current reference count of the slot.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Advances the generation past every outstanding handle, skipping
    /// the 0 sentinel on wrap.
    pub(crate) fn bump_generation(&self) -> SlotGeneration {
        let mut next = self
            .generation
            .load(Ordering::Acquire)
            .wrapping_add(1);
        if next == 0 {
            next = 1;
        }
        self.generation.store(next, Ordering::Release);
        next
    }

    /// Re-arms a recycled slot with the entity system's own reference.
    ///
    /// Adds rather than stores: stale handles from earlier occupants may
    /// still hold references that keep the slot pinned against
    /// compaction.
    pub(crate) fn reset_for_reuse(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn release(&self) {
        self.ref_count.fetch_sub(1, Ordering::AcqRel);
    }

    #[inline]
    fn transfer(&self) {
        self.transferred.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases the entity system's own reference plus every reference
    /// transferred to it by unlinked handles.
    pub(crate) fn release_owned(&self) {
        let extra = self.transferred.swap(0, Ordering::AcqRel);
        self.ref_count.fetch_sub(1 + extra, Ordering::AcqRel);
    }
}

struct HandleInner<T> {
    ptr: NonNull<T>,
    state: Arc<SlotState>,
    generation: SlotGeneration,
    id: ComponentId,
    linked: bool,
}

/// Smart accessor to a pooled component.
///
/// ## Invariants
/// - A non-empty, linked handle keeps its slot reachable: compaction
///   never discards slots with a nonzero refcount.
/// - Copying increments the slot refcount, dropping decrements it,
///   moving transfers it; the decrement to zero does not itself free
///   anything.
/// - Accessors return `None` once the slot generation has moved past the
///   one the handle was acquired for.
pub struct ComponentHandle<T> {
    inner: Option<HandleInner<T>>,
}

// The pointee is pool-owned; the handle only adds atomic bookkeeping.
unsafe impl<T: Send> Send for ComponentHandle<T> {}
unsafe impl<T: Sync> Sync for ComponentHandle<T> {}

impl<T> ComponentHandle<T> {
    /// Creates an empty handle.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Acquires a handle on a live slot, incrementing its refcount.
    pub(crate) fn acquire(
        ptr: NonNull<T>,
        state: Arc<SlotState>,
        id: ComponentId,
    ) -> Self {
        state.acquire();
        Self {
            inner: Some(HandleInner {
                ptr,
                state,
                generation: id.generation(),
                id,
                linked: true,
            }),
        }
    }

    /// Returns `true` if this handle refers to no component at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns `true` if the slot this handle was acquired for is still
    /// the live occupant.
    #[inline]
    pub fn is_alive(&self) -> bool {
        match &self.inner {
            Some(inner) => inner.state.generation() == inner.generation,
            None => false,
        }
    }

    /// The id of the referenced component, or the invalid sentinel.
    #[inline]
    pub fn id(&self) -> ComponentId {
        match &self.inner {
            Some(inner) => inner.id,
            None => ComponentId::INVALID,
        }
    }

    /// Shared access to the component, or `None` when empty or stale.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        let inner = self.inner.as_ref()?;
        if inner.state.generation() != inner.generation {
            return None;
        }
        Some(unsafe { inner.ptr.as_ref() })
    }

    /// Mutable access to the component, or `None` when empty or stale.
    ///
    /// The caller must ensure no other reference to the same slot is
    /// live; the framework does not lock component payloads.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let inner = self.inner.as_mut()?;
        if inner.state.generation() != inner.generation {
            return None;
        }
        Some(unsafe { inner.ptr.as_mut() })
    }

    /// Detaches the handle from refcount bookkeeping without
    /// decrementing.
    ///
    /// Ownership of the reference logically transfers to the entity
    /// system, which settles it when the component is destroyed; the
    /// handle itself stays usable.
    pub fn unlink(&mut self) {
        if let Some(inner) = &mut self.inner {
            if inner.linked {
                inner.state.transfer();
                inner.linked = false;
            }
        }
    }

    /// Releases the handle's reference and empties it.
    pub fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            if inner.linked {
                inner.state.release();
            }
        }
    }
}

impl<T> Clone for ComponentHandle<T> {
    fn clone(&self) -> Self {
        match &self.inner {
            Some(inner) => {
                if inner.linked {
                    inner.state.acquire();
                }
                Self {
                    inner: Some(HandleInner {
                        ptr: inner.ptr,
                        state: Arc::clone(&inner.state),
                        generation: inner.generation,
                        id: inner.id,
                        linked: inner.linked,
                    }),
                }
            }
            None => Self { inner: None },
        }
    }
}

impl<T> Drop for ComponentHandle<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            if inner.linked {
                inner.state.release();
            }
        }
    }
}

impl<T> Default for ComponentHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for ComponentHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
            .expect("dereferenced an empty or stale component handle")
    }
}

impl<T> DerefMut for ComponentHandle<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut()
            .expect("dereferenced an empty or stale component handle")
    }
}
