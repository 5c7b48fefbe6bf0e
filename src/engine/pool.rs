use std::{
    any::Any,
    cell::UnsafeCell,
    mem::MaybeUninit,
    ptr,
};

use crate::engine::bitfield::Bitfield;
use crate::engine::types::POOL_CHUNK_SIZE;

/// Type-erased interface to a component pool.
///
/// The entity system stores one pool per component family behind this
/// trait; typed access goes through `as_any` downcasting to the concrete
/// [`TypedPool`].
pub trait ComponentPool: Send + Sync {
    /// Logical number of slots.
    fn len(&self) -> usize;
    /// Returns `true` if the pool holds no slots.
    fn is_empty(&self) -> bool;
    /// Size in bytes of one stored component.
    fn component_size(&self) -> usize;
    /// Number of slots per storage chunk.
    fn chunk_size(&self) -> usize;
    /// Number of allocated chunks.
    fn chunk_count(&self) -> usize;

    /// Makes the pool able to address at least `count` slots without
    /// relocating existing chunk storage.
    fn ensure(&mut self, count: usize);
    /// Changes the logical size. With `shrink`, trailing chunks past the
    /// new size are released; the caller guarantees their slots are
    /// absent.
    fn resize(&mut self, count: usize, shrink: bool);

    /// Returns an untyped pointer to slot storage.
    ///
    /// The caller is responsible for correct typing and for staying in
    /// bounds; the pointer stays valid for the life of the slot because
    /// chunks never relocate.
    fn data_ptr(&self, index: usize) -> *mut u8;

    /// Runs the stored type's destructor on the slot.
    ///
    /// Does not clear the presence bit; the entity system clears it so
    /// destruction and bookkeeping happen together.
    fn destroy(&mut self, index: usize);

    /// Returns `true` if the presence bit for `index` is set.
    fn has_bit(&self, index: usize) -> bool;
    /// Sets the presence bit for `index`.
    fn set_bit(&mut self, index: usize);
    /// Clears the presence bit for `index`.
    fn reset_bit(&mut self, index: usize);
    /// Counts set presence bits.
    fn count_bits(&self) -> usize;

    /// Upcasts for typed downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Invariant:
/// - `chunks.len() * POOL_CHUNK_SIZE >= size` whenever `size > 0`.
/// - A slot is initialized iff its presence bit is set.
/// - Chunks are never moved or dropped while any slot in them is present,
///   so raw slot pointers remain stable.
pub struct TypedPool<T> {
    chunks: Vec<Box<[UnsafeCell<MaybeUninit<T>>; POOL_CHUNK_SIZE]>>,
    bits: Bitfield,
    size: usize,
}

// Slots are only written through `&mut self` or through `data_ptr` under
// the entity system's aliasing rules; the `UnsafeCell` wrapper exists so
// parallel views may read slots through `&self`.
unsafe impl<T: Send + Sync> Sync for TypedPool<T> {}

impl<T> Default for TypedPool<T> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            bits: Bitfield::new(),
            size: 0,
        }
    }
}

impl<T> TypedPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.chunks.len() * POOL_CHUNK_SIZE
    }

    #[inline]
    fn slot(&self, index: usize) -> *mut MaybeUninit<T> {
        debug_assert!(index < self.capacity());
        self.chunks[index / POOL_CHUNK_SIZE][index % POOL_CHUNK_SIZE].get()
    }

    /// Returns a typed pointer to the slot at `index`.
    ///
    /// The slot may be uninitialized; callers check the presence bit
    /// first.
    #[inline]
    pub fn slot_ptr(&self, index: usize) -> *mut T {
        self.slot(index) as *mut T
    }

    /// Moves `value` into the slot at `index`.
    ///
    /// ## Safety
    /// The slot must be within capacity and must not currently hold an
    /// initialized value.
    pub unsafe fn write(&mut self, index: usize, value: T) {
        unsafe { (*self.slot(index)).as_mut_ptr().write(value) };
    }
}

impl<T: Send + Sync + 'static> ComponentPool for TypedPool<T> {
    fn len(&self) -> usize {
        self.size
    }

    fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn component_size(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn chunk_size(&self) -> usize {
        POOL_CHUNK_SIZE
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn ensure(&mut self, count: usize) {
        while self.capacity() < count {
            self.chunks.push(Box::new(std::array::from_fn(|_| {
                UnsafeCell::new(MaybeUninit::<T>::uninit())
            })));
        }
    }

    fn resize(&mut self, count: usize, shrink: bool) {
        self.ensure(count);
        self.size = count;

        if shrink {
            let chunks_needed =
                (count + POOL_CHUNK_SIZE - 1) / POOL_CHUNK_SIZE;
            debug_assert!(
                (chunks_needed * POOL_CHUNK_SIZE..self.capacity())
                    .all(|i| !self.bits.has(i)),
                "shrinking over present slots"
            );
            self.chunks.truncate(chunks_needed);
        }
    }

    fn data_ptr(&self, index: usize) -> *mut u8 {
        self.slot(index) as *mut u8
    }

    fn destroy(&mut self, index: usize) {
        debug_assert!(self.bits.has(index), "destroying an absent slot");
        unsafe { ptr::drop_in_place((*self.slot(index)).as_mut_ptr()) };
    }

    fn has_bit(&self, index: usize) -> bool {
        self.bits.has(index)
    }

    fn set_bit(&mut self, index: usize) {
        self.bits.set(index);
    }

    fn reset_bit(&mut self, index: usize) {
        self.bits.clear(index);
    }

    fn count_bits(&self) -> usize {
        self.bits.count()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T> Drop for TypedPool<T> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }
        for index in self.bits.iter_bits() {
            if index >= self.capacity() {
                break;
            }
            unsafe { ptr::drop_in_place((*self.slot(index)).as_mut_ptr()) };
        }
    }
}
