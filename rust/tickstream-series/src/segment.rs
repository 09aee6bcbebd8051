//! Chain segments and the chain-state epoch backing a series.
//!
//! A segment is a fixed-capacity slab of element slots with a write-once
//! forward link. The single writer fills slots in order and publishes its
//! progress through atomic counters; readers never touch a slot whose
//! publication they have not observed. Segments are linked into a chain
//! rooted in a [`ChainState`] epoch; `clear` installs a fresh epoch and
//! snapshots keep the epoch they captured alive.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// A fixed-capacity block of element slots plus a link to the next segment.
///
/// Publication protocol: the writer stores a slot, then the segment fill
/// count with `Release`, then the chain total with `Release`. Readers load
/// the chain total with `Acquire` and stay strictly below it, so every slot
/// they dereference is fully written. Slots below a published fill count are
/// never overwritten by appends.
pub(crate) struct Segment<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Number of initialized slots.
    len: AtomicUsize,
    next: OnceLock<Arc<Segment<T>>>,
}

// Values are moved in through `&Segment` by the single writer and read from
// any thread that observed their publication.
unsafe impl<T: Send> Send for Segment<T> {}
unsafe impl<T: Send + Sync> Sync for Segment<T> {}

impl<T> Segment<T> {
    pub(crate) fn new(capacity: usize) -> Arc<Segment<T>> {
        assert!(capacity > 0, "segment capacity must be positive");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Arc::new(Segment {
            slots,
            len: AtomicUsize::new(0),
            next: OnceLock::new(),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn next(&self) -> Option<&Arc<Segment<T>>> {
        self.next.get()
    }

    /// Links `next` as the successor of this segment. Only the writer links,
    /// and only once the segment is full.
    pub(crate) fn link_next(&self, next: Arc<Segment<T>>) {
        let linked = self.next.set(next).is_ok();
        debug_assert!(linked, "segment already has a successor");
    }

    /// Writes `value` into slot `index` and publishes the new fill count.
    ///
    /// # Safety
    ///
    /// The caller must be the chain's single writer, and `index` must equal
    /// the segment's current fill count (and so be below its capacity).
    pub(crate) unsafe fn push(&self, index: usize, value: T) {
        debug_assert!(index < self.capacity());
        unsafe { (*self.slots[index].get()).write(value) };
        self.len.store(index + 1, Ordering::Release);
    }

    /// Returns a reference to slot `index`.
    ///
    /// # Safety
    ///
    /// `index` must be below a fill count the caller has observed for this
    /// segment (directly, or through an `Acquire` load of the chain total).
    #[inline]
    pub(crate) unsafe fn slot(&self, index: usize) -> &T {
        debug_assert!(index < self.capacity());
        unsafe { (*self.slots[index].get()).assume_init_ref() }
    }

    /// Returns a mutable reference to slot `index`.
    ///
    /// # Safety
    ///
    /// Same publication requirement as [`Segment::slot`], and the caller must
    /// guarantee that no other thread accesses the slot while the returned
    /// reference lives.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slot_mut(&self, index: usize) -> &mut T {
        debug_assert!(index < self.capacity());
        unsafe { (*self.slots[index].get()).assume_init_mut() }
    }

    /// The initialized prefix of this segment, as a slice of length `len`.
    ///
    /// # Safety
    ///
    /// `len` must be a fill count the caller has observed for this segment.
    #[inline]
    pub(crate) unsafe fn prefix(&self, len: usize) -> &[T] {
        debug_assert!(len <= self.capacity());
        // UnsafeCell<MaybeUninit<T>> has the same layout as T.
        unsafe { std::slice::from_raw_parts(self.slots.as_ptr().cast::<T>(), len) }
    }
}

impl<T> Drop for Segment<T> {
    fn drop(&mut self) {
        let len = *self.len.get_mut();
        debug_assert!(len <= self.slots.len());
        for slot in &mut self.slots[..len] {
            unsafe { slot.get_mut().assume_init_drop() };
        }
        // Unlink the rest of the chain iteratively so dropping a long chain
        // cannot overflow the stack. Each detached segment drops with its
        // link already taken; a segment still pinned elsewhere (a snapshot's
        // captured tail) is left to its other owner.
        let mut next = self.next.take();
        while let Some(segment) = next {
            next = match Arc::into_inner(segment) {
                Some(mut segment) => segment.next.take(),
                None => None,
            };
        }
    }
}

/// One epoch of a series: the chain root plus the published element count.
///
/// `clear` replaces the epoch wholesale; a snapshot pins the epoch it
/// captured, which keeps every segment of that chain reachable for as long
/// as the snapshot lives.
pub(crate) struct ChainState<T> {
    pub(crate) head: Arc<Segment<T>>,
    /// Total published element count. Stored with `Release` after the slot
    /// write, loaded with `Acquire` before any slot access.
    pub(crate) total: AtomicU64,
    /// Capacity of the original first segment; `clear` resets to this.
    pub(crate) first_capacity: usize,
}

impl<T> ChainState<T> {
    pub(crate) fn new(capacity: usize) -> Arc<ChainState<T>> {
        Arc::new(ChainState {
            head: Segment::new(capacity),
            total: AtomicU64::new(0),
            first_capacity: capacity,
        })
    }

    /// Locates the segment holding element `index`, and the offset of the
    /// element within it. `index` must be below a published total.
    pub(crate) fn locate(&self, mut index: u64) -> (&Segment<T>, usize) {
        let mut segment: &Segment<T> = &self.head;
        loop {
            let capacity = segment.capacity() as u64;
            if index < capacity {
                return (segment, index as usize);
            }
            index -= capacity;
            segment = segment.next().expect("element index beyond chain");
        }
    }

    /// Finds the segment holding the last of `total` published elements,
    /// along with the fill count within that segment. For `total == 0` this
    /// is the head with a fill of zero.
    pub(crate) fn tail_for(&self, total: u64) -> (&Arc<Segment<T>>, usize) {
        let mut segment = &self.head;
        let mut remaining = total;
        loop {
            let capacity = segment.capacity() as u64;
            if remaining <= capacity {
                return (segment, remaining as usize);
            }
            remaining -= capacity;
            segment = segment.next().expect("element count beyond chain");
        }
    }
}
