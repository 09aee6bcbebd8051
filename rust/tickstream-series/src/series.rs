//! The writer container and its cross-thread reader handle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use arc_swap::ArcSwap;
use log::{debug, trace};
use tickstream_common::Result;
use tickstream_common::error::Error;
use tickstream_common::verify_arg;

use crate::policy::GrowthPolicy;
use crate::segment::{ChainState, Segment};
use crate::snapshot::{Iter, SeriesSnapshot};
use crate::window;

/// State shared between a writer and its reader handles.
struct Shared<T> {
    state: ArcSwap<ChainState<T>>,
}

/// An append-only, block-segmented series of samples.
///
/// `TickSeries` holds elements in a chain of fixed-capacity segments. Appends
/// fill the tail segment and, when it runs out, link a new segment sized to
/// the total number of elements seen so far, capped by the growth policy.
/// Elements never move once written: a reference obtained through
/// [`TickSeries::get`] stays valid until [`TickSeries::clear`].
///
/// The series is the unique writer handle; it is not `Clone`, and all
/// mutation goes through `&mut self`. Concurrent readers use
/// [`SeriesReader`] handles and the [`SeriesSnapshot`] views they capture,
/// which observe a consistent prefix of the stream without locking while
/// appends continue.
///
/// Indexed access walks the chain and is O(segments); the segment count
/// stays logarithmic in the stream length until the per-segment ceiling is
/// reached. Forward iteration is the intended access pattern.
pub struct TickSeries<T> {
    shared: Arc<Shared<T>>,
    tail: Arc<Segment<T>>,
    tail_len: usize,
    len: u64,
    // `state` is declared after `tail` so chain teardown runs with the
    // writer's tail reference already released.
    state: Arc<ChainState<T>>,
    policy: GrowthPolicy,
}

impl<T> TickSeries<T> {
    /// Creates a series sized for the default 5-minute sampling window.
    pub fn new() -> TickSeries<T> {
        TickSeries::for_window(window::DEFAULT_WINDOW)
    }

    /// Creates a series whose first segment fits the samples expected within
    /// `window` (see [`crate::window::storage_size_for`]).
    pub fn for_window(window: Duration) -> TickSeries<T> {
        TickSeries::with_capacity(window::storage_size_for(window))
    }

    /// Creates a series with an explicit first-segment capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> TickSeries<T> {
        TickSeries::with_capacity_and_policy(capacity, GrowthPolicy::new())
    }

    /// Creates a series sized by the policy's first block size.
    pub fn with_policy(policy: GrowthPolicy) -> TickSeries<T> {
        TickSeries::with_capacity_and_policy(policy.first_block_size(), policy)
    }

    /// Creates a series with an explicit first-segment capacity and a growth
    /// policy for later segments.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity_and_policy(capacity: usize, policy: GrowthPolicy) -> TickSeries<T> {
        assert!(capacity > 0, "series capacity must be positive");
        let state = ChainState::new(capacity);
        let tail = Arc::clone(&state.head);
        TickSeries {
            shared: Arc::new(Shared {
                state: ArcSwap::from(Arc::clone(&state)),
            }),
            tail,
            tail_len: 0,
            len: 0,
            state,
            policy,
        }
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the series holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of segments currently in the chain.
    pub fn segment_count(&self) -> usize {
        let mut count = 1;
        let mut segment: &Segment<T> = &self.state.head;
        while let Some(next) = segment.next() {
            count += 1;
            segment = next;
        }
        count
    }

    /// Appends an element at the end of the series.
    ///
    /// O(1), amortized and worst-case, except when a new segment must be
    /// allocated. Fails only when a dynamic growth policy resolves to a zero
    /// maximum block size at the moment a new segment is needed; the series
    /// is left untouched in that case and the append can be retried once the
    /// policy is fixed.
    pub fn append(&mut self, value: T) -> Result<()> {
        if self.tail_len == self.tail.capacity() {
            self.grow()?;
        }
        // Safety: single writer; `tail_len` mirrors the tail's fill count
        // and is below its capacity.
        unsafe { self.tail.push(self.tail_len, value) };
        self.tail_len += 1;
        self.len += 1;
        self.state.total.store(self.len, Ordering::Release);
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        let max_block_size = self.policy.max_block_size();
        if max_block_size == 0 {
            return Err(Error::invalid_block_size(0));
        }
        let capacity = self.len.min(max_block_size as u64) as usize;
        debug!(
            "allocating segment: capacity={capacity}, segments={}, total={}",
            self.segment_count(),
            self.len
        );
        let segment = Segment::new(capacity);
        self.tail.link_next(Arc::clone(&segment));
        self.tail = segment;
        self.tail_len = 0;
        Ok(())
    }

    /// Returns a reference to the element at `index`, or `None` when `index`
    /// is out of range.
    ///
    /// Walks the segment chain from the head: O(segments), not O(1).
    pub fn get(&self, index: u64) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let (segment, offset) = self.state.locate(index);
        // Safety: index is below the total this writer has published.
        Some(unsafe { segment.slot(offset) })
    }

    /// Returns a mutable reference to the element at `index`, or `None` when
    /// `index` is out of range.
    ///
    /// # Panics
    ///
    /// In-place mutation is writer-exclusive: panics while any reader handle
    /// or snapshot of the current chain is outstanding, since such a reader
    /// could observe the slot mid-write.
    pub fn get_mut(&mut self, index: u64) -> Option<&mut T> {
        self.assert_exclusive("get_mut");
        if index >= self.len {
            return None;
        }
        let (segment, offset) = self.state.locate(index);
        // Safety: in range, and `assert_exclusive` ruled out every reader
        // that could touch the slot while the borrow lives.
        Some(unsafe { segment.slot_mut(offset) })
    }

    /// Overwrites the element at `index` in place. Counts do not change.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range, or while any reader handle or
    /// snapshot of the current chain is outstanding (see
    /// [`TickSeries::get_mut`]).
    pub fn set(&mut self, index: u64, value: T) {
        assert!(
            index < self.len,
            "index out of range: {index} >= {}",
            self.len
        );
        self.assert_exclusive("set");
        let (segment, offset) = self.state.locate(index);
        // Safety: as for `get_mut`.
        unsafe { *segment.slot_mut(offset) = value };
    }

    /// In-place mutation must not race with readers of the same slot. Reader
    /// handles are counted on `shared` and snapshots on the current epoch;
    /// neither can be minted while the writer sits in a `&mut self` call, so
    /// the counts cannot go stale under us.
    fn assert_exclusive(&self, operation: &str) {
        assert!(
            Arc::strong_count(&self.shared) == 1,
            "{operation} requires exclusive access, but reader handles are outstanding"
        );
        assert!(
            Arc::strong_count(&self.state) <= 2,
            "{operation} requires exclusive access, but snapshots are outstanding"
        );
    }

    /// Resets the series to a single empty segment sized like the original
    /// first segment.
    ///
    /// Outstanding snapshots keep the old chain alive and stay fully
    /// readable; the memory is released once the last of them drops.
    pub fn clear(&mut self) {
        trace!(
            "clearing series: total={}, first_capacity={}",
            self.len, self.state.first_capacity
        );
        let state = ChainState::new(self.state.first_capacity);
        self.tail = Arc::clone(&state.head);
        self.tail_len = 0;
        self.len = 0;
        self.shared.state.store(Arc::clone(&state));
        self.state = state;
    }

    /// Captures a point-in-time view of the series (see [`SeriesSnapshot`]).
    pub fn snapshot(&self) -> SeriesSnapshot<T> {
        SeriesSnapshot::capture(Arc::clone(&self.state))
    }

    /// Creates a cloneable handle through which other threads can observe
    /// this series while it keeps growing.
    pub fn reader(&self) -> SeriesReader<T> {
        SeriesReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Iterates the elements present as of this call, in append order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(&self.state.head, &self.tail, self.tail_len, self.len)
    }

    /// Index of the first element equal to `value`, or `None`.
    pub fn index_of(&self, value: &T) -> Option<u64>
    where
        T: PartialEq,
    {
        self.iter().position(|item| item == value).map(|i| i as u64)
    }

    /// Returns `true` if some element equals `value`.
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.index_of(value).is_some()
    }

    /// Index of the first element matching `predicate`, or `None`.
    pub fn find_index<P>(&self, predicate: P) -> Option<u64>
    where
        P: FnMut(&T) -> bool,
    {
        self.iter().position(predicate).map(|i| i as u64)
    }

    /// Like [`TickSeries::find_index`], starting the scan at `start`.
    ///
    /// Fails when `start` is beyond the current length.
    pub fn find_index_from<P>(&self, start: u64, predicate: P) -> Result<Option<u64>>
    where
        P: FnMut(&T) -> bool,
    {
        verify_arg!(start, start <= self.len);
        self.find_index_in(start, self.len - start, predicate)
    }

    /// Index of the first element in `[start, start + count)` matching
    /// `predicate`, or `None` when nothing in the range matches.
    ///
    /// Fails when the range does not lie within the series.
    pub fn find_index_in<P>(&self, start: u64, count: u64, mut predicate: P) -> Result<Option<u64>>
    where
        P: FnMut(&T) -> bool,
    {
        verify_arg!(start, start <= self.len);
        verify_arg!(count, count <= self.len - start);
        let mut index = start;
        for item in self.iter().skip(start as usize).take(count as usize) {
            if predicate(item) {
                return Ok(Some(index));
            }
            index += 1;
        }
        Ok(None)
    }

    /// Materializes the current contents into a freshly allocated `Vec`.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.snapshot().to_vec()
    }

    /// Copies the current contents into `dst` starting at `offset`.
    ///
    /// Fails when the destination cannot hold `offset + len()` elements.
    pub fn copy_to(&self, dst: &mut [T], offset: usize) -> Result<()>
    where
        T: Clone,
    {
        self.snapshot().copy_to(dst, offset)
    }
}

impl<T> Default for TickSeries<T> {
    fn default() -> Self {
        TickSeries::new()
    }
}

impl<T> fmt::Debug for TickSeries<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickSeries")
            .field("len", &self.len)
            .field("segments", &self.segment_count())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<'a, T> IntoIterator for &'a TickSeries<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A cloneable, thread-safe observer of a series.
///
/// Readers never block the writer and never lock: `len` loads the published
/// count, and [`SeriesReader::snapshot`] captures a consistent view to read
/// from (see [`SeriesSnapshot`]).
pub struct SeriesReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SeriesReader<T> {
    /// Total number of elements published by the writer so far.
    pub fn len(&self) -> u64 {
        self.shared.state.load().total.load(Ordering::Acquire)
    }

    /// Returns `true` if nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Captures a point-in-time view of the series.
    pub fn snapshot(&self) -> SeriesSnapshot<T> {
        SeriesSnapshot::capture(self.shared.state.load_full())
    }

    /// Materializes the current contents into a freshly allocated `Vec`.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.snapshot().to_vec()
    }
}

impl<T> Clone for SeriesReader<T> {
    fn clone(&self) -> Self {
        SeriesReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for SeriesReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesReader")
            .field("len", &self.len())
            .finish()
    }
}
