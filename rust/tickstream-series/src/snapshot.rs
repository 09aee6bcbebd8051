//! Point-in-time snapshot views over a series chain, and iteration.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tickstream_common::Result;
use tickstream_common::error::Error;

use crate::segment::{ChainState, Segment};

/// An immutable, point-in-time view over a series.
///
/// A snapshot captures the chain root, the tail segment, the tail fill count
/// and the total element count as one consistent group: elements appended
/// after the capture are never observed, and a fill count never runs ahead
/// of the slots actually written. Snapshots are cheap to clone, safe to send
/// to other threads, and remain valid while the source series keeps growing
/// or even after it is cleared, because they share ownership of the chain
/// epoch they captured.
pub struct SeriesSnapshot<T> {
    // `tail` is declared before `state` so its reference drops first and the
    // chain teardown sees an unpinned tail.
    tail: Arc<Segment<T>>,
    state: Arc<ChainState<T>>,
    tail_len: usize,
    len: u64,
}

impl<T> SeriesSnapshot<T> {
    pub(crate) fn capture(state: Arc<ChainState<T>>) -> SeriesSnapshot<T> {
        let len = state.total.load(Ordering::Acquire);
        let (tail, tail_len) = state.tail_for(len);
        let tail = Arc::clone(tail);
        SeriesSnapshot {
            tail,
            state,
            tail_len,
            len,
        }
    }

    /// Number of elements captured by this snapshot.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the snapshot captured no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a reference to the element at `index`, or `None` when `index`
    /// is at or beyond the captured count.
    ///
    /// Walks the segment chain from the head: O(segments), not O(1).
    pub fn get(&self, index: u64) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let (segment, offset) = self.state.locate(index);
        // Safety: index is below the captured total, which was loaded with
        // `Acquire` and therefore covers the slot's publication.
        Some(unsafe { segment.slot(offset) })
    }

    /// Iterates the captured elements in append order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(&self.state.head, &self.tail, self.tail_len, self.len)
    }

    /// Materializes the snapshot into a freshly allocated `Vec`, bulk-copying
    /// each full segment and then the truncated tail.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let len = usize::try_from(self.len).expect("snapshot length exceeds addressable memory");
        let mut out = Vec::with_capacity(len);
        self.for_each_chunk(|chunk| out.extend_from_slice(chunk));
        out
    }

    /// Copies the captured elements into `dst` starting at `offset`.
    ///
    /// Fails with [`ErrorKind::DestBufferTooSmall`] when the destination
    /// cannot hold `offset + len()` elements; nothing is copied in that case.
    ///
    /// [`ErrorKind::DestBufferTooSmall`]: tickstream_common::error::ErrorKind::DestBufferTooSmall
    pub fn copy_to(&self, dst: &mut [T], offset: usize) -> Result<()>
    where
        T: Clone,
    {
        let len = usize::try_from(self.len).expect("snapshot length exceeds addressable memory");
        if dst.len() < offset || dst.len() - offset < len {
            return Err(Error::dest_buffer_too_small());
        }
        let mut pos = offset;
        self.for_each_chunk(|chunk| {
            dst[pos..pos + chunk.len()].clone_from_slice(chunk);
            pos += chunk.len();
        });
        Ok(())
    }

    /// Calls `f` once per segment with that segment's captured chunk, from
    /// the head through the captured tail.
    fn for_each_chunk(&self, mut f: impl FnMut(&[T])) {
        let tail: &Segment<T> = &self.tail;
        let mut segment: &Segment<T> = &self.state.head;
        loop {
            let is_tail = std::ptr::eq(segment, tail);
            let bound = if is_tail {
                self.tail_len
            } else {
                segment.capacity()
            };
            // Safety: every segment before the captured tail is full, and the
            // captured tail is published up to `tail_len`.
            f(unsafe { segment.prefix(bound) });
            if is_tail {
                return;
            }
            segment = segment.next().expect("captured tail not reachable");
        }
    }
}

impl<T> Clone for SeriesSnapshot<T> {
    fn clone(&self) -> Self {
        SeriesSnapshot {
            tail: Arc::clone(&self.tail),
            state: Arc::clone(&self.state),
            tail_len: self.tail_len,
            len: self.len,
        }
    }
}

impl<T> fmt::Debug for SeriesSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesSnapshot")
            .field("len", &self.len)
            .finish()
    }
}

impl<'a, T> IntoIterator for &'a SeriesSnapshot<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Clone> IntoIterator for SeriesSnapshot<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self)
    }
}

/// A forward-only cursor over the elements of a snapshot (or of the live
/// series, bounded as of the iterator's creation).
///
/// Advances slot by slot within a segment and follows the chain link when
/// the segment's bound is reached; the bound is the captured fill count on
/// the captured tail and the full capacity on every earlier segment.
/// Exhaustion drops the segment reference, after which `next` keeps
/// returning `None`. There is no way to reset the cursor.
pub struct Iter<'a, T> {
    segment: Option<&'a Segment<T>>,
    pos: usize,
    bound: usize,
    tail: &'a Segment<T>,
    tail_len: usize,
    remaining: u64,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(
        head: &'a Segment<T>,
        tail: &'a Arc<Segment<T>>,
        tail_len: usize,
        len: u64,
    ) -> Iter<'a, T> {
        let tail: &'a Segment<T> = tail;
        let (segment, bound) = if len == 0 {
            (None, 0)
        } else if std::ptr::eq(head, tail) {
            (Some(head), tail_len)
        } else {
            (Some(head), head.capacity())
        };
        Iter {
            segment,
            pos: 0,
            bound,
            tail,
            tail_len,
            remaining: len,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            let segment = self.segment?;
            if self.pos < self.bound {
                // Safety: `pos` is below the bound established at creation,
                // which never exceeds the published fill of the segment.
                let item = unsafe { segment.slot(self.pos) };
                self.pos += 1;
                self.remaining -= 1;
                return Some(item);
            }
            if std::ptr::eq(segment, self.tail) {
                debug_assert_eq!(self.remaining, 0);
                self.segment = None;
                return None;
            }
            match segment.next() {
                Some(next) => {
                    let next: &'a Segment<T> = next;
                    self.bound = if std::ptr::eq(next, self.tail) {
                        self.tail_len
                    } else {
                        next.capacity()
                    };
                    self.pos = 0;
                    self.segment = Some(next);
                }
                None => {
                    self.segment = None;
                    return None;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl<T> std::iter::FusedIterator for Iter<'_, T> {}

/// By-value snapshot iterator, cloning each element out of the captured
/// chain.
pub struct IntoIter<T> {
    // The segment cursor is declared before `snapshot` so it drops first.
    segment: Option<Arc<Segment<T>>>,
    snapshot: SeriesSnapshot<T>,
    pos: usize,
    bound: usize,
}

impl<T> IntoIter<T> {
    fn new(snapshot: SeriesSnapshot<T>) -> IntoIter<T> {
        let (segment, bound) = if snapshot.len == 0 {
            (None, 0)
        } else if Arc::ptr_eq(&snapshot.state.head, &snapshot.tail) {
            (Some(Arc::clone(&snapshot.state.head)), snapshot.tail_len)
        } else {
            let head = Arc::clone(&snapshot.state.head);
            let bound = head.capacity();
            (Some(head), bound)
        };
        IntoIter {
            segment,
            snapshot,
            pos: 0,
            bound,
        }
    }
}

impl<T: Clone> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let segment = self.segment.as_ref()?;
            if self.pos < self.bound {
                // Safety: same bound argument as `Iter::next`.
                let item = unsafe { segment.slot(self.pos) }.clone();
                self.pos += 1;
                return Some(item);
            }
            if Arc::ptr_eq(segment, &self.snapshot.tail) {
                self.segment = None;
                return None;
            }
            let next = segment.next().map(Arc::clone);
            match next {
                Some(next) => {
                    self.bound = if Arc::ptr_eq(&next, &self.snapshot.tail) {
                        self.snapshot.tail_len
                    } else {
                        next.capacity()
                    };
                    self.pos = 0;
                    self.segment = Some(next);
                }
                None => {
                    self.segment = None;
                    return None;
                }
            }
        }
    }
}

impl<T: Clone> std::iter::FusedIterator for IntoIter<T> {}
