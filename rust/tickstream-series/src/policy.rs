//! Segment sizing policy.

use std::fmt;
use std::sync::Arc;

/// Capacity of the first segment when the caller does not size the series
/// explicitly.
pub const DEFAULT_FIRST_BLOCK_SIZE: usize = 32;

/// Ceiling on the capacity of any segment allocated during growth.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1_000_000;

/// A late-bound maximum-block-size policy.
///
/// The function is re-evaluated every time a new segment is needed, so a
/// dynamic policy affects all segments allocated after it changes its answer.
pub type BlockSizeFn = Arc<dyn Fn() -> usize + Send + Sync>;

/// Controls how a series sizes its segments.
///
/// A policy is an explicit configuration value passed at construction. The
/// process-wide defaults are the [`DEFAULT_FIRST_BLOCK_SIZE`] and
/// [`DEFAULT_MAX_BLOCK_SIZE`] constants; a policy with no overrides resolves
/// to them.
///
/// The maximum block size can be pinned to a constant or supplied as a
/// closure. A closure result of `0` is a configuration error reported by the
/// append that needed the new segment, not here.
#[derive(Clone, Default)]
pub struct GrowthPolicy {
    first_block_size: Option<usize>,
    max_block_size: Option<MaxBlockSize>,
}

#[derive(Clone)]
enum MaxBlockSize {
    Pinned(usize),
    Dynamic(BlockSizeFn),
}

impl GrowthPolicy {
    /// Creates a policy that resolves to the default constants.
    pub fn new() -> GrowthPolicy {
        GrowthPolicy::default()
    }

    /// Overrides the first segment capacity.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn with_first_block_size(mut self, size: usize) -> GrowthPolicy {
        assert!(size > 0, "first block size must be positive");
        self.first_block_size = Some(size);
        self
    }

    /// Pins the maximum block size to a constant.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn with_max_block_size(mut self, size: usize) -> GrowthPolicy {
        assert!(size > 0, "maximum block size must be positive");
        self.max_block_size = Some(MaxBlockSize::Pinned(size));
        self
    }

    /// Supplies a dynamic maximum-block-size function, re-evaluated at every
    /// segment allocation.
    pub fn with_max_block_size_fn(
        mut self,
        get_max_block_size: impl Fn() -> usize + Send + Sync + 'static,
    ) -> GrowthPolicy {
        self.max_block_size = Some(MaxBlockSize::Dynamic(Arc::new(get_max_block_size)));
        self
    }

    /// Resolved first segment capacity.
    #[inline]
    pub fn first_block_size(&self) -> usize {
        self.first_block_size.unwrap_or(DEFAULT_FIRST_BLOCK_SIZE)
    }

    /// Resolves the maximum block size as of this call.
    ///
    /// May return `0` when a dynamic policy misbehaves; the caller treats
    /// that as a configuration error.
    pub fn max_block_size(&self) -> usize {
        match &self.max_block_size {
            None => DEFAULT_MAX_BLOCK_SIZE,
            Some(MaxBlockSize::Pinned(size)) => *size,
            Some(MaxBlockSize::Dynamic(get)) => get(),
        }
    }
}

impl fmt::Debug for GrowthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max: &dyn fmt::Debug = match &self.max_block_size {
            None => &DEFAULT_MAX_BLOCK_SIZE,
            Some(MaxBlockSize::Pinned(size)) => size,
            Some(MaxBlockSize::Dynamic(_)) => &"dynamic",
        };
        f.debug_struct("GrowthPolicy")
            .field("first_block_size", &self.first_block_size())
            .field("max_block_size", max)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn defaults() {
        let policy = GrowthPolicy::new();
        assert_eq!(policy.first_block_size(), DEFAULT_FIRST_BLOCK_SIZE);
        assert_eq!(policy.max_block_size(), DEFAULT_MAX_BLOCK_SIZE);
    }

    #[test]
    fn pinned_overrides() {
        let policy = GrowthPolicy::new()
            .with_first_block_size(8)
            .with_max_block_size(128);
        assert_eq!(policy.first_block_size(), 8);
        assert_eq!(policy.max_block_size(), 128);
    }

    #[test]
    fn dynamic_policy_is_reevaluated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let policy = GrowthPolicy::new().with_max_block_size_fn(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            64
        });
        assert_eq!(policy.max_block_size(), 64);
        assert_eq!(policy.max_block_size(), 64);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    #[should_panic(expected = "first block size must be positive")]
    fn zero_first_block_size_is_rejected() {
        let _ = GrowthPolicy::new().with_first_block_size(0);
    }

    #[test]
    #[should_panic(expected = "maximum block size must be positive")]
    fn zero_pinned_max_block_size_is_rejected() {
        let _ = GrowthPolicy::new().with_max_block_size(0);
    }
}
