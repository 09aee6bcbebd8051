//! Capacity estimation from a sampling time window.

use std::time::Duration;

/// Default sampling window used by `TickSeries::new`.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Nominal tick density used to size storage for a window, in samples per
/// second. A liquid instrument during active hours produces ticks on this
/// order; callers with a known feed rate should size explicitly instead.
pub const NOMINAL_SAMPLES_PER_SEC: u64 = 50;

/// Estimates how many samples fit in `window` at the nominal tick density.
///
/// The estimate is only a starting capacity: the series keeps growing past it
/// as long as samples arrive. Never returns zero, so the result is always a
/// valid series capacity.
pub fn storage_size_for(window: Duration) -> usize {
    let samples = window
        .as_millis()
        .saturating_mul(NOMINAL_SAMPLES_PER_SEC as u128)
        / 1000;
    usize::try_from(samples).unwrap_or(usize::MAX).max(1)
}
