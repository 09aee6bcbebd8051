//! Append-only segmented storage for streaming time-series samples.
//!
//! This crate provides a sequence container optimized for the dominant access
//! pattern of streaming market data: one producer appending samples forever,
//! many consumers reading ranges of what has already been written. Elements
//! are stored in a chain of fixed-capacity segments that grow geometrically
//! up to a configurable ceiling, so the container can hold multi-billion
//! element streams without a 32-bit size limit, without reallocating on
//! growth, and without ever moving an element once written.
//!
//! # Core Concepts
//!
//! ## Segments and the chain
//!
//! Storage is a forward-linked chain of segments. A segment's capacity is
//! fixed at allocation; each new segment is sized to the total number of
//! elements seen so far, capped by the [`crate::policy::GrowthPolicy`]
//! ceiling, which keeps the segment count logarithmic in the stream length
//! until the cap is reached. Completed segments are immutable; only the tail
//! accepts appends.
//!
//! ## Single writer, many readers
//!
//! [`crate::series::TickSeries`] is the unique writer handle. Reads from
//! other threads go through [`crate::series::SeriesReader`] handles and the
//! [`crate::snapshot::SeriesSnapshot`] views they capture. A snapshot is a
//! consistent, point-in-time prefix of the stream: appends that race with the
//! capture are either fully visible or not visible at all, and later appends
//! are never observed. Snapshots stay valid even after the source series is
//! cleared.
//!
//! ## Access cost
//!
//! Indexed access walks the segment chain and is O(segments), not O(1).
//! Forward iteration and bulk materialization ([`to_vec`], [`copy_to`]) touch
//! each segment once and are linear in the element count.
//!
//! [`to_vec`]: crate::snapshot::SeriesSnapshot::to_vec
//! [`copy_to`]: crate::snapshot::SeriesSnapshot::copy_to

pub mod policy;
mod segment;
pub mod series;
pub mod snapshot;
pub mod window;

pub use policy::GrowthPolicy;
pub use series::{SeriesReader, TickSeries};
pub use snapshot::{Iter, SeriesSnapshot};
