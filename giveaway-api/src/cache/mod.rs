//! Metrics Cache
//!
//! One process-wide cache of the aggregated overweight series. Readers take
//! an `Arc` to the current [`CacheSnapshot`](giveaway_core::CacheSnapshot);
//! refresh cycles build a replacement and swap it in.

mod controller;

pub use controller::{CacheController, RefreshOutcome};
