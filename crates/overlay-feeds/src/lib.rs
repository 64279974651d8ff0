//! Network side of the overlay: weather backend and elevation provider clients,
//! retry pacing and last-known-good fallback.

pub mod backoff;
pub mod client;
pub mod error;
pub mod fallback;

pub use backoff::Backoff;
pub use client::{ElevationClient, WeatherClient};
pub use error::{FeedError, Result};
pub use fallback::{LastKnownGood, Sourced};
