//! `navigator-perception` – obstacle proximity from streaming point data.
//!
//! Turns raw 3-D point batches into the single scalar the safety filter
//! needs: the distance from the vehicle to the nearest tracked obstacle.
//!
//! # Modules
//!
//! - [`point_cloud`] – [`sanitize_batch`][point_cloud::sanitize_batch]:
//!   drops non-finite points and rejects oversized batches before they reach
//!   the tracker.
//! - [`proximity`] – [`ProximityTracker`][proximity::ProximityTracker]: keeps
//!   the bounded set of recently observed points within the tracking radius
//!   and reports the nearest distance and the resulting safety margin.

pub mod point_cloud;
pub mod proximity;

pub use point_cloud::{MAX_POINTS_PER_BATCH, sanitize_batch};
pub use proximity::{ProximityTracker, Retained, TrackerConfig, retain_nearby};
