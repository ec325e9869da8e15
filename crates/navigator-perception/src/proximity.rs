//! Obstacle proximity tracking.
//!
//! Keeps every observed obstacle point that still lies within the tracking
//! radius of the vehicle and reports the distance to the nearest one.  Each
//! new batch replaces the retained set with the radius-filtered union of the
//! old set and the batch, so points the vehicle has moved away from are
//! dropped on the next update.
//!
//! | Item | Role |
//! |------|------|
//! | [`retain_nearby`]      | Pure `(old set, position, batch) -> new set` step. |
//! | [`ProximityTracker`]   | Stateful wrapper holding the latest pose and set.  |
//! | [`TrackerConfig`]      | Tracking radius, safety radius, retention cap.     |
//!
//! # Example
//!
//! ```rust
//! use navigator_perception::proximity::{ProximityTracker, TrackerConfig};
//! use navigator_types::{Point3, VehiclePose};
//!
//! let mut tracker = ProximityTracker::new(TrackerConfig::default());
//!
//! // No pose yet: the batch is discarded.
//! assert_eq!(tracker.update(&[Point3::new(2.0, 0.0, 0.0)]), None);
//!
//! tracker.set_pose(VehiclePose::new(0.0, 0.0, 0.0));
//! assert_eq!(tracker.update(&[Point3::new(2.0, 0.0, 0.0)]), Some(2.0));
//! assert!((tracker.safety_margin() - 1.0).abs() < 1e-12);
//! ```

use std::collections::HashSet;

use navigator_types::{NavError, Point3, VehiclePose};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::point_cloud::sanitize_batch;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tracking parameters, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Tracking radius R (metres).  Points farther than this are forgotten.
    pub radius: f64,
    /// Safety radius R_o (metres) subtracted from the nearest distance.
    pub safety_radius: f64,
    /// Upper bound on the number of retained points.
    pub max_retained: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            radius: 10.0,
            safety_radius: 1.0,
            max_retained: 10_000,
        }
    }
}

impl TrackerConfig {
    /// Reject radii that are non-finite or out of range and a zero cap.
    pub fn validate(&self) -> Result<(), NavError> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(NavError::InvalidConfig(format!(
                "tracking radius must be positive and finite, got {}",
                self.radius
            )));
        }
        if !self.safety_radius.is_finite() || self.safety_radius < 0.0 {
            return Err(NavError::InvalidConfig(format!(
                "safety radius must be non-negative and finite, got {}",
                self.safety_radius
            )));
        }
        if self.max_retained == 0 {
            return Err(NavError::InvalidConfig(
                "max_retained must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pure retention step
// ────────────────────────────────────────────────────────────────────────────

/// Result of one retention step.
#[derive(Debug, Clone, PartialEq)]
pub struct Retained {
    /// Surviving points, oldest first.
    pub points: Vec<Point3>,
    /// Distance to the nearest surviving point; `f64::INFINITY` when empty.
    pub nearest: f64,
}

/// Compute the new retained set from `previous`, the vehicle `position` and a
/// batch of `new_points`.
///
/// The union `previous ++ new_points` is filtered to points within `radius`
/// (inclusive) of `position`.  Exact duplicate coordinates collapse onto the
/// most recent observation, and when more than `max_retained` points survive
/// the oldest are evicted.
pub fn retain_nearby(
    previous: &[Point3],
    position: Point3,
    new_points: &[Point3],
    radius: f64,
    max_retained: usize,
) -> Retained {
    let mut seen = HashSet::new();
    let mut kept: Vec<(Point3, f64)> = Vec::new();

    // Walk newest to oldest so the first copy seen is the most recent one.
    for p in previous.iter().chain(new_points.iter()).rev() {
        if kept.len() == max_retained {
            break;
        }
        let distance = p.distance_to(&position);
        if distance > radius {
            continue;
        }
        if seen.insert(coordinate_key(p)) {
            kept.push((*p, distance));
        }
    }
    kept.reverse();

    let nearest = kept
        .iter()
        .map(|&(_, d)| d)
        .fold(f64::INFINITY, f64::min);

    Retained {
        points: kept.into_iter().map(|(p, _)| p).collect(),
        nearest,
    }
}

/// Bit-exact key for duplicate detection; `-0.0` and `0.0` compare equal.
fn coordinate_key(p: &Point3) -> [u64; 3] {
    [
        (p.x + 0.0).to_bits(),
        (p.y + 0.0).to_bits(),
        (p.z + 0.0).to_bits(),
    ]
}

// ────────────────────────────────────────────────────────────────────────────
// ProximityTracker
// ────────────────────────────────────────────────────────────────────────────

/// Holds the latest vehicle pose and the retained obstacle set.
///
/// Feed poses with [`ProximityTracker::set_pose`] and point batches with
/// [`ProximityTracker::update`]; read the result with
/// [`ProximityTracker::safety_margin`].
#[derive(Debug)]
pub struct ProximityTracker {
    config: TrackerConfig,
    pose: Option<VehiclePose>,
    points: Vec<Point3>,
    nearest: Option<f64>,
}

impl ProximityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            pose: None,
            points: Vec::new(),
            nearest: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record the latest vehicle pose.  Subsequent batches are filtered
    /// against it.
    pub fn set_pose(&mut self, pose: VehiclePose) {
        self.pose = Some(pose);
    }

    pub fn pose(&self) -> Option<VehiclePose> {
        self.pose
    }

    /// Fold a new batch of observed points into the retained set.
    ///
    /// Returns the distance to the nearest retained point (`f64::INFINITY`
    /// when nothing is within range), or `None` when no pose has been
    /// received yet; in that case the batch is discarded and the previous
    /// state is left untouched.
    pub fn update(&mut self, new_points: &[Point3]) -> Option<f64> {
        let Some(pose) = self.pose else {
            info!("vehicle pose not yet received; discarding point batch");
            return None;
        };

        let batch = sanitize_batch(new_points);
        let retained = retain_nearby(
            &self.points,
            pose.position,
            &batch,
            self.config.radius,
            self.config.max_retained,
        );

        debug!(
            batch = batch.len(),
            retained = retained.points.len(),
            "obstacle set updated"
        );
        info!(
            stored = retained.points.len(),
            nearest = retained.nearest,
            "proximity update"
        );

        self.points = retained.points;
        self.nearest = Some(retained.nearest);
        self.nearest
    }

    /// Distance to the nearest retained point, if any batch has been
    /// processed since a pose became available.
    pub fn nearest_distance(&self) -> Option<f64> {
        self.nearest
    }

    /// Current safety margin `h = d - R_o`.
    ///
    /// Returns `f64::INFINITY` when no distance is available yet or no
    /// obstacle is within the tracking radius.
    pub fn safety_margin(&self) -> f64 {
        match self.nearest {
            Some(d) => d - self.config.safety_radius,
            None => f64::INFINITY,
        }
    }

    /// Points currently retained, oldest first.
    pub fn retained(&self) -> &[Point3] {
        &self.points
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
