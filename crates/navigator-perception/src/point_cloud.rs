//! Point batch sanitation.
//!
//! Sonar point clouds arrive with NaN returns for beams that saw nothing, and
//! a corrupted message can claim an absurd number of points.  Both are
//! handled here so the tracker only ever sees finite coordinates.

use navigator_types::Point3;
use tracing::{debug, warn};

/// Maximum number of points accepted in a single batch.
///
/// Larger batches are treated as malformed and contribute no points.
pub const MAX_POINTS_PER_BATCH: usize = 65_536;

/// Return the finite points of `batch`.
///
/// An oversized batch yields an empty vector and a warning; the control loop
/// carries on with the points it already tracks.
pub fn sanitize_batch(batch: &[Point3]) -> Vec<Point3> {
    if batch.len() > MAX_POINTS_PER_BATCH {
        warn!(
            points = batch.len(),
            limit = MAX_POINTS_PER_BATCH,
            "point batch exceeds size limit; ignoring it"
        );
        return Vec::new();
    }

    let points: Vec<Point3> = batch.iter().copied().filter(Point3::is_finite).collect();
    let skipped = batch.len() - points.len();
    if skipped > 0 {
        debug!(skipped, "dropped non-finite points from batch");
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_points_pass_through_in_order() {
        let batch = vec![Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 2.0, 0.0)];
        assert_eq!(sanitize_batch(&batch), batch);
    }

    #[test]
    fn nan_and_infinite_points_are_skipped() {
        let batch = vec![
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, f64::NEG_INFINITY, 0.0),
        ];
        assert_eq!(sanitize_batch(&batch), vec![Point3::new(1.0, 1.0, 1.0)]);
    }

    #[test]
    fn empty_batch_is_empty() {
        assert!(sanitize_batch(&[]).is_empty());
    }

    #[test]
    fn oversized_batch_is_dropped() {
        let batch = vec![Point3::new(1.0, 0.0, 0.0); MAX_POINTS_PER_BATCH + 1];
        assert!(sanitize_batch(&batch).is_empty());
    }
}
