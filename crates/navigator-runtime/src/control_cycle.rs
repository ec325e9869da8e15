//! [`ControlCycle`] – the per-vehicle control context.
//!
//! Owns everything one control thread needs: the proximity tracker, the
//! safety filter, the output frame and the fallback guard.  Each handler runs
//! to completion before the next is accepted, so no locking is needed; the
//! async [`SafetyNode`][crate::node::SafetyNode] feeds it one event at a time
//! from the ordered input channel.
//!
//! Each cycle:
//!
//! 1. **Read** the latest safety margin from the tracker (`+∞` when no
//!    distance is available yet).
//! 2. **Filter** the nominal command through the [`SafetyFilter`].
//! 3. **Guard** – record whether the filter fell back and escalate a run of
//!    fallbacks through the [`FallbackGuard`].
//! 4. **Emit** exactly one [`StampedWrench`].
//!
//! # Example
//!
//! ```rust
//! use navigator_runtime::control_cycle::{ControlCycle, ControlCycleConfig};
//! use navigator_types::{ControlCommand, Point3, VehiclePose};
//!
//! let mut cycle = ControlCycle::new(ControlCycleConfig::default()).unwrap();
//! cycle.on_pose(VehiclePose::new(0.0, 0.0, 0.0));
//! cycle.on_point_cloud(&[Point3::new(2.0, 0.0, 0.0)]);
//! assert!((cycle.safety_margin() - 1.0).abs() < 1e-12);
//!
//! let report = cycle.on_nominal_command(ControlCommand::new(50.0, 0.0, 0.0, 0.0));
//! assert_eq!(report.wrench.frame_id, "/rexrov2/base_link");
//! ```

use navigator_hal::{DynamicsCoefficients, DynamicsModel};
use navigator_kernel::{FilterConfig, FilterDecision, SafetyFilter};
use navigator_perception::{ProximityTracker, TrackerConfig};
use navigator_types::{ControlCommand, DEFAULT_FRAME_ID, NavError, Point3, StampedWrench, VehiclePose};
use serde::{Deserialize, Serialize};
use tracing::{Span, error, field, info, instrument};

use crate::fallback_guard::FallbackGuard;

/// Consecutive fallbacks before an alert is raised.
pub const DEFAULT_FALLBACK_ALERT_THRESHOLD: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Startup configuration for a [`ControlCycle`].  Immutable once the cycle
/// is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlCycleConfig {
    pub tracker: TrackerConfig,
    pub filter: FilterConfig,
    pub dynamics: DynamicsCoefficients,
    /// Frame identifier stamped on every emitted command.
    pub frame_id: String,
    /// Length of a fallback streak that raises a safety alert.
    pub fallback_alert_threshold: usize,
}

impl Default for ControlCycleConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            filter: FilterConfig::default(),
            dynamics: DynamicsCoefficients::default(),
            frame_id: DEFAULT_FRAME_ID.to_string(),
            fallback_alert_threshold: DEFAULT_FALLBACK_ALERT_THRESHOLD,
        }
    }
}

impl ControlCycleConfig {
    pub fn validate(&self) -> Result<(), NavError> {
        self.tracker.validate()?;
        self.filter.validate()?;
        self.dynamics.validate()?;
        if self.frame_id.trim().is_empty() {
            return Err(NavError::InvalidConfig("frame_id must not be empty".into()));
        }
        if self.fallback_alert_threshold == 0 {
            return Err(NavError::InvalidConfig(
                "fallback_alert_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Report
// ─────────────────────────────────────────────────────────────────────────────

/// What one control cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// The command to forward to the thrusters.
    pub wrench: StampedWrench,
    pub decision: FilterDecision,
    /// Safety margin the filter was evaluated against.
    pub margin: f64,
    /// Set when this cycle completed a run of fallbacks.
    pub alert: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlCycle
// ─────────────────────────────────────────────────────────────────────────────

/// Explicit control context.  One instance per vehicle.
#[derive(Debug)]
pub struct ControlCycle {
    tracker: ProximityTracker,
    filter: SafetyFilter,
    frame_id: String,
    fallback_guard: FallbackGuard,
}

impl ControlCycle {
    /// Build a cycle from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::InvalidConfig`] when any part of `config` is out
    /// of range.
    pub fn new(config: ControlCycleConfig) -> Result<Self, NavError> {
        config.validate()?;
        let model = DynamicsModel::new(config.dynamics);
        info!(
            radius = config.tracker.radius,
            safety_radius = config.tracker.safety_radius,
            kappa = config.filter.kappa,
            frame_id = %config.frame_id,
            "control cycle initialised"
        );
        Ok(Self {
            tracker: ProximityTracker::new(config.tracker),
            filter: SafetyFilter::new(model, &config.filter),
            frame_id: config.frame_id,
            fallback_guard: FallbackGuard::new(config.fallback_alert_threshold),
        })
    }

    /// Pose feed handler.
    pub fn on_pose(&mut self, pose: VehiclePose) {
        self.tracker.set_pose(pose);
    }

    /// Point-data feed handler.  Returns the new nearest distance, or `None`
    /// when the batch was discarded because no pose is known yet.
    pub fn on_point_cloud(&mut self, points: &[Point3]) -> Option<f64> {
        self.tracker.update(points)
    }

    /// Nominal-command handler.  Always yields exactly one command.
    #[instrument(
        name = "control_cycle",
        skip_all,
        fields(margin = field::Empty, fallback = field::Empty)
    )]
    pub fn on_nominal_command(&mut self, nominal: ControlCommand) -> CycleReport {
        let margin = self.tracker.safety_margin();
        let outcome = self.filter.filter(&nominal, margin);
        let span = Span::current();
        span.record("margin", margin);
        span.record("fallback", outcome.decision.is_fallback());

        let alert = if self.fallback_guard.record(outcome.decision.is_fallback()) {
            let message = format!(
                "safety filter fell back to the nominal command for {} consecutive cycles",
                self.fallback_guard.streak()
            );
            error!(streak = self.fallback_guard.streak(), margin, "{message}");
            Some(message)
        } else {
            None
        };

        let command = outcome.command;
        info!(
            surge = command.surge,
            sway = command.sway,
            heave = command.heave,
            yaw = command.yaw,
            margin,
            "publishing filtered command"
        );

        CycleReport {
            wrench: StampedWrench::now(self.frame_id.clone(), command),
            decision: outcome.decision,
            margin,
            alert,
        }
    }

    /// Latest safety margin `h`; `+∞` when unavailable.
    pub fn safety_margin(&self) -> f64 {
        self.tracker.safety_margin()
    }

    pub fn tracker(&self) -> &ProximityTracker {
        &self.tracker
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn fallback_streak(&self) -> usize {
        self.fallback_guard.streak()
    }
}
