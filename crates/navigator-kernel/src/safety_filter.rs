//! [`SafetyFilter`] – control-barrier-function command filter.
//!
//! Given a nominal command `T_nom` and the current safety margin `h`, the
//! filter solves
//!
//! ```text
//! min ‖T − T_nom‖²    s.t.   ḣ(T) + κ·h ≥ 0
//! ```
//!
//! seeded at `T_nom`, where `ḣ` comes from the vehicle
//! [`DynamicsModel`].  Every call produces a command:
//!
//! | Situation | Decision | Command |
//! |-----------|----------|---------|
//! | `h = +∞` (nothing in range) | [`FilterDecision::Unconstrained`] | nominal |
//! | constraint already holds at `T_nom` | [`FilterDecision::AlreadySafe`] | nominal |
//! | solver converged | [`FilterDecision::Adjusted`] | optimised |
//! | solver failed or ran out of time | [`FilterDecision::Fallback`] | nominal |
//!
//! # Example
//!
//! ```
//! use navigator_hal::{DynamicsCoefficients, DynamicsModel};
//! use navigator_kernel::safety_filter::{FilterConfig, FilterDecision, SafetyFilter};
//! use navigator_types::ControlCommand;
//!
//! let model = DynamicsModel::new(DynamicsCoefficients::default());
//! let filter = SafetyFilter::new(model, &FilterConfig::default());
//!
//! // Nothing within tracking range: the command passes straight through.
//! let nominal = ControlCommand::new(50.0, 0.0, 0.0, 0.0);
//! let outcome = filter.filter(&nominal, f64::INFINITY);
//! assert_eq!(outcome.decision, FilterDecision::Unconstrained);
//! assert_eq!(outcome.command, nominal);
//! ```

use nalgebra::Vector4;
use navigator_hal::DynamicsModel;
use navigator_types::{ControlCommand, NavError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::solver::{ConstrainedProblem, ConstrainedSolver, SolverError, SolverOptions, SqpSolver};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Filter parameters, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// CBF gain κ bounding how fast the margin may decay.  Must be positive.
    pub kappa: f64,
    pub solver: SolverOptions,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kappa: 1.0,
            solver: SolverOptions::default(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), NavError> {
        if !self.kappa.is_finite() || self.kappa <= 0.0 {
            return Err(NavError::InvalidConfig(format!(
                "kappa must be positive and finite, got {}",
                self.kappa
            )));
        }
        self.solver.validate()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outcome
// ────────────────────────────────────────────────────────────────────────────

/// How the emitted command was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    /// No obstacle in range; the constraint is vacuous.
    Unconstrained,
    /// The nominal command already satisfies the constraint.
    AlreadySafe,
    /// The solver moved the command onto the safe set.
    Adjusted { iterations: usize },
    /// The solver could not certify a command; the nominal one is passed on.
    Fallback(SolverError),
}

impl FilterDecision {
    pub fn is_fallback(&self) -> bool {
        matches!(self, FilterDecision::Fallback(_))
    }
}

/// Result of one filter invocation.  `command` is always usable.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub command: ControlCommand,
    pub decision: FilterDecision,
}

// ────────────────────────────────────────────────────────────────────────────
// SafetyFilter
// ────────────────────────────────────────────────────────────────────────────

/// Minimal-deviation CBF filter over the 4-DOF command.
pub struct SafetyFilter {
    model: DynamicsModel,
    kappa: f64,
    solver: Box<dyn ConstrainedSolver>,
}

impl SafetyFilter {
    /// Build a filter backed by the default [`SqpSolver`].
    pub fn new(model: DynamicsModel, config: &FilterConfig) -> Self {
        Self::with_solver(model, config.kappa, Box::new(SqpSolver::new(config.solver)))
    }

    /// Build a filter around any [`ConstrainedSolver`] backend.
    pub fn with_solver(model: DynamicsModel, kappa: f64, solver: Box<dyn ConstrainedSolver>) -> Self {
        Self {
            model,
            kappa,
            solver,
        }
    }

    /// CBF residual `ḣ(T) + κ·h`; the command is admissible when it is `≥ 0`.
    pub fn residual(&self, command: &ControlCommand, margin: f64) -> f64 {
        self.model.margin_derivative(command) + self.kappa * margin
    }

    /// Return the admissible command closest to `nominal` given the current
    /// safety `margin`.
    ///
    /// Never fails: when the solver cannot certify a solution the nominal
    /// command is returned and a warning is logged.
    pub fn filter(&self, nominal: &ControlCommand, margin: f64) -> FilterOutcome {
        if margin == f64::INFINITY {
            return FilterOutcome {
                command: *nominal,
                decision: FilterDecision::Unconstrained,
            };
        }

        if self.residual(nominal, margin) >= 0.0 {
            debug!(margin, "nominal command already satisfies the barrier condition");
            return FilterOutcome {
                command: *nominal,
                decision: FilterDecision::AlreadySafe,
            };
        }

        let problem = BarrierProblem {
            model: &self.model,
            nominal: Vector4::from(nominal.to_array()),
            decay_allowance: self.kappa * margin,
        };

        match self.solver.solve(&problem, &problem.nominal) {
            Ok(solution) => {
                let x = solution.x;
                let command = ControlCommand::new(x[0], x[1], x[2], x[3]);
                debug!(
                    iterations = solution.iterations,
                    residual = solution.constraint,
                    deviation = solution.objective.sqrt(),
                    "barrier problem solved"
                );
                FilterOutcome {
                    command,
                    decision: FilterDecision::Adjusted {
                        iterations: solution.iterations,
                    },
                }
            }
            Err(e) => {
                warn!(error = %e, margin, "optimization failed, using original input");
                FilterOutcome {
                    command: *nominal,
                    decision: FilterDecision::Fallback(e),
                }
            }
        }
    }
}

impl std::fmt::Debug for SafetyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyFilter")
            .field("model", &self.model)
            .field("kappa", &self.kappa)
            .finish_non_exhaustive()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal problem definition
// ────────────────────────────────────────────────────────────────────────────

/// `min ‖T − T_nom‖²  s.t.  ḣ(T) + κh ≥ 0` with analytic gradients.
struct BarrierProblem<'a> {
    model: &'a DynamicsModel,
    nominal: Vector4<f64>,
    decay_allowance: f64,
}

impl ConstrainedProblem for BarrierProblem<'_> {
    fn objective(&self, x: &Vector4<f64>) -> f64 {
        (x - self.nominal).norm_squared()
    }

    fn constraint(&self, x: &Vector4<f64>) -> f64 {
        self.model.margin_derivative_at(x) + self.decay_allowance
    }

    fn objective_gradient(&self, x: &Vector4<f64>) -> Vector4<f64> {
        2.0 * (x - self.nominal)
    }

    fn constraint_gradient(&self, x: &Vector4<f64>) -> Vector4<f64> {
        self.model.margin_derivative_gradient(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Solution;
    use navigator_hal::DynamicsCoefficients;

    fn filter_with_kappa(kappa: f64) -> SafetyFilter {
        let config = FilterConfig {
            kappa,
            solver: SolverOptions {
                time_budget_ms: 1_000,
                ..SolverOptions::default()
            },
        };
        SafetyFilter::new(DynamicsModel::new(DynamicsCoefficients::default()), &config)
    }

    /// Backend that always fails, to exercise the fallback path.
    struct FailingSolver;

    impl ConstrainedSolver for FailingSolver {
        fn solve(
            &self,
            _problem: &dyn ConstrainedProblem,
            _seed: &Vector4<f64>,
        ) -> Result<Solution, SolverError> {
            Err(SolverError::MaxIterations(7))
        }
    }

    /// Backend that returns a fixed point.
    struct FixedSolver(Vector4<f64>);

    impl ConstrainedSolver for FixedSolver {
        fn solve(
            &self,
            problem: &dyn ConstrainedProblem,
            _seed: &Vector4<f64>,
        ) -> Result<Solution, SolverError> {
            Ok(Solution {
                x: self.0,
                objective: problem.objective(&self.0),
                constraint: problem.constraint(&self.0),
                iterations: 3,
            })
        }
    }

    #[test]
    fn infinite_margin_passes_nominal_through() {
        let filter = filter_with_kappa(1.0);
        let nominal = ControlCommand::new(50.0, -20.0, 5.0, 1.0);
        let outcome = filter.filter(&nominal, f64::INFINITY);
        assert_eq!(outcome.command, nominal);
        assert_eq!(outcome.decision, FilterDecision::Unconstrained);
    }

    #[test]
    fn already_safe_command_is_returned_unchanged() {
        let filter = filter_with_kappa(100.0);
        // ḣ(0) = -(ẇ₀)² ≈ -61.3, κh = 100.
        let nominal = ControlCommand::default();
        assert!(filter.residual(&nominal, 1.0) >= 0.0);
        let outcome = filter.filter(&nominal, 1.0);
        assert_eq!(outcome.command, nominal);
        assert_eq!(outcome.decision, FilterDecision::AlreadySafe);
    }

    #[test]
    fn large_allowance_keeps_aggressive_command() {
        let filter = filter_with_kappa(1e7);
        let nominal = ControlCommand::new(50.0, 0.0, 0.0, 0.0);
        let outcome = filter.filter(&nominal, 1.0);
        assert_eq!(outcome.command, nominal);
        assert_eq!(outcome.decision, FilterDecision::AlreadySafe);
    }

    #[test]
    fn aggressive_command_near_obstacle_is_attenuated() {
        // Vehicle at origin, obstacle at 2 m, R_o = 1 m → h = 1.
        for kappa in [1.0, 10.0, 1_000.0] {
            let filter = filter_with_kappa(kappa);
            let nominal = ControlCommand::new(50.0, 0.0, 0.0, 0.0);
            assert!(filter.residual(&nominal, 1.0) < 0.0);

            let outcome = filter.filter(&nominal, 1.0);
            assert!(
                matches!(outcome.decision, FilterDecision::Adjusted { .. }),
                "kappa {kappa}: {:?}",
                outcome.decision
            );
            assert!(outcome.command.norm() < nominal.norm(), "kappa {kappa}");
            assert!(filter.residual(&outcome.command, 1.0) >= -1e-5, "kappa {kappa}");
        }
    }

    #[test]
    fn adjusted_command_stays_close_to_nominal_direction() {
        let filter = filter_with_kappa(10.0);
        let nominal = ControlCommand::new(50.0, 0.0, 0.0, 0.0);
        let outcome = filter.filter(&nominal, 1.0);
        // Forward surge is reduced but not reversed.
        assert!(outcome.command.surge > 0.0);
        assert!(outcome.command.surge < 50.0);
        assert!(outcome.command.sway.abs() < 1e-6);
        assert!(outcome.command.yaw.abs() < 1e-6);
    }

    #[test]
    fn violated_margin_falls_back_to_nominal() {
        // h ≤ 0 makes ḣ(T) + κh < 0 for every T.
        let filter = filter_with_kappa(10.0);
        let nominal = ControlCommand::new(50.0, 10.0, -5.0, 2.0);
        let outcome = filter.filter(&nominal, -100.0);
        assert_eq!(outcome.command, nominal);
        assert!(outcome.decision.is_fallback(), "{:?}", outcome.decision);
    }

    #[test]
    fn nan_margin_falls_back_to_nominal() {
        let filter = filter_with_kappa(1.0);
        let nominal = ControlCommand::new(5.0, 0.0, 0.0, 0.0);
        let outcome = filter.filter(&nominal, f64::NAN);
        assert_eq!(outcome.command, nominal);
        assert!(outcome.decision.is_fallback());
    }

    #[test]
    fn failing_backend_yields_nominal_command() {
        let filter = SafetyFilter::with_solver(
            DynamicsModel::new(DynamicsCoefficients::default()),
            1.0,
            Box::new(FailingSolver),
        );
        let nominal = ControlCommand::new(50.0, 0.0, 0.0, 0.0);
        let outcome = filter.filter(&nominal, 1.0);
        assert_eq!(outcome.command, nominal);
        assert_eq!(
            outcome.decision,
            FilterDecision::Fallback(SolverError::MaxIterations(7))
        );
    }

    #[test]
    fn backend_solution_is_emitted() {
        let point = Vector4::new(1.0, 0.0, 2.8, 0.0);
        let filter = SafetyFilter::with_solver(
            DynamicsModel::new(DynamicsCoefficients::default()),
            1.0,
            Box::new(FixedSolver(point)),
        );
        let outcome = filter.filter(&ControlCommand::new(50.0, 0.0, 0.0, 0.0), 1.0);
        assert_eq!(outcome.command, ControlCommand::new(1.0, 0.0, 2.8, 0.0));
        assert_eq!(outcome.decision, FilterDecision::Adjusted { iterations: 3 });
    }

    #[test]
    fn config_rejects_non_positive_kappa() {
        let config = FilterConfig {
            kappa: 0.0,
            ..FilterConfig::default()
        };
        assert!(matches!(config.validate(), Err(NavError::InvalidConfig(_))));
        assert!(FilterConfig::default().validate().is_ok());
    }
}
