//! Constrained nonlinear optimisation over 4-D commands.
//!
//! [`ConstrainedSolver`] is the seam between the safety filter and the
//! numerical backend: any solver that can minimise a smooth objective
//! subject to one smooth inequality `c(x) ≥ 0` can be plugged in.
//!
//! [`SqpSolver`] is the built-in backend.  Each iteration solves the local
//! quadratic model
//!
//! ```text
//! min  ∇fᵀd + ½ dᵀB d    s.t.  c + ∇cᵀd ≥ 0
//! ```
//!
//! in closed form (one constraint), backtracks on the L1 merit function
//! `f + μ·max(0, −c)` and refreshes `B` with a Powell-damped BFGS update of
//! the Lagrangian gradient.  The solve is abandoned when the wall-clock budget
//! runs out, so callers can always fall back in time.

use std::time::{Duration, Instant};

use nalgebra::linalg::Cholesky;
use nalgebra::{Matrix4, U4, Vector4};
use navigator_types::NavError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Armijo sufficient-decrease coefficient.
const ARMIJO: f64 = 1e-4;
/// Smallest line-search step before giving up.
const MIN_STEP: f64 = 1e-10;
/// Powell damping threshold for the BFGS update.
const DAMPING: f64 = 0.2;

// ────────────────────────────────────────────────────────────────────────────
// Problem / solver traits
// ────────────────────────────────────────────────────────────────────────────

/// A smooth objective with one inequality constraint `constraint(x) ≥ 0`.
///
/// Gradients default to central finite differences; override them when an
/// analytic form is available.
pub trait ConstrainedProblem {
    fn objective(&self, x: &Vector4<f64>) -> f64;

    /// Feasible when the returned value is non-negative.
    fn constraint(&self, x: &Vector4<f64>) -> f64;

    fn objective_gradient(&self, x: &Vector4<f64>) -> Vector4<f64> {
        central_difference(|y| self.objective(y), x)
    }

    fn constraint_gradient(&self, x: &Vector4<f64>) -> Vector4<f64> {
        central_difference(|y| self.constraint(y), x)
    }
}

/// Minimises a [`ConstrainedProblem`] starting from `seed`.
pub trait ConstrainedSolver: Send + Sync {
    fn solve(
        &self,
        problem: &dyn ConstrainedProblem,
        seed: &Vector4<f64>,
    ) -> Result<Solution, SolverError>;
}

/// A converged, feasible point.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub x: Vector4<f64>,
    pub objective: f64,
    pub constraint: f64,
    /// Number of steps taken; `0` means the seed was already optimal.
    pub iterations: usize,
}

/// Why a solve did not produce a certified solution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("linearised constraint cannot be satisfied (iteration {iterations})")]
    IncompatibleConstraint { iterations: usize },

    #[error("line search failed to reduce the merit function (iteration {iterations})")]
    LineSearchFailed { iterations: usize },

    #[error("no convergence within {0} iterations")]
    MaxIterations(usize),

    #[error("time budget of {budget:?} exceeded after {iterations} iterations")]
    DeadlineExceeded { budget: Duration, iterations: usize },

    #[error("non-finite value encountered (iteration {iterations})")]
    NonFinite { iterations: usize },
}

// ────────────────────────────────────────────────────────────────────────────
// Options
// ────────────────────────────────────────────────────────────────────────────

/// Tuning knobs for [`SqpSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Converged when the step norm is below `step_tolerance · (1 + ‖x‖)`.
    pub step_tolerance: f64,
    /// Largest accepted constraint violation at convergence.
    pub constraint_tolerance: f64,
    /// Wall-clock budget for a single solve, in milliseconds.
    pub time_budget_ms: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            step_tolerance: 1e-6,
            constraint_tolerance: 1e-5,
            time_budget_ms: 20,
        }
    }
}

impl SolverOptions {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn validate(&self) -> Result<(), NavError> {
        if self.max_iterations == 0 {
            return Err(NavError::InvalidConfig(
                "solver max_iterations must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("step_tolerance", self.step_tolerance),
            ("constraint_tolerance", self.constraint_tolerance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(NavError::InvalidConfig(format!(
                    "solver {name} must be positive and finite, got {value}"
                )));
            }
        }
        if self.time_budget_ms == 0 {
            return Err(NavError::InvalidConfig(
                "solver time_budget_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SqpSolver
// ────────────────────────────────────────────────────────────────────────────

/// Sequential quadratic programming backend.
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    options: SolverOptions,
}

impl SqpSolver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }
}

impl ConstrainedSolver for SqpSolver {
    #[instrument(
        name = "sqp_solve",
        skip_all,
        fields(max_iterations = self.options.max_iterations, budget_ms = self.options.time_budget_ms)
    )]
    fn solve(
        &self,
        problem: &dyn ConstrainedProblem,
        seed: &Vector4<f64>,
    ) -> Result<Solution, SolverError> {
        let started = Instant::now();
        let budget = self.options.time_budget();

        let mut x = *seed;
        let mut hessian = Matrix4::<f64>::identity();
        let mut penalty = 0.0_f64;

        for iterations in 0..self.options.max_iterations {
            if started.elapsed() >= budget {
                return Err(SolverError::DeadlineExceeded { budget, iterations });
            }

            let f = problem.objective(&x);
            let c = problem.constraint(&x);
            let grad_f = problem.objective_gradient(&x);
            let grad_c = problem.constraint_gradient(&x);
            if !(f.is_finite() && c.is_finite() && all_finite(&grad_f) && all_finite(&grad_c)) {
                return Err(SolverError::NonFinite { iterations });
            }

            let factor = match hessian.cholesky() {
                Some(factor) => factor,
                None => {
                    hessian = Matrix4::identity();
                    hessian
                        .cholesky()
                        .ok_or(SolverError::NonFinite { iterations })?
                }
            };
            let step = qp_step(&factor, &grad_f, c, &grad_c)
                .ok_or(SolverError::IncompatibleConstraint { iterations })?;

            let tolerance = self.options.step_tolerance * (1.0 + x.norm());
            if step.direction.norm() <= tolerance && c >= -self.options.constraint_tolerance {
                return Ok(Solution {
                    x,
                    objective: f,
                    constraint: c,
                    iterations,
                });
            }

            if step.multiplier > penalty {
                penalty = 1.5 * step.multiplier + 1e-8;
            }
            let merit = |y: &Vector4<f64>| {
                problem.objective(y) + penalty * (-problem.constraint(y)).max(0.0)
            };
            let merit_here = f + penalty * (-c).max(0.0);
            let slope = grad_f.dot(&step.direction) - penalty * (-c).max(0.0);

            let mut alpha = 1.0;
            let candidate = loop {
                let candidate = x + alpha * step.direction;
                if merit(&candidate) <= merit_here + ARMIJO * alpha * slope {
                    break candidate;
                }
                alpha *= 0.5;
                if alpha < MIN_STEP {
                    return Err(SolverError::LineSearchFailed { iterations });
                }
            };

            let lagrangian_grad =
                |g_f: &Vector4<f64>, g_c: &Vector4<f64>| *g_f - *g_c * step.multiplier;
            let s = candidate - x;
            let y = lagrangian_grad(
                &problem.objective_gradient(&candidate),
                &problem.constraint_gradient(&candidate),
            ) - lagrangian_grad(&grad_f, &grad_c);
            damped_bfgs_update(&mut hessian, &s, &y);

            debug!(
                iteration = iterations,
                constraint = c,
                step = alpha,
                multiplier = step.multiplier,
                "sqp iteration"
            );
            x = candidate;
        }

        Err(SolverError::MaxIterations(self.options.max_iterations))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

struct QpStep {
    direction: Vector4<f64>,
    multiplier: f64,
}

/// Closed-form solution of the single-constraint QP subproblem.
///
/// Returns `None` when the linearised constraint is violated and its
/// gradient vanishes, i.e. no step can restore feasibility.
fn qp_step(
    factor: &Cholesky<f64, U4>,
    grad_f: &Vector4<f64>,
    c: f64,
    grad_c: &Vector4<f64>,
) -> Option<QpStep> {
    let unconstrained = -factor.solve(grad_f);
    let linearised = c + grad_c.dot(&unconstrained);
    if linearised >= 0.0 {
        return Some(QpStep {
            direction: unconstrained,
            multiplier: 0.0,
        });
    }

    let scaled = factor.solve(grad_c);
    let curvature = grad_c.dot(&scaled);
    if !(curvature > f64::EPSILON) {
        return None;
    }
    let multiplier = -linearised / curvature;
    Some(QpStep {
        direction: unconstrained + multiplier * scaled,
        multiplier,
    })
}

/// BFGS update with Powell damping so `hessian` stays positive definite.
fn damped_bfgs_update(hessian: &mut Matrix4<f64>, s: &Vector4<f64>, y: &Vector4<f64>) {
    let bs = *hessian * s;
    let sbs = s.dot(&bs);
    if !(sbs > 0.0) || !sbs.is_finite() {
        return;
    }

    let mut y = *y;
    let mut sy = s.dot(&y);
    if sy < DAMPING * sbs {
        let theta = (1.0 - DAMPING) * sbs / (sbs - sy);
        y = theta * y + (1.0 - theta) * bs;
        sy = s.dot(&y);
    }
    if !(sy > 0.0) || !sy.is_finite() {
        return;
    }

    *hessian += (y * y.transpose()) / sy - (bs * bs.transpose()) / sbs;
}

fn all_finite(v: &Vector4<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Central finite-difference gradient of `f` at `x`.
pub fn central_difference(f: impl Fn(&Vector4<f64>) -> f64, x: &Vector4<f64>) -> Vector4<f64> {
    let mut grad = Vector4::zeros();
    for i in 0..4 {
        let h = 1e-6 * x[i].abs().max(1.0);
        let mut plus = *x;
        let mut minus = *x;
        plus[i] += h;
        minus[i] -= h;
        grad[i] = (f(&plus) - f(&minus)) / (2.0 * h);
    }
    grad
}
