//! `navigator-kernel` – Safety Filtering
//!
//! Sits between the upstream controller and the thrusters.  It does not plan;
//! it only bends each nominal command as little as possible so the predicted
//! decay of the safety margin stays within the allowed rate.
//!
//! # Modules
//!
//! - [`solver`] – [`ConstrainedSolver`][solver::ConstrainedSolver]: the narrow
//!   `solve(problem, seed)` seam, with [`SqpSolver`][solver::SqpSolver] as the
//!   default backend (sequential quadratic programming, damped BFGS,
//!   L1-merit line search, wall-clock budget).
//! - [`safety_filter`] – [`SafetyFilter`][safety_filter::SafetyFilter]: the
//!   control-barrier-function filter.  Minimises `‖T − T_nom‖²` subject to
//!   `ḣ(T) + κ·h ≥ 0` and falls back to the nominal command whenever the
//!   solver cannot certify a solution.

pub mod safety_filter;
pub mod solver;

pub use safety_filter::{FilterConfig, FilterDecision, FilterOutcome, SafetyFilter};
pub use solver::{ConstrainedProblem, ConstrainedSolver, Solution, SolverError, SolverOptions, SqpSolver};
