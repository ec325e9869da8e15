//! `navigator-runtime` – The Control Loop
//!
//! Wires perception, dynamics and the safety filter into one control context
//! and runs it between the ordered input feed and the output bus.
//!
//! # Modules
//!
//! - [`control_cycle`] – [`ControlCycle`][control_cycle::ControlCycle]: the
//!   explicit per-vehicle context.  Pose and point handlers update the
//!   safety margin; each nominal command yields exactly one filtered,
//!   stamped command.
//! - [`fallback_guard`] – [`FallbackGuard`][fallback_guard::FallbackGuard]:
//!   escalates a run of consecutive solver fallbacks to an alert.
//! - [`node`] – [`SafetyNode`][node::SafetyNode]: async actor that feeds the
//!   control cycle from the input channel one event at a time, in send order,
//!   and publishes the results on the bus.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with optional OTLP span export.

pub mod control_cycle;
pub mod fallback_guard;
pub mod node;
pub mod telemetry;

pub use control_cycle::{ControlCycle, ControlCycleConfig, CycleReport};
pub use fallback_guard::FallbackGuard;
pub use node::SafetyNode;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
