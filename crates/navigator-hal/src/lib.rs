//! `navigator-hal` – vehicle model.
//!
//! Describes how the vehicle responds to thrust so the safety filter can
//! predict how fast a candidate command erodes the safety margin.
//!
//! # Modules
//!
//! - [`dynamics`] – [`DynamicsModel`][dynamics::DynamicsModel]: decoupled
//!   nonlinear rigid-body model over surge, sway, heave and yaw, configured by
//!   [`DynamicsCoefficients`][dynamics::DynamicsCoefficients].

pub mod dynamics;

pub use dynamics::{DynamicsCoefficients, DynamicsModel};
