//! Decoupled nonlinear rigid-body model of the vehicle.
//!
//! For a command `T = (Tx, Ty, Tz, Tψ)` each axis acceleration is
//!
//! ```text
//! u̇ = (Tx + (X_u + X_uu|Tx|)Tx + m·Tψ·Ty − Y_v̇·Tψ·Ty)      / (m − X_u̇)
//! v̇ = (Ty + (Y_v + Y_vv|Ty|)Ty + m·Tψ·Tx + X_u̇·Tψ·Tx)      / (m − Y_v̇)
//! ẇ = (Tz + (Z_w + Z_ww|Tz|)Tz − (m − m·g))                / (m − Z_ẇ)
//! ṙ = (Tψ + (N_r + N_rr|Tψ|)Tψ + (Y_v̇ − X_u̇)·Tx·Ty)        / (I_z − N_ṙ)
//! ```
//!
//! and the margin derivative is `ḣ(T) = −‖a(T)‖²`.
//!
//! The drag and coupling terms are evaluated at the commanded force rather
//! than at the vehicle velocity, so `ḣ` is a heuristic link between control
//! effort and margin decay, not a geometric closing speed.  The safety
//! filter is tuned against exactly this form; changing it changes which
//! commands get attenuated.
//!
//! # Example
//!
//! ```rust
//! use navigator_hal::dynamics::{DynamicsCoefficients, DynamicsModel};
//! use navigator_types::ControlCommand;
//!
//! let model = DynamicsModel::new(DynamicsCoefficients::default());
//! let gentle = model.margin_derivative(&ControlCommand::new(1.0, 0.0, 0.0, 0.0));
//! let hard = model.margin_derivative(&ControlCommand::new(50.0, 0.0, 0.0, 0.0));
//! assert!(hard < gentle);
//! ```

use nalgebra::{Matrix4, Vector4};
use navigator_types::{ControlCommand, NavError};
use serde::{Deserialize, Serialize};

/// Physical constants of the vehicle.  Defaults describe the RexROV 2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsCoefficients {
    /// Rigid-body mass m (kg).
    pub mass: f64,
    /// Moment of inertia around the vertical axis I_z (kg·m²).
    pub yaw_inertia: f64,
    /// Added mass X_u̇.
    pub added_mass_surge: f64,
    /// Added mass Y_v̇.
    pub added_mass_sway: f64,
    /// Added mass Z_ẇ.
    pub added_mass_heave: f64,
    /// Added inertia N_ṙ.
    pub added_mass_yaw: f64,
    /// Linear drag X_u.
    pub linear_drag_surge: f64,
    /// Linear drag Y_v.
    pub linear_drag_sway: f64,
    /// Linear drag Z_w.
    pub linear_drag_heave: f64,
    /// Linear drag N_r.
    pub linear_drag_yaw: f64,
    /// Quadratic drag X_uu.
    pub quadratic_drag_surge: f64,
    /// Quadratic drag Y_vv.
    pub quadratic_drag_sway: f64,
    /// Quadratic drag Z_ww.
    pub quadratic_drag_heave: f64,
    /// Quadratic drag N_rr.
    pub quadratic_drag_yaw: f64,
    /// Gravitational acceleration g (m/s²) used in the heave restoring term.
    pub gravity: f64,
}

impl Default for DynamicsCoefficients {
    fn default() -> Self {
        Self {
            mass: 1863.0,
            yaw_inertia: 691.23,
            added_mass_surge: 779.79,
            added_mass_sway: 1222.0,
            added_mass_heave: 3959.9,
            added_mass_yaw: 224.32,
            linear_drag_surge: -74.82,
            linear_drag_sway: -69.48,
            linear_drag_heave: -782.4,
            linear_drag_yaw: -105.0,
            quadratic_drag_surge: -748.22,
            quadratic_drag_sway: -992.53,
            quadratic_drag_heave: -1821.01,
            quadratic_drag_yaw: -523.27,
            gravity: 9.81,
        }
    }
}

impl DynamicsCoefficients {
    /// Reject non-finite constants and axes whose effective inertia is zero.
    pub fn validate(&self) -> Result<(), NavError> {
        let all = [
            ("mass", self.mass),
            ("yaw_inertia", self.yaw_inertia),
            ("added_mass_surge", self.added_mass_surge),
            ("added_mass_sway", self.added_mass_sway),
            ("added_mass_heave", self.added_mass_heave),
            ("added_mass_yaw", self.added_mass_yaw),
            ("linear_drag_surge", self.linear_drag_surge),
            ("linear_drag_sway", self.linear_drag_sway),
            ("linear_drag_heave", self.linear_drag_heave),
            ("linear_drag_yaw", self.linear_drag_yaw),
            ("quadratic_drag_surge", self.quadratic_drag_surge),
            ("quadratic_drag_sway", self.quadratic_drag_sway),
            ("quadratic_drag_heave", self.quadratic_drag_heave),
            ("quadratic_drag_yaw", self.quadratic_drag_yaw),
            ("gravity", self.gravity),
        ];
        if let Some((name, value)) = all.iter().find(|(_, v)| !v.is_finite()) {
            return Err(NavError::InvalidConfig(format!(
                "dynamics coefficient {name} must be finite, got {value}"
            )));
        }

        let [du, dv, dw, dr] = self.effective_inertia();
        for (axis, d) in [("surge", du), ("sway", dv), ("heave", dw), ("yaw", dr)] {
            if d.abs() < f64::EPSILON {
                return Err(NavError::InvalidConfig(format!(
                    "effective inertia on the {axis} axis is zero"
                )));
            }
        }
        Ok(())
    }

    /// Per-axis denominators: mass (or inertia) minus added mass.
    fn effective_inertia(&self) -> [f64; 4] {
        [
            self.mass - self.added_mass_surge,
            self.mass - self.added_mass_sway,
            self.mass - self.added_mass_heave,
            self.yaw_inertia - self.added_mass_yaw,
        ]
    }
}

/// Pure function of the command and the fixed coefficients; holds no state.
#[derive(Debug, Clone)]
pub struct DynamicsModel {
    coefficients: DynamicsCoefficients,
}

impl DynamicsModel {
    pub fn new(coefficients: DynamicsCoefficients) -> Self {
        Self { coefficients }
    }

    /// Axis accelerations `(u̇, v̇, ẇ, ṙ)` predicted for `command`.
    pub fn accelerations(&self, command: &ControlCommand) -> Vector4<f64> {
        self.accelerations_at(&Vector4::from(command.to_array()))
    }

    /// [`accelerations`][Self::accelerations] over a raw 4-vector.
    pub fn accelerations_at(&self, t: &Vector4<f64>) -> Vector4<f64> {
        let c = &self.coefficients;
        let (tx, ty, tz, tpsi) = (t[0], t[1], t[2], t[3]);
        let [du, dv, dw, dr] = c.effective_inertia();

        let u_dot = (tx
            + (c.linear_drag_surge + c.quadratic_drag_surge * tx.abs()) * tx
            + c.mass * tpsi * ty
            - c.added_mass_sway * tpsi * ty)
            / du;
        let v_dot = (ty
            + (c.linear_drag_sway + c.quadratic_drag_sway * ty.abs()) * ty
            + c.mass * tpsi * tx
            + c.added_mass_surge * tpsi * tx)
            / dv;
        let w_dot = (tz + (c.linear_drag_heave + c.quadratic_drag_heave * tz.abs()) * tz
            - (c.mass - c.mass * c.gravity))
            / dw;
        let r_dot = (tpsi
            + (c.linear_drag_yaw + c.quadratic_drag_yaw * tpsi.abs()) * tpsi
            + (c.added_mass_sway - c.added_mass_surge) * tx * ty)
            / dr;

        Vector4::new(u_dot, v_dot, w_dot, r_dot)
    }

    /// Jacobian `∂a/∂T` of the accelerations; row `i` is axis `i`.
    ///
    /// `d(|x|·x)/dx = 2|x|`, so the quadratic drag terms stay continuous.
    pub fn acceleration_jacobian(&self, t: &Vector4<f64>) -> Matrix4<f64> {
        let c = &self.coefficients;
        let (tx, ty, tz, tpsi) = (t[0], t[1], t[2], t[3]);
        let [du, dv, dw, dr] = c.effective_inertia();

        let sway_coupling = c.mass - c.added_mass_sway;
        let surge_coupling = c.mass + c.added_mass_surge;
        let yaw_coupling = c.added_mass_sway - c.added_mass_surge;

        Matrix4::new(
            // u̇
            (1.0 + c.linear_drag_surge + 2.0 * c.quadratic_drag_surge * tx.abs()) / du,
            sway_coupling * tpsi / du,
            0.0,
            sway_coupling * ty / du,
            // v̇
            surge_coupling * tpsi / dv,
            (1.0 + c.linear_drag_sway + 2.0 * c.quadratic_drag_sway * ty.abs()) / dv,
            0.0,
            surge_coupling * tx / dv,
            // ẇ
            0.0,
            0.0,
            (1.0 + c.linear_drag_heave + 2.0 * c.quadratic_drag_heave * tz.abs()) / dw,
            0.0,
            // ṙ
            yaw_coupling * ty / dr,
            yaw_coupling * tx / dr,
            0.0,
            (1.0 + c.linear_drag_yaw + 2.0 * c.quadratic_drag_yaw * tpsi.abs()) / dr,
        )
    }

    /// Margin derivative `ḣ(T) = −‖a(T)‖²`.  Never positive.
    pub fn margin_derivative(&self, command: &ControlCommand) -> f64 {
        self.margin_derivative_at(&Vector4::from(command.to_array()))
    }

    /// [`margin_derivative`][Self::margin_derivative] over a raw 4-vector.
    pub fn margin_derivative_at(&self, t: &Vector4<f64>) -> f64 {
        -self.accelerations_at(t).norm_squared()
    }

    /// Analytic gradient `∇ḣ = −2·Jᵀa`.
    pub fn margin_derivative_gradient(&self, t: &Vector4<f64>) -> Vector4<f64> {
        let a = self.accelerations_at(t);
        let j = self.acceleration_jacobian(t);
        -2.0 * j.transpose() * a
    }
}
