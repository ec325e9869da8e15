use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default frame identifier stamped on every filtered command.
pub const DEFAULT_FRAME_ID: &str = "/rexrov2/base_link";

/// A point in 3-D space, expressed in the same frame as the vehicle pose.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance between `self` and `other`.
    pub fn distance_to(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// True when every coordinate is finite (no NaN or infinity).
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Latest vehicle position reported by the localization feed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehiclePose {
    pub position: Point3,
}

impl VehiclePose {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
        }
    }
}

/// Body-frame actuation request: the four modelled degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlCommand {
    /// Surge force along body X (N).
    pub surge: f64,
    /// Sway force along body Y (N).
    pub sway: f64,
    /// Heave force along body Z (N).
    pub heave: f64,
    /// Yaw torque around body Z (N·m).
    pub yaw: f64,
}

impl ControlCommand {
    pub fn new(surge: f64, sway: f64, heave: f64, yaw: f64) -> Self {
        Self {
            surge,
            sway,
            heave,
            yaw,
        }
    }

    /// Euclidean norm of the 4-vector.
    pub fn norm(&self) -> f64 {
        let [a, b, c, d] = self.to_array();
        (a * a + b * b + c * c + d * d).sqrt()
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.surge, self.sway, self.heave, self.yaw]
    }
}

impl From<[f64; 4]> for ControlCommand {
    fn from([surge, sway, heave, yaw]: [f64; 4]) -> Self {
        Self::new(surge, sway, heave, yaw)
    }
}

impl From<ControlCommand> for [f64; 4] {
    fn from(cmd: ControlCommand) -> Self {
        cmd.to_array()
    }
}

/// Force and torque triples of a full 6-DOF wrench.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wrench {
    pub force: [f64; 3],
    pub torque: [f64; 3],
}

impl From<ControlCommand> for Wrench {
    /// Roll and pitch torques are not actuated and are always zero.
    fn from(cmd: ControlCommand) -> Self {
        Self {
            force: [cmd.surge, cmd.sway, cmd.heave],
            torque: [0.0, 0.0, cmd.yaw],
        }
    }
}

/// Filtered command as delivered to the thruster manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedWrench {
    pub stamp: DateTime<Utc>,
    pub frame_id: String,
    pub wrench: Wrench,
}

impl StampedWrench {
    /// Stamp `command` with the current wall-clock time.
    pub fn now(frame_id: impl Into<String>, command: ControlCommand) -> Self {
        Self {
            stamp: Utc::now(),
            frame_id: frame_id.into(),
            wrench: Wrench::from(command),
        }
    }

    /// Recover the 4-DOF command carried by the wrench.
    pub fn command(&self) -> ControlCommand {
        ControlCommand::new(
            self.wrench.force[0],
            self.wrench.force[1],
            self.wrench.force[2],
            self.wrench.torque[2],
        )
    }
}

/// Unified event wrapper for the in-process input feed and event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "navigator-cli::stdin"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh event stamped now.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data carried by an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Pose(VehiclePose),
    /// A batch of obstacle candidates observed since the previous batch.
    PointCloud(Vec<Point3>),
    /// Unfiltered command from the upstream controller.
    NominalCommand(ControlCommand),
    FilteredCommand(StampedWrench),
    /// Warning-level condition that did not stop the control loop.
    SafetyAlert { component: String, message: String },
}

/// Error type spanning configuration, transport and parsing failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Event Bus Channel Error: {0}")]
    Channel(String),

    #[error("Parsing Error: {0}")]
    Parsing(String),
}
