//! Newline-delimited JSON feed format read from stdin.
//!
//! One message per line, tagged by `type`:
//!
//! ```text
//! {"type":"pose","x":0.0,"y":0.0,"z":-5.0}
//! {"type":"point_cloud","points":[{"x":2.0,"y":0.0,"z":-5.0}]}
//! {"type":"command","surge":50.0,"sway":0.0,"heave":0.0,"yaw":0.0}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use navigator_types::{ControlCommand, EventPayload, NavError, Point3, VehiclePose};
use serde::{Deserialize, Serialize};

/// A single input message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Pose { x: f64, y: f64, z: f64 },
    PointCloud {
        #[serde(default)]
        points: Vec<Point3>,
    },
    Command(ControlCommand),
}

impl FeedMessage {
    /// `true` for messages that trigger a control cycle and therefore yield
    /// one filtered command.
    pub fn is_command(&self) -> bool {
        matches!(self, FeedMessage::Command(_))
    }

    /// The payload this message is fed to the safety node as.
    pub fn into_payload(self) -> EventPayload {
        match self {
            FeedMessage::Pose { x, y, z } => EventPayload::Pose(VehiclePose::new(x, y, z)),
            FeedMessage::PointCloud { points } => EventPayload::PointCloud(points),
            FeedMessage::Command(command) => EventPayload::NominalCommand(command),
        }
    }
}

/// Parse one input line.  Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<FeedMessage>, NavError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| NavError::Parsing(format!("invalid feed message: {e}")))
}
