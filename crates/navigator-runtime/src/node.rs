//! [`SafetyNode`] – the async actor around a [`ControlCycle`].
//!
//! Pose updates, point batches and nominal commands arrive on one ordered
//! [`InputReceiver`] and are handled strictly in send order, one at a time,
//! so pose and point updates never interleave with a filter run.  A command
//! therefore sees exactly the poses and point batches sent before it.
//!
//! Output goes to [`Topic::FilteredCommand`] (one event per nominal command)
//! and [`Topic::SystemAlerts`] (fallback escalations) on the event bus.
//!
//! The node stops once every [`InputSender`][navigator_middleware::InputSender]
//! has been dropped and the feed is drained.
//!
//! # Example
//!
//! ```rust,no_run
//! use navigator_middleware::{EventBus, input_channel};
//! use navigator_runtime::control_cycle::{ControlCycle, ControlCycleConfig};
//! use navigator_runtime::node::SafetyNode;
//!
//! # async fn run() -> Result<(), navigator_types::NavError> {
//! let bus = EventBus::default();
//! let (feed_tx, feed_rx) = input_channel(64);
//! let cycle = ControlCycle::new(ControlCycleConfig::default())?;
//! let node = tokio::spawn(SafetyNode::new(cycle, feed_rx, &bus).run());
//!
//! // ... send pose / point / command events through `feed_tx` ...
//! drop(feed_tx);
//! let _cycle = node.await;
//! # Ok(())
//! # }
//! ```

use navigator_middleware::{EventBus, InputReceiver, Topic};
use navigator_types::{Event, EventPayload};
use tracing::{debug, info, warn};

use crate::control_cycle::ControlCycle;

/// `source` field of every event the node publishes.
pub const NODE_SOURCE: &str = "navigator::safety_node";

/// Async actor that drives a [`ControlCycle`] from an ordered input feed.
pub struct SafetyNode {
    cycle: ControlCycle,
    feed: InputReceiver,
    bus: EventBus,
}

impl SafetyNode {
    pub fn new(cycle: ControlCycle, feed: InputReceiver, bus: &EventBus) -> Self {
        Self {
            cycle,
            feed,
            bus: bus.clone(),
        }
    }

    /// Process events until the feed is closed and drained.
    ///
    /// Returns the control context so callers can inspect the final state.
    pub async fn run(mut self) -> ControlCycle {
        info!("safety node running");
        let mut handled = 0usize;
        while let Some(event) = self.feed.recv().await {
            self.handle(event);
            handled += 1;
        }
        info!(handled, "safety node stopped");
        self.cycle
    }

    fn handle(&mut self, event: Event) {
        match event.payload {
            EventPayload::Pose(pose) => self.cycle.on_pose(pose),
            EventPayload::PointCloud(points) => {
                self.cycle.on_point_cloud(&points);
            }
            EventPayload::NominalCommand(nominal) => {
                let report = self.cycle.on_nominal_command(nominal);
                if let Some(message) = report.alert {
                    self.publish(
                        Topic::SystemAlerts,
                        EventPayload::SafetyAlert {
                            component: "safety_filter".into(),
                            message,
                        },
                    );
                }
                self.publish(Topic::FilteredCommand, EventPayload::FilteredCommand(report.wrench));
            }
            other @ (EventPayload::FilteredCommand(_) | EventPayload::SafetyAlert { .. }) => {
                warn!(source = %event.source, payload = ?other, "output payload on input feed ignored");
            }
        }
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Err(e) = self.bus.publish_to(topic, Event::new(NODE_SOURCE, payload)) {
            debug!(?topic, error = %e, "output dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use navigator_kernel::{FilterConfig, SolverOptions};
    use navigator_middleware::{InputSender, TopicReceiver, input_channel};
    use navigator_types::{ControlCommand, Point3, StampedWrench, VehiclePose};
    use tokio::task::JoinHandle;

    use crate::control_cycle::ControlCycleConfig;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> ControlCycleConfig {
        ControlCycleConfig {
            filter: FilterConfig {
                kappa: 1.0,
                solver: SolverOptions {
                    time_budget_ms: 1_000,
                    ..SolverOptions::default()
                },
            },
            fallback_alert_threshold: 2,
            ..ControlCycleConfig::default()
        }
    }

    fn spawn_node(bus: &EventBus) -> (InputSender, JoinHandle<ControlCycle>) {
        let (tx, rx) = input_channel(64);
        let node = SafetyNode::new(ControlCycle::new(config()).unwrap(), rx, bus);
        (tx, tokio::spawn(node.run()))
    }

    async fn send(tx: &InputSender, payload: EventPayload) {
        tx.send(Event::new("test::feed", payload)).await.unwrap();
    }

    async fn next_wrench(rx: &mut TopicReceiver) -> StampedWrench {
        let event = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.source, NODE_SOURCE);
        match event.payload {
            EventPayload::FilteredCommand(wrench) => wrench,
            other => panic!("expected FilteredCommand, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_filtered_command_per_nominal_command() {
        let bus = EventBus::default();
        let mut out = bus.subscribe_to(Topic::FilteredCommand);
        let (tx, handle) = spawn_node(&bus);

        let nominal = ControlCommand::new(5.0, 1.0, 0.0, 0.0);
        send(&tx, EventPayload::NominalCommand(nominal)).await;
        send(&tx, EventPayload::NominalCommand(nominal)).await;

        assert_eq!(next_wrench(&mut out).await.command(), nominal);
        assert_eq!(next_wrench(&mut out).await.command(), nominal);

        drop(tx);
        let cycle = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(cycle.safety_margin(), f64::INFINITY);
    }

    /// A later pose must not be applied before a point batch sent earlier:
    /// the margin comes from the pose at the origin, and the command that
    /// follows is attenuated.
    #[tokio::test]
    async fn inputs_are_handled_in_send_order() {
        let bus = EventBus::default();
        let mut out = bus.subscribe_to(Topic::FilteredCommand);
        let (tx, handle) = spawn_node(&bus);

        send(&tx, EventPayload::Pose(VehiclePose::new(0.0, 0.0, 0.0))).await;
        send(&tx, EventPayload::PointCloud(vec![Point3::new(2.0, 0.0, 0.0)])).await;
        send(&tx, EventPayload::Pose(VehiclePose::new(100.0, 0.0, 0.0))).await;
        let nominal = ControlCommand::new(50.0, 0.0, 0.0, 0.0);
        send(&tx, EventPayload::NominalCommand(nominal)).await;

        let filtered = next_wrench(&mut out).await.command();
        assert!(filtered.norm() < nominal.norm(), "{filtered:?} not attenuated");

        drop(tx);
        let cycle = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!((cycle.safety_margin() - 1.0).abs() < 1e-12);
        assert_eq!(cycle.tracker().pose().map(|p| p.position.x), Some(100.0));
    }

    #[tokio::test]
    async fn repeated_fallback_raises_alert() {
        let bus = EventBus::default();
        let mut out = bus.subscribe_to(Topic::FilteredCommand);
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let (tx, handle) = spawn_node(&bus);

        send(&tx, EventPayload::Pose(VehiclePose::new(0.0, 0.0, 0.0))).await;
        send(&tx, EventPayload::PointCloud(vec![Point3::new(0.5, 0.0, 0.0)])).await;
        let nominal = ControlCommand::new(20.0, 0.0, 0.0, 0.0);
        send(&tx, EventPayload::NominalCommand(nominal)).await;
        send(&tx, EventPayload::NominalCommand(nominal)).await;

        assert_eq!(next_wrench(&mut out).await.command(), nominal);
        assert_eq!(next_wrench(&mut out).await.command(), nominal);

        let alert = tokio::time::timeout(WAIT, alerts.recv()).await.unwrap().unwrap();
        assert!(matches!(
            alert.payload,
            EventPayload::SafetyAlert { ref component, .. } if component == "safety_filter"
        ));

        drop(tx);
        tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn output_payload_on_feed_is_ignored() {
        let bus = EventBus::default();
        let mut out = bus.subscribe_to(Topic::FilteredCommand);
        let (tx, handle) = spawn_node(&bus);

        let echoed = StampedWrench::now("test/base_link", ControlCommand::new(1.0, 0.0, 0.0, 0.0));
        send(&tx, EventPayload::FilteredCommand(echoed)).await;
        send(
            &tx,
            EventPayload::SafetyAlert {
                component: "test".into(),
                message: "echo".into(),
            },
        )
        .await;

        let result = tokio::time::timeout(Duration::from_millis(100), out.recv()).await;
        assert!(result.is_err(), "no filtered command expected");

        drop(tx);
        let cycle = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(cycle.tracker().pose().is_none());
        assert_eq!(cycle.fallback_streak(), 0);
    }

    #[tokio::test]
    async fn node_drains_feed_and_stops_when_senders_drop() {
        let bus = EventBus::default();
        let mut out = bus.subscribe_to(Topic::FilteredCommand);
        let (tx, handle) = spawn_node(&bus);

        let nominal = ControlCommand::new(3.0, 0.0, 0.0, 0.0);
        for i in 0..8 {
            send(&tx, EventPayload::Pose(VehiclePose::new(f64::from(i), 0.0, 0.0))).await;
        }
        send(&tx, EventPayload::NominalCommand(nominal)).await;
        drop(tx);

        // Queued events are still processed after the last sender is gone.
        assert_eq!(next_wrench(&mut out).await.command(), nominal);
        let cycle = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(cycle.tracker().pose().map(|p| p.position.x), Some(7.0));
    }
}
