//! `navigator-middleware` – The Nervous System
//!
//! Moves events between producers and the safety node without caring about
//! the data's meaning: the three input feeds (pose, point data, nominal
//! commands) travel on one ordered channel, the node's outputs on a
//! broadcast bus.
//!
//! # Modules
//!
//! - [`input`] – Ordered, bounded single-consumer input feed built on a Tokio
//!   mpsc channel.
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;
pub mod input;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use input::{InputReceiver, InputSender, input_channel};
