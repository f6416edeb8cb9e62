//! Push channel: who is connected, and how events reach them.

pub mod connection;
pub mod dispatcher;
pub mod registry;

pub use dispatcher::{Broadcaster, DeliveryReport, FanOut};
pub use registry::{ConnectionHandle, ConnectionRegistry, Outbound};
