use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use wasa_types::events::PushEvent;

use crate::registry::ConnectionRegistry;

/// Outcome of delivering one event to one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Offline,
    Dropped,
}

/// Tally of a finished fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Targets with no live connection
    pub offline: usize,
    /// Targets whose connection turned out dead and was released
    pub dropped: usize,
}

/// Per-recipient delivery tasks of one `fan_out` call.
#[must_use = "dropping a FanOut detaches its tasks; use Broadcaster::notify for fire-and-forget"]
pub struct FanOut {
    tasks: Vec<JoinHandle<Delivery>>,
}

impl FanOut {
    fn empty() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Wait for every delivery attempt to finish.
    pub async fn join(self) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for task in self.tasks {
            match task.await {
                Ok(Delivery::Delivered) => report.delivered += 1,
                Ok(Delivery::Offline) => report.offline += 1,
                Ok(Delivery::Dropped) => report.dropped += 1,
                Err(e) => warn!("Delivery task failed: {}", e),
            }
        }
        report
    }
}

/// Pushes events to whichever of the targeted users are connected.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Best-effort push of `event` to every user in `user_ids`. Returns
    /// immediately; nothing about individual deliveries reaches the caller.
    pub fn notify<I, S>(&self, user_ids: I, event: &PushEvent)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // Detached: the tasks keep running after the handles drop.
        let _ = self.fan_out(user_ids, event);
    }

    /// Same as `notify`, but hands back the delivery tasks so the caller
    /// can wait for them.
    pub fn fan_out<I, S>(&self, user_ids: I, event: &PushEvent) -> FanOut
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frame: Arc<str> = match event.to_frame() {
            Ok(text) => text.into(),
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.name(), e);
                return FanOut::empty();
            }
        };

        let mut seen = HashSet::new();
        let targets: Vec<String> = user_ids
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| seen.insert(id.clone()))
            .collect();

        trace!("Fanning out {} to {} user(s)", event.name(), targets.len());

        let name = event.name();
        let tasks = targets
            .into_iter()
            .map(|user_id| {
                let registry = self.registry.clone();
                let frame = frame.clone();
                tokio::spawn(async move { deliver(&registry, &user_id, frame, name).await })
            })
            .collect();

        FanOut { tasks }
    }
}

async fn deliver(registry: &ConnectionRegistry, user_id: &str, frame: Arc<str>, name: &str) -> Delivery {
    let Some(handle) = registry.get(user_id).await else {
        return Delivery::Offline;
    };

    if handle.send(frame) {
        trace!("Queued {} for {}", name, user_id);
        return Delivery::Delivered;
    }

    debug!("Connection {} for {} is gone, releasing it", handle.conn_id(), user_id);
    registry.release(user_id, handle.conn_id()).await;
    Delivery::Dropped
}
