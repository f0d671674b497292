//! Typed events with synchronous and asynchronous fan-out to per-event-type
//! listeners.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub source: String,
    pub data: HashMap<String, Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event {
    #[must_use]
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            data: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// A per-event-type subscriber. Listener panics/errors are caught at the
/// fan-out site and logged; they never abort the rest of the fan-out.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EventBusStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub total_listener_errors: u64,
}

/// In-process event bus. `publish_sync` fans out on the caller's own stack;
/// `publish_async` detaches one task per listener on the shared Tokio
/// runtime (see SPEC_FULL.md's "daemon worker pool" resolution).
pub struct EventBus {
    listeners: DashMap<String, Vec<Arc<dyn EventListener>>>,
    stats: parking_lot::Mutex<EventBusStats>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.listeners.len())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            stats: parking_lot::Mutex::new(EventBusStats::default()),
        }
    }

    pub fn subscribe(&self, event_type: impl Into<String>, listener: Arc<dyn EventListener>) {
        self.listeners.entry(event_type.into()).or_default().push(listener);
    }

    #[must_use]
    pub fn stats(&self) -> EventBusStats {
        self.stats.lock().clone()
    }

    pub fn publish_sync(&self, event: Event) {
        self.stats.lock().total_published += 1;
        let Some(listeners) = self.listeners.get(&event.event_type) else {
            return;
        };
        for listener in listeners.iter() {
            match listener.on_event(&event) {
                Ok(()) => self.stats.lock().total_delivered += 1,
                Err(err) => {
                    self.stats.lock().total_listener_errors += 1;
                    tracing::warn!(event_type = %event.event_type, error = %err, "event listener failed");
                }
            }
        }
    }

    pub fn publish_async(self: &Arc<Self>, event: Event) {
        self.stats.lock().total_published += 1;
        let Some(listeners) = self.listeners.get(&event.event_type) else {
            return;
        };
        for listener in listeners.iter().cloned() {
            let bus = Arc::clone(self);
            let event = event.clone();
            tokio::spawn(async move {
                match listener.on_event(&event) {
                    Ok(()) => bus.stats.lock().total_delivered += 1,
                    Err(err) => {
                        bus.stats.lock().total_listener_errors += 1;
                        tracing::warn!(event_type = %event.event_type, error = %err, "async event listener failed");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn sync_fanout_isolates_listener_errors() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_a = Arc::clone(&calls);
        bus.subscribe(
            "thing.changed",
            Arc::new(move |_event: &Event| -> anyhow::Result<()> {
                calls_a.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("listener A always fails"))
            }),
        );
        let calls_b = Arc::clone(&calls);
        bus.subscribe(
            "thing.changed",
            Arc::new(move |_event: &Event| -> anyhow::Result<()> {
                calls_b.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        bus.publish_sync(Event::new("thing.changed", "test"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stats = bus.stats();
        assert_eq!(stats.total_delivered, 1);
        assert_eq!(stats.total_listener_errors, 1);
    }

    #[test]
    fn unregistered_event_type_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish_sync(Event::new("nobody.listens", "test"));
        assert_eq!(bus.stats().total_published, 1);
        assert_eq!(bus.stats().total_delivered, 0);
    }
}
