//! In-process event bus: synchronous publish to registered subscribers,
//! bounded replay log.
//!
//! Grounded on `examples/original_source/kafka_event_bus.py`'s `EventBus`:
//! per-subscriber dispatch in registration order, a subscriber panic is
//! caught and counted rather than propagated, and the log is truncated once
//! it exceeds 10,000 entries (keeping the most recent half).

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, error};

use crate::types::{Event, LoggedEvent, TruckId};

const MAX_LOG_ENTRIES: usize = 10_000;
const TRUNCATE_TO: usize = 5_000;

type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

struct SubscriberSlot {
    handler: Subscriber,
    failures: AtomicU64,
}

/// Local event bus. `subscribe`/`publish` are synchronous; subscribers run
/// in-line on the publishing task, matching the original's
/// staging-environment mockup of Kafka (dispatch is the caller's problem,
/// not an async broker's).
pub struct EventBus {
    subscribers: Mutex<Vec<SubscriberSlot>>,
    log: Mutex<Vec<LoggedEvent>>,
    published_count: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            published_count: AtomicU64::new(0),
        }
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(SubscriberSlot {
            handler: Box::new(handler),
            failures: AtomicU64::new(0),
        });
        debug!("event bus: subscriber registered");
    }

    pub fn publish(&self, event: Event) {
        let logged = LoggedEvent {
            event: event.clone(),
            published_at: Utc::now(),
        };

        {
            let mut log = self.log.lock().unwrap();
            log.push(logged);
            if log.len() > MAX_LOG_ENTRIES {
                let drop_count = log.len() - TRUNCATE_TO;
                log.drain(0..drop_count);
            }
        }
        self.published_count.fetch_add(1, Ordering::Relaxed);

        let subscribers = self.subscribers.lock().unwrap();
        for slot in subscribers.iter() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| (slot.handler)(&event)));
            if result.is_err() {
                slot.failures.fetch_add(1, Ordering::Relaxed);
                error!(topic = event.topic(), "event bus subscriber panicked");
            }
        }
    }

    pub fn events_for_truck(&self, truck_id: &TruckId, limit: usize) -> Vec<Event> {
        let log = self.log.lock().unwrap();
        log.iter()
            .rev()
            .filter(|e| e.event.truck_id() == Some(truck_id))
            .take(limit)
            .map(|e| e.event.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    pub fn events_for_topic(&self, topic: &str, limit: usize) -> Vec<Event> {
        let log = self.log.lock().unwrap();
        log.iter()
            .rev()
            .filter(|e| e.event.topic() == topic)
            .take(limit)
            .map(|e| e.event.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Replay log, optionally filtered by truck and/or topic — debugging
    /// and audit surface, not a hot path.
    pub fn replay(&self, truck_id: Option<&TruckId>, topic: Option<&str>, limit: usize) -> Vec<Event> {
        let log = self.log.lock().unwrap();
        log.iter()
            .rev()
            .filter(|e| truck_id.map(|t| e.event.truck_id() == Some(t)).unwrap_or(true))
            .filter(|e| topic.map(|t| e.event.topic() == t).unwrap_or(true))
            .take(limit)
            .map(|e| e.event.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_published: self.published_count.load(Ordering::Relaxed),
            log_len: self.log.lock().unwrap().len(),
            subscriber_count: self.subscribers.lock().unwrap().len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EventBusStats {
    pub total_published: u64,
    pub log_len: usize,
    pub subscriber_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn truck(s: &str) -> TruckId {
        TruckId::new(s)
    }

    #[test]
    fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        bus.subscribe(move |_event| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Event::FuelLevelChange {
            truck_id: truck("t1"),
            fuel_pct: 50.0,
            consumption_gph: 3.0,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_others() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        bus.subscribe(|_event| panic!("boom"));
        bus.subscribe(move |_event| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(Event::SystemError {
            component: "x".into(),
            message: "y".into(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_for_truck_filters_correctly() {
        let bus = EventBus::new();
        bus.publish(Event::FuelLevelChange {
            truck_id: truck("t1"),
            fuel_pct: 50.0,
            consumption_gph: 3.0,
        });
        bus.publish(Event::FuelLevelChange {
            truck_id: truck("t2"),
            fuel_pct: 60.0,
            consumption_gph: 2.0,
        });
        let events = bus.events_for_truck(&truck("t1"), 10);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn replay_filters_by_topic() {
        let bus = EventBus::new();
        bus.publish(Event::SystemError {
            component: "a".into(),
            message: "b".into(),
        });
        bus.publish(Event::ConfigurationChange { key: "x".into() });
        let events = bus.replay(None, Some("system_error"), 10);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn log_truncates_past_max_entries() {
        let bus = EventBus::new();
        for i in 0..(MAX_LOG_ENTRIES + 100) {
            bus.publish(Event::ConfigurationChange {
                key: format!("k{i}"),
            });
        }
        assert!(bus.stats().log_len <= MAX_LOG_ENTRIES);
    }
}
