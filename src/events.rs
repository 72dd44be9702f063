//! In-process publish/subscribe for lifecycle events.
//!
//! Handlers for one event name run in subscription order, one after another.
//! The first handler error stops that emit and is returned to the emitter;
//! the bus keeps no poisoned state, so later emits run every handler again.
use crate::status::{EntityKind, Status};
use crate::types::TimeStamp;
use chrono::Utc;
use std::collections::BTreeMap;

/// Immutable record of one status change.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StatusTransition {
    #[n(0)]
    pub kind: EntityKind,
    #[n(1)]
    pub entity_id: String,
    #[n(2)]
    pub from: Status,
    #[n(3)]
    pub to: Status,
    #[n(4)]
    pub at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created {
        kind: EntityKind,
        entity_id: String,
        at: TimeStamp<Utc>,
    },
    StatusChanged(StatusTransition),
}

impl Event {
    pub fn kind(&self) -> EntityKind {
        match self {
            Event::Created { kind, .. } => *kind,
            Event::StatusChanged(t) => t.kind,
        }
    }

    /// `<kind>.created` or `<kind>.status_changed`
    pub fn name(&self) -> String {
        match self {
            Event::Created { kind, .. } => created(*kind),
            Event::StatusChanged(t) => status_changed(t.kind),
        }
    }
}

pub fn created(kind: EntityKind) -> String {
    format!("{kind}.created")
}

pub fn status_changed(kind: EntityKind) -> String {
    format!("{kind}.status_changed")
}

type Handler = Box<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: BTreeMap<String, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .entry(name.into())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn emit(&self, event: &Event) -> anyhow::Result<()> {
        let name = event.name();
        let Some(handlers) = self.handlers.get(&name) else {
            return Ok(());
        };
        tracing::trace!(event = %name, subscribers = handlers.len(), "emitting");
        for handler in handlers {
            handler(event)?;
        }
        Ok(())
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::BookingStatus;
    use std::sync::{Arc, Mutex};

    fn booking_confirmed() -> Event {
        Event::StatusChanged(StatusTransition {
            kind: EntityKind::Booking,
            entity_id: "bk_1".into(),
            from: BookingStatus::Planned.into(),
            to: BookingStatus::Confirmed.into(),
            at: TimeStamp::new(),
        })
    }

    #[test]
    fn event_names_follow_kind() {
        assert_eq!(booking_confirmed().name(), "booking.status_changed");
        let created = Event::Created {
            kind: EntityKind::Order,
            entity_id: "snap_1".into(),
            at: TimeStamp::new(),
        };
        assert_eq!(created.name(), "order.created");
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut bus = EventBus::new();
        for i in 0..3 {
            let log = log.clone();
            bus.on("booking.status_changed", move |_| {
                log.lock().unwrap().push(i);
                Ok(())
            });
        }

        bus.emit(&booking_confirmed()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_handler_aborts_the_rest_of_that_emit_only() {
        let log = Arc::new(Mutex::new(vec![]));
        let fail = Arc::new(Mutex::new(true));
        let mut bus = EventBus::new();
        {
            let fail = fail.clone();
            bus.on("booking.status_changed", move |_| {
                if *fail.lock().unwrap() {
                    anyhow::bail!("subscriber down");
                }
                Ok(())
            });
        }
        {
            let log = log.clone();
            bus.on("booking.status_changed", move |_| {
                log.lock().unwrap().push("second");
                Ok(())
            });
        }

        assert!(bus.emit(&booking_confirmed()).is_err());
        assert!(log.lock().unwrap().is_empty());

        *fail.lock().unwrap() = false;
        bus.emit(&booking_confirmed()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn clear_drops_all_subscriptions() {
        let mut bus = EventBus::new();
        bus.on("order.created", |_| Ok(()));
        bus.on("booking.created", |_| Ok(()));
        assert_eq!(bus.subscriber_count("order.created"), 1);

        bus.clear();
        assert_eq!(bus.subscriber_count("order.created"), 0);
        assert_eq!(bus.subscriber_count("booking.created"), 0);
    }
}
