//! Simple publish/subscribe facility shared by the application and its slices. It is registered as
//! the `notifications` component of the application slice, and therefore visible in slices as
//! `application.notifications`.

use fxhash::FxHashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::trace;

/// Key of the [Notifications] component.
pub const NOTIFICATIONS_KEY: &str = "notifications";

pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum NotificationError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

/// Instrumented event passed to subscribers.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Event {
    pub name: String,
    pub payload: FxHashMap<String, String>,
}

#[derive(Default)]
pub struct Notifications {
    events: RwLock<FxHashMap<String, Vec<Subscriber>>>,
}

impl Debug for Notifications {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("events", &self.event_names())
            .finish()
    }
}

impl Notifications {
    /// Registers an event which can be subscribed to. Registering an existing event keeps its
    /// subscribers.
    pub fn register_event(&self, name: &str) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default();
    }

    pub fn subscribe<F>(&self, name: &str, subscriber: F) -> Result<(), NotificationError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(name)
            .ok_or_else(|| NotificationError::UnknownEvent(name.to_string()))?
            .push(Arc::new(subscriber));

        Ok(())
    }

    /// Notifies all subscribers of given event.
    pub fn instrument(
        &self,
        name: &str,
        payload: FxHashMap<String, String>,
    ) -> Result<(), NotificationError> {
        // subscribers run outside the lock, so they can subscribe or instrument themselves
        let subscribers = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| NotificationError::UnknownEvent(name.to_string()))?;

        trace!(event = name, subscribers = subscribers.len(), "Instrumenting event");

        let event = Event {
            name: name.to_string(),
            payload,
        };

        for subscriber in subscribers {
            subscriber(&event);
        }

        Ok(())
    }

    pub fn event_names(&self) -> Vec<String> {
        let mut names = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use crate::notifications::{NotificationError, Notifications};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn should_notify_subscribers() {
        let notifications = Notifications::default();
        notifications.register_event("http.request");

        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        notifications
            .subscribe("http.request", move |event| {
                assert_eq!(event.payload.get("status").unwrap(), "200");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        notifications
            .instrument(
                "http.request",
                [("status".to_string(), "200".to_string())]
                    .into_iter()
                    .collect(),
            )
            .unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_reject_unknown_events() {
        let notifications = Notifications::default();

        assert_eq!(
            notifications.subscribe("unknown", |_| {}).unwrap_err(),
            NotificationError::UnknownEvent("unknown".to_string())
        );
        assert!(notifications
            .instrument("unknown", Default::default())
            .is_err());
    }
}
