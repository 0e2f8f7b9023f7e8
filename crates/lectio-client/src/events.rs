//! Session refresh notification
//!
//! Explicit observer list owned by the session manager. Listeners are invoked
//! synchronously on the refreshing task, before queued requests are released,
//! so in-memory session state (current-user caches and the like) is already
//! consistent by the time replayed requests resolve.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

type Listener = Box<dyn Fn(&SessionRefreshed) + Send + Sync>;

/// Payload delivered to listeners after a successful refresh.
#[derive(Debug, Clone)]
pub struct SessionRefreshed {
    pub access_token: String,
    /// Updated account payload, if the refresh response included one.
    pub user: Option<Value>,
}

/// Handle returned by [`SessionEvents::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Observer list for session refresh events.
///
/// Delivery is synchronous and at most once per successful refresh. Listeners
/// must not block; they run on the task that performed the refresh.
#[derive(Default)]
pub struct SessionEvents {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; returns an id for [`SessionEvents::unsubscribe`].
    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionRefreshed) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Box::new(listener)));
        SubscriberId(id)
    }

    /// Remove a listener. Returns false if the id was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id.0);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver an event to every registered listener, in subscription order.
    pub(crate) fn emit(&self, event: &SessionRefreshed) {
        let listeners = self.lock();
        for (_, listener) in listeners.iter() {
            listener(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Listener)>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn event(token: &str) -> SessionRefreshed {
        SessionRefreshed {
            access_token: token.into(),
            user: None,
        }
    }

    #[test]
    fn listener_receives_emitted_event() {
        let events = SessionEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        events.subscribe(move |e| {
            seen_clone.lock().unwrap().push(e.access_token.clone());
        });
        events.emit(&event("at_1"));

        assert_eq!(*seen.lock().unwrap(), vec!["at_1"]);
    }

    #[test]
    fn all_listeners_are_notified() {
        let events = SessionEvents::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            events.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        events.emit(&event("at_1"));

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let events = SessionEvents::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let id = events.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        events.emit(&event("at_1"));
        assert!(events.unsubscribe(id));
        events.emit(&event("at_2"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_unknown_id_returns_false() {
        let events = SessionEvents::new();
        let id = events.subscribe(|_| {});
        assert!(events.unsubscribe(id));
        assert!(!events.unsubscribe(id));
    }

    #[test]
    fn subscriber_count_tracks_registrations() {
        let events = SessionEvents::new();
        assert_eq!(events.subscriber_count(), 0);
        let id = events.subscribe(|_| {});
        events.subscribe(|_| {});
        assert_eq!(events.subscriber_count(), 2);
        events.unsubscribe(id);
        assert_eq!(events.subscriber_count(), 1);
    }

    #[test]
    fn event_carries_user_payload() {
        let events = SessionEvents::new();
        let seen_user = Arc::new(Mutex::new(None));
        let seen_clone = seen_user.clone();

        events.subscribe(move |e| {
            *seen_clone.lock().unwrap() = e.user.clone();
        });
        events.emit(&SessionRefreshed {
            access_token: "at_1".into(),
            user: Some(serde_json::json!({"id": 12})),
        });

        assert_eq!(seen_user.lock().unwrap().as_ref().unwrap()["id"], 12);
    }
}
