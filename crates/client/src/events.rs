//! Lifecycle event listeners (`close`, `error`) and their dispatch.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;

use crate::traits::HandlerSink;
use crate::types::{CloseListener, ErrorListener, NatsError};

/// The two lifecycle events a session emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Close,
    Error,
}

/// A listener tagged with the event it listens for.
#[derive(Clone)]
pub enum ClientEvent {
    Close(CloseListener),
    Error(ErrorListener),
}

impl ClientEvent {
    pub fn close(f: impl Fn() + Send + Sync + 'static) -> Self {
        ClientEvent::Close(std::sync::Arc::new(f))
    }

    pub fn error(f: impl Fn(&NatsError) + Send + Sync + 'static) -> Self {
        ClientEvent::Error(std::sync::Arc::new(f))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Close(_) => EventKind::Close,
            ClientEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Run a caller-supplied callback so that a panic inside it stays inside it.
///
/// Returns `false` if the callback panicked.  The panic is logged and
/// dropped; it is never re-reported through the error channel.
pub(crate) fn invoke_isolated(what: &'static str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(callback = what, "callback panicked, continuing");
            false
        }
    }
}

/// Ordered, append-only listener lists, one per [`EventKind`].
#[derive(Default)]
pub struct EventRegistry {
    close: Mutex<Vec<CloseListener>>,
    error: Mutex<Vec<ErrorListener>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.  No de-duplication.
    pub fn add(&self, event: ClientEvent) {
        match event {
            ClientEvent::Close(l) => self.close.lock().push(l),
            ClientEvent::Error(l) => self.error.lock().push(l),
        }
    }

    pub fn len(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Close => self.close.lock().len(),
            EventKind::Error => self.error.lock().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len(EventKind::Close) == 0 && self.len(EventKind::Error) == 0
    }

    /// Invoke every close listener in registration order.
    pub fn dispatch_close(&self) {
        // Snapshot so listeners may register more listeners without deadlocking.
        let listeners = self.close.lock().clone();
        tracing::debug!(listeners = listeners.len(), "dispatching close");
        for listener in listeners {
            invoke_isolated("close listener", || listener());
        }
    }

    /// Invoke every error listener in registration order.
    pub fn dispatch_error(&self, error: &NatsError) {
        let listeners = self.error.lock().clone();
        tracing::debug!(listeners = listeners.len(), error = %error, "dispatching error");
        for listener in listeners {
            invoke_isolated("error listener", || listener(error));
        }
    }
}

impl HandlerSink for EventRegistry {
    fn error_handler(&self, error: &NatsError) {
        self.dispatch_error(error);
    }

    fn close_handler(&self) {
        self.dispatch_close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |s: &str| sink.lock().push(s.to_string()))
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let reg = EventRegistry::new();
        let (log, rec) = recorder();
        for i in 0..3 {
            let rec = rec.clone();
            reg.add(ClientEvent::close(move || rec(&format!("close-{i}"))));
        }
        reg.dispatch_close();
        assert_eq!(*log.lock(), vec!["close-0", "close-1", "close-2"]);
    }

    #[test]
    fn panicking_close_listener_does_not_stop_the_rest() {
        let reg = EventRegistry::new();
        let (log, rec) = recorder();
        let r0 = rec.clone();
        reg.add(ClientEvent::close(move || r0("first")));
        reg.add(ClientEvent::close(|| panic!("listener failure")));
        let r2 = rec.clone();
        reg.add(ClientEvent::close(move || r2("third")));

        reg.dispatch_close();
        assert_eq!(*log.lock(), vec!["first", "third"]);
    }

    #[test]
    fn panicking_error_listener_is_isolated() {
        let reg = EventRegistry::new();
        let (log, rec) = recorder();
        reg.add(ClientEvent::error(|_| panic!("boom")));
        reg.add(ClientEvent::error(move |e| rec(&e.to_string())));

        reg.error_handler(&NatsError::SubjectRequired);
        assert_eq!(*log.lock(), vec!["subject required"]);
    }

    #[test]
    fn kinds_are_kept_apart() {
        let reg = EventRegistry::new();
        assert!(reg.is_empty());
        let (log, rec) = recorder();
        let rc = rec.clone();
        reg.add(ClientEvent::close(move || rc("close")));
        reg.add(ClientEvent::error(move |_| rec("error")));
        assert_eq!(reg.len(EventKind::Close), 1);
        assert_eq!(reg.len(EventKind::Error), 1);

        reg.close_handler();
        assert_eq!(*log.lock(), vec!["close"]);
    }

    #[test]
    fn duplicates_are_not_collapsed() {
        let reg = EventRegistry::new();
        let (log, rec) = recorder();
        let listener = ClientEvent::close(move || rec("x"));
        assert_eq!(listener.kind(), EventKind::Close);
        reg.add(listener.clone());
        reg.add(listener);
        reg.dispatch_close();
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn listener_may_register_during_dispatch() {
        let reg = Arc::new(EventRegistry::new());
        let inner = reg.clone();
        reg.add(ClientEvent::close(move || {
            inner.add(ClientEvent::close(|| {}));
        }));
        reg.dispatch_close();
        assert_eq!(reg.len(EventKind::Close), 2);
    }

    #[test]
    fn invoke_isolated_reports_panics() {
        assert!(invoke_isolated("ok", || {}));
        assert!(!invoke_isolated("bad", || panic!("nope")));
    }
}
