use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use url::Url;

/// Event name carrying cross-frame postMessage traffic.
pub const MESSAGE_EVENT: &str = "message";

/// Event name carrying keyboard input.
pub const KEYDOWN_EVENT: &str = "keydown";

type ListenerId = u64;

/// A single event delivered by an [`EventTarget`].
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    /// Event name, e.g. `message` or `mcp:init`.
    pub name: String,
    /// Event data (postMessage data or custom-event detail).
    pub data: Value,
    /// Whether the event was dispatched by the host rather than by script.
    pub trusted: bool,
}

#[derive(Default)]
struct Listeners {
    next_id: ListenerId,
    by_event: HashMap<String, Vec<(ListenerId, mpsc::UnboundedSender<HostEvent>)>>,
}

/// A window-like dispatcher with named-event listeners.
///
/// Models both a frame's window (postMessage arrives as `message` events) and
/// the in-process layer bus (custom events named after the message type).
#[derive(Clone, Default)]
pub struct EventTarget {
    inner: Arc<Mutex<Listeners>>,
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventTarget {
    /// Create a target with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch a trusted event. Returns how many listeners received it.
    pub fn dispatch(&self, name: &str, data: Value) -> usize {
        self.dispatch_event(HostEvent {
            name: name.to_string(),
            data,
            trusted: true,
        })
    }

    /// Dispatch an event as page script would, without the trusted flag.
    pub fn dispatch_untrusted(&self, name: &str, data: Value) -> usize {
        self.dispatch_event(HostEvent {
            name: name.to_string(),
            data,
            trusted: false,
        })
    }

    /// Dispatch a prepared event. Returns how many listeners received it.
    pub fn dispatch_event(&self, event: HostEvent) -> usize {
        let mut listeners = self.listeners();
        let Some(entries) = listeners.by_event.get_mut(&event.name) else {
            return 0;
        };
        entries.retain(|(_, sender)| !sender.is_closed());
        entries
            .iter()
            .filter(|(_, sender)| sender.send(event.clone()).is_ok())
            .count()
    }

    /// Register one listener for each of `events`, all feeding one queue.
    ///
    /// The listeners stay registered until the returned [`Subscription`] is
    /// released or dropped.
    pub fn listen(&self, events: &[&str]) -> Inbound {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut listeners = self.listeners();
        let mut registered = Vec::with_capacity(events.len());
        for name in events {
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners
                .by_event
                .entry((*name).to_string())
                .or_default()
                .push((id, sender.clone()));
            registered.push(((*name).to_string(), id));
        }
        drop(listeners);

        Inbound {
            subscription: Subscription {
                target: self.clone(),
                registered,
                released: false,
            },
            events: receiver,
            open: true,
        }
    }

    /// Number of live listener registrations across all event names.
    pub fn listener_count(&self) -> usize {
        self.listeners().by_event.values().map(Vec::len).sum()
    }

    fn remove(&self, registered: &[(String, ListenerId)]) {
        let mut listeners = self.listeners();
        for (name, id) in registered {
            if let Some(entries) = listeners.by_event.get_mut(name) {
                entries.retain(|(entry_id, _)| entry_id != id);
                if entries.is_empty() {
                    listeners.by_event.remove(name);
                }
            }
        }
    }
}

/// Owned listener registration; deregisters on release or drop.
#[derive(Debug)]
pub struct Subscription {
    target: EventTarget,
    registered: Vec<(String, ListenerId)>,
    released: bool,
}

impl Subscription {
    /// Deregister the listeners. Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.target.remove(&self.registered);
        self.released = true;
        true
    }

    /// Whether the listeners have been deregistered.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// A subscription together with the queue its listeners feed.
#[derive(Debug)]
pub struct Inbound {
    subscription: Subscription,
    events: mpsc::UnboundedReceiver<HostEvent>,
    open: bool,
}

impl Inbound {
    /// Wait for the next event. Pends forever once the queue has closed.
    pub async fn recv(&mut self) -> Option<HostEvent> {
        if !self.open {
            return std::future::pending().await;
        }
        let event = self.events.recv().await;
        if event.is_none() {
            self.open = false;
        }
        event
    }

    /// Take an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<HostEvent> {
        self.events.try_recv().ok()
    }

    /// Whether more events can still arrive.
    pub fn is_open(&self) -> bool {
        self.open && !self.subscription.is_released()
    }

    /// Deregister the listeners and discard anything still queued.
    pub fn release(&mut self) -> bool {
        let released = self.subscription.release();
        if released {
            self.events.close();
            while self.events.try_recv().is_ok() {}
            self.open = false;
        }
        released
    }
}

/// What the mini-app can see of its surroundings when it loads.
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    /// Invocation URL, including query parameters.
    pub url: Option<Url>,
    /// The mini-app's own window.
    pub window: EventTarget,
    /// The enclosing frame's window, when embedded in a frame.
    pub parent: Option<EventTarget>,
    /// The in-process layer bus, when hosted as a layer.
    pub layer: Option<EventTarget>,
}

impl HostEnvironment {
    /// No host at all.
    pub fn standalone(url: Option<Url>) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    /// Loaded inside a frame whose parent window is `parent`.
    pub fn framed(url: Option<Url>, window: EventTarget, parent: EventTarget) -> Self {
        Self {
            url,
            window,
            parent: Some(parent),
            layer: None,
        }
    }

    /// Loaded in-process on the host's layer bus.
    pub fn layered(url: Option<Url>, bus: EventTarget) -> Self {
        Self {
            url,
            window: bus.clone(),
            parent: None,
            layer: Some(bus),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_reaches_only_named_listeners() {
        let target = EventTarget::new();
        let mut inbound = target.listen(&["mcp:init"]);

        assert_eq!(target.dispatch("mcp:control", json!({})), 0);
        assert_eq!(target.dispatch("mcp:init", json!({"token": "t"})), 1);

        let event = inbound.recv().await.unwrap();
        assert_eq!(event.name, "mcp:init");
        assert!(event.trusted);
        assert!(inbound.try_recv().is_none());
    }

    #[test]
    fn release_deregisters_once() {
        let target = EventTarget::new();
        let mut inbound = target.listen(&[MESSAGE_EVENT, KEYDOWN_EVENT]);
        assert_eq!(target.listener_count(), 2);

        assert!(inbound.release());
        assert!(!inbound.release());
        assert_eq!(target.listener_count(), 0);
        assert!(!inbound.is_open());
    }

    #[test]
    fn dropping_the_inbound_deregisters() {
        let target = EventTarget::new();
        {
            let _inbound = target.listen(&[MESSAGE_EVENT]);
            assert_eq!(target.listener_count(), 1);
        }
        assert_eq!(target.listener_count(), 0);
        assert_eq!(target.dispatch(MESSAGE_EVENT, json!({})), 0);
    }

    #[test]
    fn layered_environment_shares_the_bus() {
        let bus = EventTarget::new();
        let env = HostEnvironment::layered(None, bus.clone());
        let _inbound = env.window.listen(&["mcp:init"]);
        assert_eq!(bus.listener_count(), 1);
    }
}
