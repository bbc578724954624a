use crate::host::{EventTarget, HostEnvironment, Inbound, KEYDOWN_EVENT, MESSAGE_EVENT};
use log::{debug, info, warn};
use mcp_format::{Envelope, MessageType, TransportMode, LAYER_READY_EVENT};

/// Host-to-callee event names listened for on the layer bus.
const LAYER_INBOUND_EVENTS: [&str; 4] = [
    MessageType::Init.as_str(),
    MessageType::Control.as_str(),
    MessageType::Close.as_str(),
    KEYDOWN_EVENT,
];

/// Picks the transport once, when the mini-app loads.
pub struct TransportDetector;

impl TransportDetector {
    /// Decide the transport mode for `env`.
    ///
    /// A `mode=layer` or `mode=iframe` query parameter wins over the
    /// heuristics; otherwise a layer bus selects `layer`, an enclosing frame
    /// selects `iframe`, and anything else is `standalone`.
    pub fn detect(env: &HostEnvironment) -> TransportMode {
        if let Some(mode) = Self::url_override(env) {
            debug!("Transport mode forced by URL: {}", mode);
            return mode;
        }

        if env.layer.is_some() {
            TransportMode::Layer
        } else if env.parent.is_some() {
            TransportMode::Iframe
        } else {
            TransportMode::Standalone
        }
    }

    fn url_override(env: &HostEnvironment) -> Option<TransportMode> {
        let url = env.url.as_ref()?;
        let mode = url
            .query_pairs()
            .find(|(key, _)| key == "mode")
            .map(|(_, value)| value.into_owned())?;
        match mode.as_str() {
            "layer" => Some(TransportMode::Layer),
            "iframe" => Some(TransportMode::Iframe),
            _ => None,
        }
    }
}

/// Outcome of a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the host transport.
    Sent,
    /// Written to the local diagnostic sink (standalone).
    Logged,
    /// Not delivered: wrong state, closed bus, or unshapeable payload.
    Dropped,
}

impl Delivery {
    /// Whether the envelope left the session.
    pub fn is_delivered(self) -> bool {
        !matches!(self, Delivery::Dropped)
    }
}

#[derive(Debug)]
enum Route {
    Frame(EventTarget),
    Layer(EventTarget),
    Diagnostic,
}

/// Sends envelopes toward the host over the detected transport.
#[derive(Debug)]
pub struct MessageBus {
    app_id: String,
    mode: TransportMode,
    route: Route,
    closed: bool,
}

impl MessageBus {
    /// Bind a bus for `mode` to the channels present in `env`.
    ///
    /// If the channel the mode names is missing (a forced mode on a page that
    /// has no such host), the other embedded channel is used when present,
    /// and the diagnostic sink otherwise.
    pub fn connect(app_id: impl Into<String>, mode: TransportMode, env: &HostEnvironment) -> Self {
        let frame = env.parent.clone().map(Route::Frame);
        let layer = env.layer.clone().map(Route::Layer);

        let route = match mode {
            TransportMode::Iframe => frame.or(layer),
            TransportMode::Layer => layer.or(frame),
            TransportMode::Standalone => None,
        };
        let route = route.unwrap_or_else(|| {
            if mode.is_embedded() {
                warn!("No {} host channel found, falling back to diagnostics", mode);
            }
            Route::Diagnostic
        });

        Self {
            app_id: app_id.into(),
            mode,
            route,
            closed: false,
        }
    }

    /// Register the listeners this transport receives host messages on.
    pub fn subscribe(&self, env: &HostEnvironment) -> Inbound {
        match &self.route {
            Route::Layer(bus) => bus.listen(&LAYER_INBOUND_EVENTS),
            Route::Frame(_) => env.window.listen(&[MESSAGE_EVENT, KEYDOWN_EVENT]),
            Route::Diagnostic => env.window.listen(&[KEYDOWN_EVENT]),
        }
    }

    /// Identifier stamped on every envelope.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Mode the bus was connected for.
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Whether sends reach the local diagnostic sink only.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self.route, Route::Diagnostic)
    }

    /// Deliver `envelope`. Sends after [`MessageBus::close`] are dropped.
    pub fn send(&self, envelope: &Envelope) -> Delivery {
        if self.closed {
            debug!("[{}] bus closed, dropping {}", self.app_id, envelope.kind);
            return Delivery::Dropped;
        }

        let wire = envelope.to_wire();
        match &self.route {
            Route::Frame(parent) => {
                // postMessage with a wildcard target origin
                parent.dispatch(MESSAGE_EVENT, wire);
                Delivery::Sent
            }
            Route::Layer(bus) => {
                let name = match envelope.kind {
                    MessageType::Ready => LAYER_READY_EVENT,
                    other => other.as_str(),
                };
                bus.dispatch(name, wire);
                Delivery::Sent
            }
            Route::Diagnostic => {
                info!("[{}] {}: {}", self.app_id, envelope.kind, wire);
                Delivery::Logged
            }
        }
    }

    /// Stop delivering. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the bus has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
