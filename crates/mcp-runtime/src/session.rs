use crate::host::{HostEnvironment, HostEvent, Inbound, KEYDOWN_EVENT, MESSAGE_EVENT};
use crate::transport::{Delivery, MessageBus, TransportDetector};
use crate::{Result, SessionError};
use log::{debug, info, warn};
use mcp_format::payload::{
    cancel_payload, completion_payload, error_payload, progress_payload, ready_payload,
    CompletionReport, ProgressReport,
};
use mcp_format::{
    Envelope, ErrorReport, GameCompletion, GameProgress, HostMessage, InvocationContext,
    MessageType, Progress, ProtocolDialect, QuizCompletion, QuizProgress, TransportMode,
    VideoCompletion, VideoProgress,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};

/// How long an embedded session waits for the host's init.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Delay before a standalone session resolves its context from the URL.
pub const DEFAULT_STANDALONE_GRACE: Duration = Duration::from_millis(100);

/// Delay between `mcp:complete` and `mcp:close-request`.
pub const DEFAULT_CLOSE_REQUEST_DELAY: Duration = Duration::from_millis(100);

/// Capabilities advertised when none are configured.
pub const DEFAULT_CAPABILITIES: [&str; 3] = ["progress", "complete", "cancel"];

/// Reason used for escape-key cancellation.
pub const USER_CANCELLED: &str = "user_cancelled";

type InitCallback = Box<dyn FnMut(&InvocationContext) + Send>;
type ControlCallback = Box<dyn FnMut(&str, &Value) + Send>;
type CloseCallback = Box<dyn FnMut(&str) + Send>;

/// Configuration of a callee session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Identifier stamped on every envelope.
    pub app_id: String,
    /// Version announced in `mcp:ready`.
    pub version: String,
    /// Capabilities announced in `mcp:ready`.
    pub capabilities: Vec<String>,
    /// Bound on waiting for host init before the URL fallback.
    pub init_timeout: Duration,
    /// Standalone delay before the URL fallback.
    pub standalone_grace: Duration,
    /// Delay between completion and the close request.
    pub close_request_delay: Duration,
    /// Whether the Escape key cancels an active session.
    pub cancel_on_escape: bool,
}

impl SessionOptions {
    /// Options with the protocol defaults.
    pub fn new(app_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            version: version.into(),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            standalone_grace: DEFAULT_STANDALONE_GRACE,
            close_request_delay: DEFAULT_CLOSE_REQUEST_DELAY,
            cancel_on_escape: true,
        }
    }

    /// Replace the advertised capabilities.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Set the host init timeout.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Set the close-request delay after completion.
    pub fn with_close_request_delay(mut self, delay: Duration) -> Self {
        self.close_request_delay = delay;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(SessionError::InvalidOptions(
                "app_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The mini-app completed.
    Completed,
    /// The mini-app cancelled.
    Cancelled,
    /// The host closed the surface.
    ClosedByHost,
}

/// Lifecycle state of a [`CalleeSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not yet wired.
    Constructed,
    /// Listening, context not yet resolved.
    AwaitingInit,
    /// Context resolved; business envelopes allowed.
    Active,
    /// Absorbing end state.
    Terminal(Termination),
}

impl SessionState {
    /// Whether the session has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Terminal(_))
    }
}

/// Where the active context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    /// An `mcp:init` from the host.
    Host,
    /// Invocation URL query parameters.
    UrlFallback,
}

/// Something the business logic may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session became active.
    Initialized {
        /// The resolved context.
        context: InvocationContext,
        /// Which producer resolved it.
        source: ContextSource,
    },
    /// A later init refreshed the token or config.
    Refreshed(InvocationContext),
    /// A control command from the host.
    Control {
        /// Command name.
        action: String,
        /// Command arguments.
        params: Value,
    },
    /// The user cancelled with the Escape key; cancel and close-request were sent.
    Cancelled {
        /// Cancellation reason.
        reason: String,
    },
    /// The host closed the surface.
    Closed {
        /// Reason given by the host.
        reason: String,
    },
}

enum Wakeup {
    Host(Option<HostEvent>),
    FallbackDue,
}

/// Callee-side protocol session.
///
/// Drive it with [`CalleeSession::next_event`] from the mini-app's event loop
/// and call the reporting methods from business logic in between.
pub struct CalleeSession {
    options: SessionOptions,
    mode: TransportMode,
    state: SessionState,
    context: Option<InvocationContext>,
    fallback: InvocationContext,
    fallback_at: Instant,
    bus: MessageBus,
    inbound: Option<Inbound>,
    close_request_due: Option<Instant>,
    destroyed: bool,
    init_tx: watch::Sender<Option<InvocationContext>>,
    on_init: Option<InitCallback>,
    on_control: Option<ControlCallback>,
    on_close: Option<CloseCallback>,
}

impl CalleeSession {
    /// Detect the transport, register listeners and announce readiness.
    pub fn new(options: SessionOptions, env: HostEnvironment) -> Result<Self> {
        options.validate()?;

        let mode = TransportDetector::detect(&env);
        let bus = MessageBus::connect(options.app_id.clone(), mode, &env);
        let fallback = match &env.url {
            Some(url) => InvocationContext::from_url(url, mode),
            None => InvocationContext::empty(mode),
        };
        let delay = if mode.is_embedded() {
            options.init_timeout
        } else {
            options.standalone_grace
        };
        let (init_tx, _) = watch::channel(None);

        let mut session = Self {
            options,
            mode,
            state: SessionState::Constructed,
            context: None,
            fallback,
            fallback_at: Instant::now() + delay,
            bus,
            inbound: None,
            close_request_due: None,
            destroyed: false,
            init_tx,
            on_init: None,
            on_control: None,
            on_close: None,
        };

        session.inbound = Some(session.bus.subscribe(&env));
        session.state = SessionState::AwaitingInit;
        info!(
            "[{}] session ready, transport: {}",
            session.options.app_id, mode
        );

        if mode.is_embedded() {
            let payload = ready_payload(&session.options.version, &session.options.capabilities);
            session.emit(MessageType::Ready, payload);
        }

        Ok(session)
    }

    /// Transport chosen at construction.
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether business envelopes can be sent.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active && !self.destroyed
    }

    /// The resolved context, once active.
    pub fn context(&self) -> Option<&InvocationContext> {
        self.context.as_ref()
    }

    /// Host dialect from the resolved context.
    pub fn protocol(&self) -> ProtocolDialect {
        self.context
            .as_ref()
            .map(|context| context.protocol)
            .unwrap_or_default()
    }

    /// Resource identifier from the resolved context.
    pub fn resource_id(&self) -> Option<&str> {
        self.context.as_ref()?.resource_id.as_deref()
    }

    /// Identifier stamped on every envelope.
    pub fn app_id(&self) -> &str {
        &self.options.app_id
    }

    /// Capabilities announced in `mcp:ready`.
    pub fn capabilities(&self) -> &[String] {
        &self.options.capabilities
    }

    /// Register the init callback. Replays immediately when already active.
    pub fn on_init(&mut self, callback: impl FnMut(&InvocationContext) + Send + 'static) {
        let mut callback: InitCallback = Box::new(callback);
        if let Some(context) = &self.context {
            callback(context);
        }
        self.on_init = Some(callback);
    }

    /// Register the control callback.
    pub fn on_control(&mut self, callback: impl FnMut(&str, &Value) + Send + 'static) {
        self.on_control = Some(Box::new(callback));
    }

    /// Register the close callback; it runs synchronously on host close.
    pub fn on_close(&mut self, callback: impl FnMut(&str) + Send + 'static) {
        self.on_close = Some(Box::new(callback));
    }

    /// A handle that resolves with the context on the first activation.
    pub fn init_watcher(&self) -> InitWatcher {
        InitWatcher {
            rx: self.init_tx.subscribe(),
        }
    }

    /// Wait for the first activation, failing after `timeout`.
    ///
    /// The returned future does not borrow the session, so it can be awaited
    /// alongside [`CalleeSession::next_event`].
    pub fn wait_for_init(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<InvocationContext>> + Send + 'static {
        self.init_watcher().wait(timeout)
    }

    /// Process incoming traffic until something happens for business logic.
    ///
    /// Races host messages against the URL fallback deadline while awaiting
    /// init. Returns `None` once the session is terminal or destroyed; an
    /// interrupted completion's close request is sent first, at its deadline.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if let Some(due) = self.close_request_due {
            time::sleep_until(due).await;
            self.flush_close_request();
            return None;
        }
        loop {
            if self.state.is_terminal() || self.destroyed {
                return None;
            }
            let inbound = self.inbound.as_mut()?;
            if !inbound.is_open() && self.state == SessionState::Active {
                return None;
            }

            let awaiting = self.state == SessionState::AwaitingInit;
            let fallback_at = self.fallback_at;
            let wakeup = tokio::select! {
                biased;
                event = inbound.recv() => Wakeup::Host(event),
                _ = time::sleep_until(fallback_at), if awaiting => Wakeup::FallbackDue,
            };

            let outcome = match wakeup {
                Wakeup::Host(Some(event)) => self.handle_host_event(event),
                Wakeup::Host(None) => None,
                Wakeup::FallbackDue => {
                    debug!(
                        "[{}] no host init within {:?}, using URL parameters",
                        self.options.app_id,
                        self.fallback_delay()
                    );
                    let context = self.fallback.clone();
                    self.resolve(context, ContextSource::UrlFallback)
                }
            };

            if outcome.is_some() {
                return outcome;
            }
        }
    }

    /// Report generic progress.
    pub fn send_progress(&mut self, progress: &Progress) -> Delivery {
        self.report_progress(progress)
    }

    /// Report game progress.
    pub fn send_game_progress(&mut self, progress: &GameProgress) -> Delivery {
        self.report_progress(progress)
    }

    /// Report quiz progress.
    pub fn send_quiz_progress(&mut self, progress: &QuizProgress) -> Delivery {
        self.report_progress(progress)
    }

    /// Report video progress.
    pub fn send_video_progress(&mut self, progress: &VideoProgress) -> Delivery {
        self.report_progress(progress)
    }

    /// Report any progress payload.
    pub fn report_progress<P: ProgressReport>(&mut self, report: &P) -> Delivery {
        match progress_payload(report) {
            Ok(payload) => self.emit(MessageType::Progress, payload),
            Err(err) => {
                warn!("[{}] unshapeable progress: {}", self.options.app_id, err);
                Delivery::Dropped
            }
        }
    }

    /// Complete with free-form data.
    pub async fn complete(&mut self, data: Value) -> Delivery {
        self.complete_with(&data).await
    }

    /// Complete a game.
    pub async fn complete_game(&mut self, result: &GameCompletion) -> Delivery {
        self.complete_with(result).await
    }

    /// Complete a quiz.
    pub async fn complete_quiz(&mut self, result: &QuizCompletion) -> Delivery {
        self.complete_with(result).await
    }

    /// Complete a video.
    pub async fn complete_video(&mut self, result: &VideoCompletion) -> Delivery {
        self.complete_with(result).await
    }

    /// Emit `mcp:complete`, end the session, then request close after the
    /// render delay.
    ///
    /// Returns the delivery of the completion envelope. A second call is a
    /// no-op returning [`Delivery::Dropped`].
    ///
    /// Listeners are released before the delay. If this future is dropped
    /// during the delay, the close request stays pending and goes out on the
    /// next [`CalleeSession::next_event`] or [`CalleeSession::request_close`],
    /// or when the session is dropped.
    pub async fn complete_with<C: CompletionReport>(&mut self, report: &C) -> Delivery {
        if !self.is_active() {
            debug!(
                "[{}] complete ignored in state {:?}",
                self.options.app_id, self.state
            );
            return Delivery::Dropped;
        }
        let payload = match completion_payload(report) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("[{}] unshapeable completion: {}", self.options.app_id, err);
                return Delivery::Dropped;
            }
        };

        let delivery = self.emit(MessageType::Complete, payload);
        self.state = SessionState::Terminal(Termination::Completed);
        self.release_listeners();

        let due = Instant::now() + self.options.close_request_delay;
        self.close_request_due = Some(due);
        time::sleep_until(due).await;
        self.flush_close_request();
        delivery
    }

    /// Cancel with a reason; sends `mcp:cancel` then `mcp:close-request`.
    pub fn cancel(&mut self, reason: &str) -> Delivery {
        self.cancel_inner(reason, None)
    }

    /// Cancel with a reason and data to keep (e.g. the last score).
    pub fn cancel_with_data(&mut self, reason: &str, data: Value) -> Delivery {
        self.cancel_inner(reason, Some(data))
    }

    /// Report an error to the host. Allowed until the session ends.
    pub fn error(&mut self, code: &str, message: &str) -> Delivery {
        let payload = error_payload(&ErrorReport::new(code, message));
        self.emit(MessageType::Error, payload)
    }

    /// Ask the host to tear down the surface without ending the session.
    pub fn request_close(&mut self) -> Delivery {
        if self.close_request_due.is_some() {
            return self.flush_close_request();
        }
        if self.state.is_terminal() {
            return Delivery::Dropped;
        }
        self.send_close_request()
    }

    /// Deregister listeners and stop all further sends. Idempotent.
    ///
    /// A close request still pending from an interrupted completion is
    /// discarded.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.close_request_due = None;
        self.teardown();
        self.destroyed = true;
        info!("[{}] destroyed", self.options.app_id);
    }

    /// Whether [`CalleeSession::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn fallback_delay(&self) -> Duration {
        if self.mode.is_embedded() {
            self.options.init_timeout
        } else {
            self.options.standalone_grace
        }
    }

    fn handle_host_event(&mut self, event: HostEvent) -> Option<SessionEvent> {
        if event.name == KEYDOWN_EVENT {
            return self.handle_key(&event.data);
        }

        let message = if event.name == MESSAGE_EVENT {
            event.data
        } else {
            if !event.trusted {
                warn!(
                    "[{}] untrusted {} event ignored",
                    self.options.app_id, event.name
                );
                return None;
            }
            with_type_tag(event.data, &event.name)
        };

        match HostMessage::parse(&message) {
            Ok(message) => self.handle_message(message),
            Err(err) => {
                debug!("[{}] dropping message: {}", self.options.app_id, err);
                None
            }
        }
    }

    fn handle_message(&mut self, message: HostMessage) -> Option<SessionEvent> {
        match message {
            HostMessage::Init(body) => match InvocationContext::from_init(&body, self.mode) {
                Ok(context) => self.resolve(context, ContextSource::Host),
                Err(err) => {
                    debug!("[{}] dropping init: {}", self.options.app_id, err);
                    None
                }
            },
            HostMessage::Control { action, params } => {
                if self.state != SessionState::Active {
                    debug!(
                        "[{}] control `{}` before init dropped",
                        self.options.app_id, action
                    );
                    return None;
                }
                if let Some(callback) = self.on_control.as_mut() {
                    callback(&action, &params);
                }
                Some(SessionEvent::Control { action, params })
            }
            HostMessage::Close { reason } => {
                let reason = reason.unwrap_or_else(|| "unknown".to_string());
                self.close_by_host(&reason);
                Some(SessionEvent::Closed { reason })
            }
        }
    }

    fn handle_key(&mut self, data: &Value) -> Option<SessionEvent> {
        let escape = data.get("key").and_then(Value::as_str) == Some("Escape");
        if !escape || !self.options.cancel_on_escape || !self.is_active() {
            return None;
        }
        self.cancel(USER_CANCELLED);
        Some(SessionEvent::Cancelled {
            reason: USER_CANCELLED.to_string(),
        })
    }

    fn resolve(
        &mut self,
        context: InvocationContext,
        source: ContextSource,
    ) -> Option<SessionEvent> {
        match self.state {
            SessionState::AwaitingInit => {
                info!(
                    "[{}] initialized from {:?}: {}",
                    self.options.app_id,
                    source,
                    context.to_json()
                );
                self.state = SessionState::Active;
                self.init_tx.send_replace(Some(context.clone()));
                if let Some(callback) = self.on_init.as_mut() {
                    callback(&context);
                }
                self.context = Some(context.clone());
                Some(SessionEvent::Initialized { context, source })
            }
            SessionState::Active => {
                let active = self.context.as_mut()?;
                if active.refresh_from(&context) {
                    debug!("[{}] token/config refreshed", self.options.app_id);
                    Some(SessionEvent::Refreshed(active.clone()))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn cancel_inner(&mut self, reason: &str, data: Option<Value>) -> Delivery {
        if !self.is_active() {
            debug!(
                "[{}] cancel ignored in state {:?}",
                self.options.app_id, self.state
            );
            return Delivery::Dropped;
        }
        let delivery = self.emit(MessageType::Cancel, cancel_payload(reason, data));
        self.state = SessionState::Terminal(Termination::Cancelled);
        self.send_close_request();
        self.teardown();
        delivery
    }

    fn close_by_host(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        info!("[{}] closed by host: {}", self.options.app_id, reason);
        self.state = SessionState::Terminal(Termination::ClosedByHost);
        if let Some(callback) = self.on_close.as_mut() {
            callback(reason);
        }
        self.teardown();
    }

    fn emit(&mut self, kind: MessageType, payload: Map<String, Value>) -> Delivery {
        if self.destroyed || self.state.is_terminal() {
            return Delivery::Dropped;
        }
        if kind.is_business() && self.state != SessionState::Active {
            debug!("[{}] {} before init dropped", self.options.app_id, kind);
            return Delivery::Dropped;
        }
        self.bus
            .send(&Envelope::new(kind, self.options.app_id.clone(), payload))
    }

    fn send_close_request(&mut self) -> Delivery {
        self.bus.send(&Envelope::new(
            MessageType::CloseRequest,
            self.options.app_id.clone(),
            Map::new(),
        ))
    }

    /// Send the close request owed by a completion, at most once.
    fn flush_close_request(&mut self) -> Delivery {
        if self.close_request_due.take().is_none() {
            return Delivery::Dropped;
        }
        let delivery = self.send_close_request();
        self.teardown();
        delivery
    }

    fn release_listeners(&mut self) {
        if let Some(mut inbound) = self.inbound.take() {
            inbound.release();
        }
    }

    fn teardown(&mut self) {
        self.release_listeners();
        self.bus.close();
    }
}

impl Drop for CalleeSession {
    fn drop(&mut self) {
        if self.close_request_due.is_some() {
            debug!(
                "[{}] session dropped with a pending close request",
                self.options.app_id
            );
            self.flush_close_request();
        }
    }
}

/// Resolves with the context on the session's first activation.
#[derive(Debug, Clone)]
pub struct InitWatcher {
    rx: watch::Receiver<Option<InvocationContext>>,
}

impl InitWatcher {
    /// The context if the session is already active.
    pub fn current(&self) -> Option<InvocationContext> {
        self.rx.borrow().clone()
    }

    /// Wait for activation, failing with [`SessionError::InitTimeout`].
    pub async fn wait(mut self, timeout: Duration) -> Result<InvocationContext> {
        let activation = async {
            loop {
                let current = self.rx.borrow_and_update().clone();
                if let Some(context) = current {
                    return Ok(context);
                }
                if self.rx.changed().await.is_err() {
                    return Err(SessionError::SessionDropped);
                }
            }
        };
        time::timeout(timeout, activation)
            .await
            .map_err(|_| SessionError::InitTimeout(timeout))?
    }
}

/// Layer custom events carry the bare detail; give it the event name as tag.
fn with_type_tag(data: Value, name: &str) -> Value {
    match data {
        Value::Object(mut object) => {
            object
                .entry("type")
                .or_insert_with(|| Value::String(name.to_string()));
            Value::Object(object)
        }
        // Not an object: let the parser reject it.
        other => other,
    }
}
