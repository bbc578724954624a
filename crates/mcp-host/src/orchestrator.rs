//! Caller-side orchestration: issue a session, then launch apps.
//!
//! Layer apps are embedded on a surface that speaks the lifecycle protocol.
//! The caller answers the first `mcp:ready` with exactly one `mcp:init`,
//! observes progress, and tears the surface down on complete, cancel or
//! close-request without acknowledging anything back.

use crate::config::CallerConfig;
use crate::issuer::SessionIssuerClient;
use crate::session::{AppGrant, IssuedSession, ResponseType};
use crate::{Error, Result};
use log::{debug, info, warn};
use mcp_format::{CalleeMessage, HostMessage, MessageType, LAYER_READY_EVENT};
use mcp_runtime::{EventTarget, HostEnvironment, Inbound, MESSAGE_EVENT};
use serde_json::{Map, Value};
use url::Url;

/// Callee-to-host event names listened for on a layer bus.
const LAYER_OUTBOUND_EVENTS: [&str; 6] = [
    LAYER_READY_EVENT,
    MessageType::Progress.as_str(),
    MessageType::Complete.as_str(),
    MessageType::Cancel.as_str(),
    MessageType::CloseRequest.as_str(),
    MessageType::Error.as_str(),
];

/// Launch query keys set on a layer app's endpoint.
const LAUNCH_QUERY_KEYS: [&str; 3] = ["token", "resourceId", "userId"];

/// What the caller knows about the invocation it is launching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchContext {
    pub resource_id: String,
    pub user_id: String,
    /// Defaults to the issued session's customer.
    pub customer_id: Option<String>,
    /// Defaults to the issued session's project.
    pub project_id: Option<String>,
    /// App configuration forwarded in the init context.
    pub config: Map<String, Value>,
    /// Extra parameters forwarded in the init context.
    pub params: Map<String, Value>,
}

impl LaunchContext {
    pub fn new(resource_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Add a config entry.
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Kind of surface a layer app is mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// A frame; messages cross as postMessage.
    Frame,
    /// The in-process layer bus; messages are custom events.
    Layer,
}

/// Issues a session and launches the apps it authorizes.
#[derive(Debug)]
pub struct CallerOrchestrator {
    config: CallerConfig,
    client: SessionIssuerClient,
    session: IssuedSession,
}

impl CallerOrchestrator {
    /// Open a session with the issuer. Fails before any app is launched if
    /// the issuer rejects the caller.
    pub async fn bootstrap(config: CallerConfig, bearer: impl Into<String>) -> Result<Self> {
        let client = SessionIssuerClient::new(&config, bearer)?;
        let session = client.init_session().await?;
        Ok(Self::new(config, client, session))
    }

    /// Wrap an already issued session.
    pub fn new(config: CallerConfig, client: SessionIssuerClient, session: IssuedSession) -> Self {
        Self {
            config,
            client,
            session,
        }
    }

    pub fn session(&self) -> &IssuedSession {
        &self.session
    }

    pub fn config(&self) -> &CallerConfig {
        &self.config
    }

    /// The URL a layer app is loaded from, carrying its token and identity.
    pub fn launch_url(&self, app: &str, context: &LaunchContext) -> Result<Url> {
        let app = self.require(app, ResponseType::Layer)?;
        build_launch_url(app, context)
    }

    /// Mount a layer app on a new surface.
    pub fn embed(
        &self,
        app: &str,
        context: &LaunchContext,
        surface: SurfaceKind,
    ) -> Result<Embedding> {
        let grant = self.require(app, ResponseType::Layer)?;
        let launch_url = build_launch_url(grant, context)?;
        let init = self.init_context(grant, context);
        info!("Embedding {} as {:?}: {}", grant.id, surface, launch_url);
        Ok(Embedding::open(grant.id.clone(), launch_url, init, surface))
    }

    /// Call an inline app and return its JSON answer.
    pub async fn invoke_inline(&self, app: &str, context: &LaunchContext) -> Result<Value> {
        let grant = self.require(app, ResponseType::Inline)?;
        let body = Value::Object(self.init_context(grant, context));
        self.client.call_inline(grant, &body).await
    }

    /// Renew an app token and keep it for later launches.
    pub async fn refresh_app_token(&mut self, app: &str) -> Result<&AppGrant> {
        let app_id = self.session.find_app(app)?.id.clone();
        let refresh = self.client.refresh_token(&app_id).await?;
        self.session.apply_refresh(&refresh)
    }

    fn require(&self, app: &str, expected: ResponseType) -> Result<&AppGrant> {
        let grant = self.session.find_app(app)?;
        if grant.response_type != expected {
            return Err(Error::UnsupportedResponseType {
                app_id: grant.id.clone(),
                actual: grant.response_type,
                expected,
            });
        }
        Ok(grant)
    }

    /// Init context in the caller's camelCase dialect.
    fn init_context(&self, app: &AppGrant, context: &LaunchContext) -> Map<String, Value> {
        let info = &self.session.session;
        let mut config = context.config.clone();
        if let Some(theme) = &self.config.default_theme {
            config
                .entry("theme")
                .or_insert_with(|| Value::String(theme.clone()));
        }

        let mut init = Map::new();
        init.insert("resourceId".into(), context.resource_id.clone().into());
        init.insert("userId".into(), context.user_id.clone().into());
        init.insert(
            "customerId".into(),
            context
                .customer_id
                .clone()
                .unwrap_or_else(|| info.customer_id.clone())
                .into(),
        );
        init.insert(
            "projectId".into(),
            context
                .project_id
                .clone()
                .unwrap_or_else(|| info.project_id.clone())
                .into(),
        );
        init.insert("token".into(), app.token.clone().into());
        init.insert("language".into(), self.config.language.clone().into());
        init.insert("config".into(), Value::Object(config));
        if !context.params.is_empty() {
            init.insert("params".into(), Value::Object(context.params.clone()));
        }
        init
    }
}

fn build_launch_url(app: &AppGrant, context: &LaunchContext) -> Result<Url> {
    let mut url = Url::parse(&app.endpoint)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !LAUNCH_QUERY_KEYS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        query
            .append_pair("token", &app.token)
            .append_pair("resourceId", &context.resource_id)
            .append_pair("userId", &context.user_id);
    }
    Ok(url)
}

/// One mounted layer app, seen from the caller.
#[derive(Debug)]
pub struct Embedding {
    app_id: String,
    launch_url: Url,
    init: Map<String, Value>,
    surface: SurfaceKind,
    /// Frame: the app's window. Layer: the shared bus.
    callee: EventTarget,
    /// Frame only: the caller's window the app posts to.
    host_window: Option<EventTarget>,
    inbound: Option<Inbound>,
    init_sent: bool,
}

impl Embedding {
    fn open(
        app_id: String,
        launch_url: Url,
        init: Map<String, Value>,
        surface: SurfaceKind,
    ) -> Self {
        let callee = EventTarget::new();
        let (host_window, inbound) = match surface {
            SurfaceKind::Frame => {
                let window = EventTarget::new();
                let inbound = window.listen(&[MESSAGE_EVENT]);
                (Some(window), inbound)
            }
            SurfaceKind::Layer => (None, callee.listen(&LAYER_OUTBOUND_EVENTS)),
        };

        Self {
            app_id,
            launch_url,
            init,
            surface,
            callee,
            host_window,
            inbound: Some(inbound),
            init_sent: false,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn launch_url(&self) -> &Url {
        &self.launch_url
    }

    pub fn surface(&self) -> SurfaceKind {
        self.surface
    }

    /// Whether the init has been delivered.
    pub fn init_sent(&self) -> bool {
        self.init_sent
    }

    /// Whether the surface is still mounted.
    pub fn is_open(&self) -> bool {
        self.inbound.is_some()
    }

    /// What the mounted app sees when it loads.
    pub fn callee_environment(&self) -> HostEnvironment {
        let url = Some(self.launch_url.clone());
        match &self.host_window {
            Some(parent) => HostEnvironment::framed(url, self.callee.clone(), parent.clone()),
            None => HostEnvironment::layered(url, self.callee.clone()),
        }
    }

    /// Wait for the next message from the app and react to it.
    ///
    /// Returns `None` once the surface has been torn down.
    pub async fn next_event(&mut self) -> Option<CalleeMessage> {
        loop {
            let event = self.inbound.as_mut()?.recv().await?;
            if let Some(message) = self.handle_message(&event.data) {
                return Some(message);
            }
        }
    }

    /// React to one raw message from the app.
    ///
    /// Sends the init on the first ready and tears down on complete, cancel
    /// and close-request. Malformed messages are dropped.
    pub fn handle_message(&mut self, raw: &Value) -> Option<CalleeMessage> {
        if !self.is_open() {
            return None;
        }
        let message = match CalleeMessage::parse(raw) {
            Ok(message) => message,
            Err(err) => {
                debug!("[{}] dropping message: {}", self.app_id, err);
                return None;
            }
        };

        match &message {
            CalleeMessage::Ready { version, .. } => {
                if self.init_sent {
                    debug!("[{}] repeated ready, init already sent", self.app_id);
                } else {
                    info!("[{}] ready (v{}), sending init", self.app_id, version);
                    self.send(HostMessage::Init(Value::Object(self.init.clone())));
                    self.init_sent = true;
                }
            }
            CalleeMessage::Progress { data, .. } => {
                debug!("[{}] progress: {}", self.app_id, data);
            }
            CalleeMessage::Error { error, .. } => {
                warn!("[{}] error {}: {}", self.app_id, error.code, error.message);
            }
            _ => {}
        }

        if message.requests_teardown() {
            info!("[{}] {}, tearing down", self.app_id, message.kind());
            self.teardown();
        }
        Some(message)
    }

    /// Relay a control command to the app.
    pub fn send_control(&self, action: &str, params: Value) -> bool {
        self.send(HostMessage::Control {
            action: action.to_string(),
            params,
        })
    }

    /// Tell the app the surface is closing, then tear it down.
    pub fn close(&mut self, reason: &str) {
        if !self.is_open() {
            return;
        }
        self.send(HostMessage::Close {
            reason: Some(reason.to_string()),
        });
        self.teardown();
    }

    /// Unmount without telling the app. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut inbound) = self.inbound.take() {
            inbound.release();
            debug!("[{}] surface removed", self.app_id);
        }
    }

    fn send(&self, message: HostMessage) -> bool {
        if !self.is_open() {
            return false;
        }
        let delivered = match self.surface {
            SurfaceKind::Frame => self.callee.dispatch(MESSAGE_EVENT, message.to_wire()),
            SurfaceKind::Layer => self
                .callee
                .dispatch(message.kind().as_str(), message.to_wire()),
        };
        delivered > 0
    }
}
