use crate::context::{first_object, first_str};
use crate::payload::ErrorReport;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Event name used on the layer bus for the ready announcement.
pub const LAYER_READY_EVENT: &str = "mcp:callee-ready";

/// Direction a message travels across the embedding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the host application.
    HostToCallee,
    /// Sent by the embedded mini-app.
    CalleeToHost,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::HostToCallee => "host-to-callee",
            Direction::CalleeToHost => "callee-to-host",
        })
    }
}

/// The closed set of protocol message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `mcp:init`
    Init,
    /// `mcp:control`
    Control,
    /// `mcp:close`
    Close,
    /// `mcp:ready`
    Ready,
    /// `mcp:progress`
    Progress,
    /// `mcp:complete`
    Complete,
    /// `mcp:cancel`
    Cancel,
    /// `mcp:close-request`
    CloseRequest,
    /// `mcp:error`
    Error,
}

impl MessageType {
    /// All message types, host-bound first.
    pub const ALL: [MessageType; 9] = [
        MessageType::Init,
        MessageType::Control,
        MessageType::Close,
        MessageType::Ready,
        MessageType::Progress,
        MessageType::Complete,
        MessageType::Cancel,
        MessageType::CloseRequest,
        MessageType::Error,
    ];

    /// Wire tag of this message type.
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageType::Init => "mcp:init",
            MessageType::Control => "mcp:control",
            MessageType::Close => "mcp:close",
            MessageType::Ready => "mcp:ready",
            MessageType::Progress => "mcp:progress",
            MessageType::Complete => "mcp:complete",
            MessageType::Cancel => "mcp:cancel",
            MessageType::CloseRequest => "mcp:close-request",
            MessageType::Error => "mcp:error",
        }
    }

    /// Which side of the boundary sends this message.
    pub const fn direction(self) -> Direction {
        match self {
            MessageType::Init | MessageType::Control | MessageType::Close => {
                Direction::HostToCallee
            }
            _ => Direction::CalleeToHost,
        }
    }

    /// Business envelopes may only be emitted by an active session.
    pub const fn is_business(self) -> bool {
        matches!(
            self,
            MessageType::Progress | MessageType::Complete | MessageType::Cancel
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| Error::UnknownMessageType(tag.to_string()))
    }
}

/// Read the `type` tag of a raw message.
pub fn message_tag(value: &Value) -> Result<&str> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::MalformedMessage("message is not a JSON object".to_string()))?;
    match object.get("type") {
        Some(Value::String(tag)) if !tag.is_empty() => Ok(tag),
        Some(_) => Err(Error::MalformedMessage("`type` is not a string".to_string())),
        None => Err(Error::MalformedMessage("missing `type`".to_string())),
    }
}

/// A known tag arriving on the wrong side of the boundary.
fn misdirected(kind: MessageType) -> Error {
    Error::MalformedMessage(format!("{} is a {} message", kind, kind.direction()))
}

/// An outgoing, typed message unit.
///
/// On the wire the payload fields sit next to `type`, `appId` and
/// `timestamp` rather than under a nested key.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message tag.
    pub kind: MessageType,
    /// Identifier of the emitting mini-app.
    pub app_id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Type-specific fields.
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(kind: MessageType, app_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            kind,
            app_id: app_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Flatten into the JSON shape posted to the host.
    pub fn to_wire(&self) -> Value {
        let mut message = self.payload.clone();
        message.insert("type".into(), Value::String(self.kind.as_str().to_string()));
        message.insert("appId".into(), Value::String(self.app_id.clone()));
        message.insert(
            "timestamp".into(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Value::Object(message)
    }
}

/// A message sent by the host to the embedded mini-app.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    /// Context initialization. Holds the raw init body; normalization happens
    /// in [`crate::InvocationContext::from_init`].
    Init(Value),
    /// Control command relayed from the host.
    Control {
        /// Command name, e.g. `pause`.
        action: String,
        /// Command arguments.
        params: Value,
    },
    /// Explicit close directive.
    Close {
        /// Optional reason given by the host.
        reason: Option<String>,
    },
}

impl HostMessage {
    /// Parse a raw incoming message.
    ///
    /// Messages without a `type`, with a callee-bound tag, or missing
    /// required fields are rejected; callers are expected to drop them.
    pub fn parse(value: &Value) -> Result<Self> {
        let kind: MessageType = message_tag(value)?.parse()?;
        let object = value.as_object().ok_or_else(|| {
            Error::MalformedMessage("message is not a JSON object".to_string())
        })?;

        match kind {
            MessageType::Init => {
                if object.get("context").is_some_and(|context| !context.is_object()) {
                    return Err(Error::MalformedMessage(
                        "`context` is not an object".to_string(),
                    ));
                }
                let body = match first_object(object, &["context", "payload"]) {
                    Some(nested) => Value::Object(nested.clone()),
                    None => {
                        let mut flat = object.clone();
                        flat.remove("type");
                        Value::Object(flat)
                    }
                };
                Ok(HostMessage::Init(body))
            }
            MessageType::Control => {
                if let Some(action) = first_str(object, &["action"]) {
                    let params = object
                        .get("params")
                        .or_else(|| object.get("payload"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    return Ok(HostMessage::Control { action, params });
                }

                let nested = first_object(object, &["payload", "data"]).ok_or_else(|| {
                    Error::MalformedMessage("control message without `action`".to_string())
                })?;
                let action = first_str(nested, &["action"]).ok_or_else(|| {
                    Error::MalformedMessage("control message without `action`".to_string())
                })?;
                let params = nested
                    .get("params")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(nested.clone()));
                Ok(HostMessage::Control { action, params })
            }
            MessageType::Close => {
                let reason = first_str(object, &["reason"]).or_else(|| {
                    first_object(object, &["payload", "data"])
                        .and_then(|nested| first_str(nested, &["reason"]))
                });
                Ok(HostMessage::Close { reason })
            }
            other => Err(misdirected(other)),
        }
    }

    /// Message tag of this host message.
    pub fn kind(&self) -> MessageType {
        match self {
            HostMessage::Init(_) => MessageType::Init,
            HostMessage::Control { .. } => MessageType::Control,
            HostMessage::Close { .. } => MessageType::Close,
        }
    }

    /// Build the JSON shape a host posts to the mini-app.
    pub fn to_wire(&self) -> Value {
        let mut message = Map::new();
        message.insert("type".into(), Value::String(self.kind().as_str().to_string()));
        match self {
            HostMessage::Init(context) => {
                message.insert("context".into(), context.clone());
            }
            HostMessage::Control { action, params } => {
                message.insert("action".into(), Value::String(action.clone()));
                message.insert("params".into(), params.clone());
            }
            HostMessage::Close { reason } => {
                if let Some(reason) = reason {
                    message.insert("reason".into(), Value::String(reason.clone()));
                }
            }
        }
        Value::Object(message)
    }
}

/// A message emitted by the embedded mini-app, as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum CalleeMessage {
    /// The mini-app is loaded and listening.
    Ready {
        /// Mini-app identifier.
        app_id: String,
        /// Mini-app version.
        version: String,
        /// Advertised capabilities.
        capabilities: Vec<String>,
    },
    /// Observational progress update.
    Progress {
        /// Mini-app identifier.
        app_id: String,
        /// Category tag (`game`, `quiz`, `video`, ...), if any.
        progress_type: Option<String>,
        /// Progress data.
        data: Value,
    },
    /// The mini-app finished its task.
    Complete {
        /// Mini-app identifier.
        app_id: String,
        /// Whether the mini-app reported success.
        success: bool,
        /// Result data.
        data: Value,
    },
    /// The mini-app was cancelled.
    Cancel {
        /// Mini-app identifier.
        app_id: String,
        /// Cancellation reason.
        reason: String,
        /// Optional data saved at cancellation.
        data: Option<Value>,
    },
    /// The mini-app asks the host to tear down its surface.
    CloseRequest {
        /// Mini-app identifier.
        app_id: String,
    },
    /// The mini-app reported an error.
    Error {
        /// Mini-app identifier.
        app_id: String,
        /// Error code and message.
        error: ErrorReport,
    },
}

impl CalleeMessage {
    /// Parse a message received from the mini-app.
    pub fn parse(value: &Value) -> Result<Self> {
        let kind: MessageType = message_tag(value)?.parse()?;
        let object = value.as_object().ok_or_else(|| {
            Error::MalformedMessage("message is not a JSON object".to_string())
        })?;
        let app_id = first_str(object, &["appId", "app_id"])
            .ok_or_else(|| Error::MalformedMessage(format!("{} without `appId`", kind)))?;

        match kind {
            MessageType::Ready => Ok(CalleeMessage::Ready {
                app_id,
                version: first_str(object, &["version"]).unwrap_or_default(),
                capabilities: object
                    .get("capabilities")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            MessageType::Progress => Ok(CalleeMessage::Progress {
                app_id,
                progress_type: first_str(object, &["progressType"]).or_else(|| {
                    // `type` is taken by the tag, so some emitters nest the category in data.
                    object
                        .get("data")
                        .and_then(Value::as_object)
                        .and_then(|data| first_str(data, &["type"]))
                }),
                data: object
                    .get("data")
                    .or_else(|| object.get("payload"))
                    .cloned()
                    .unwrap_or(Value::Null),
            }),
            MessageType::Complete => {
                let success = match object.get("success") {
                    Some(Value::Bool(flag)) => *flag,
                    _ => first_str(object, &["status"]).as_deref() == Some("completed"),
                };
                Ok(CalleeMessage::Complete {
                    app_id,
                    success,
                    data: object.get("data").cloned().unwrap_or(Value::Null),
                })
            }
            MessageType::Cancel => Ok(CalleeMessage::Cancel {
                app_id,
                reason: first_str(object, &["reason"]).unwrap_or_else(|| "unknown".to_string()),
                data: object.get("data").filter(|data| !data.is_null()).cloned(),
            }),
            MessageType::CloseRequest => Ok(CalleeMessage::CloseRequest { app_id }),
            MessageType::Error => {
                let error = object.get("error").cloned().ok_or_else(|| {
                    Error::MalformedMessage("mcp:error without `error`".to_string())
                })?;
                Ok(CalleeMessage::Error {
                    app_id,
                    error: serde_json::from_value(error)?,
                })
            }
            other => Err(misdirected(other)),
        }
    }

    /// Message tag of this callee message.
    pub fn kind(&self) -> MessageType {
        match self {
            CalleeMessage::Ready { .. } => MessageType::Ready,
            CalleeMessage::Progress { .. } => MessageType::Progress,
            CalleeMessage::Complete { .. } => MessageType::Complete,
            CalleeMessage::Cancel { .. } => MessageType::Cancel,
            CalleeMessage::CloseRequest { .. } => MessageType::CloseRequest,
            CalleeMessage::Error { .. } => MessageType::Error,
        }
    }

    /// Identifier of the emitting mini-app.
    pub fn app_id(&self) -> &str {
        match self {
            CalleeMessage::Ready { app_id, .. }
            | CalleeMessage::Progress { app_id, .. }
            | CalleeMessage::Complete { app_id, .. }
            | CalleeMessage::Cancel { app_id, .. }
            | CalleeMessage::CloseRequest { app_id }
            | CalleeMessage::Error { app_id, .. } => app_id,
        }
    }

    /// Whether the host must tear down the embedding surface.
    pub fn requests_teardown(&self) -> bool {
        matches!(
            self,
            CalleeMessage::Complete { .. }
                | CalleeMessage::Cancel { .. }
                | CalleeMessage::CloseRequest { .. }
        )
    }

    /// Decode the data of a progress or completion message into a typed payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let data = match self {
            CalleeMessage::Progress { data, .. } | CalleeMessage::Complete { data, .. } => data,
            CalleeMessage::Cancel { data: Some(data), .. } => data,
            other => {
                return Err(Error::InvalidField {
                    field: "data",
                    reason: format!("{} carries no data", other.kind()),
                })
            }
        };
        Ok(serde_json::from_value(data.clone())?)
    }
}
