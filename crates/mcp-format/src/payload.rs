//! Typed payloads for progress, completion, cancellation and error envelopes.
//!
//! These are pure shaping helpers: each produces the field map that sits next
//! to `type`/`appId`/`timestamp` on the wire. Values such as high scores are
//! passed through as given.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A progress payload with an optional category tag.
pub trait ProgressReport: Serialize {
    /// Value of `progressType`, if the report belongs to a category.
    const PROGRESS_TYPE: Option<&'static str>;
}

/// A completion payload with an optional category tag.
pub trait CompletionReport: Serialize {
    /// Value of `data.type`, if the report belongs to a category.
    const COMPLETION_TYPE: Option<&'static str>;
}

/// Generic progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Units done.
    pub current: u64,
    /// Units overall.
    pub total: u64,
    /// Optional status line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressReport for Progress {
    const PROGRESS_TYPE: Option<&'static str> = None;
}

/// Free-form progress data.
impl ProgressReport for Value {
    const PROGRESS_TYPE: Option<&'static str> = None;
}

/// Play state reported with game progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Game running.
    Playing,
    /// Game paused.
    Paused,
    /// Game over.
    Gameover,
}

/// Progress of a game-like resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProgress {
    /// Current score.
    pub score: i64,
    /// Remaining lives.
    pub lives: u32,
    /// Current level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Seconds played so far.
    #[serde(
        default,
        alias = "timeElapsed",
        skip_serializing_if = "Option::is_none"
    )]
    pub elapsed_time: Option<u64>,
    /// Play state.
    pub status: GameStatus,
}

impl ProgressReport for GameProgress {
    const PROGRESS_TYPE: Option<&'static str> = Some("game");
}

/// Progress through a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    /// 1-based index of the question on screen.
    pub current_question: u32,
    /// Number of questions.
    pub total_questions: u32,
    /// Correct answers so far.
    pub correct_answers: u32,
}

impl ProgressReport for QuizProgress {
    const PROGRESS_TYPE: Option<&'static str> = Some("quiz");
}

/// Playback position of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgress {
    /// Position in seconds.
    pub position: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Watched share, 0-100.
    pub percent: f64,
}

impl ProgressReport for VideoProgress {
    const PROGRESS_TYPE: Option<&'static str> = Some("video");
}

/// Free-form completion data.
impl CompletionReport for Value {
    const COMPLETION_TYPE: Option<&'static str> = None;
}

/// Result of a finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCompletion {
    /// Score at the end of the run.
    pub final_score: i64,
    /// Best score known to the game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_score: Option<i64>,
    /// Level reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Seconds played.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_elapsed: Option<u64>,
    /// Whether the player won.
    pub won: bool,
    /// Whether the run was played to the end.
    pub completed: bool,
}

impl CompletionReport for GameCompletion {
    const COMPLETION_TYPE: Option<&'static str> = Some("game");
}

/// Result of a finished quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCompletion {
    /// Score awarded.
    pub score: f64,
    /// Whether the pass mark was reached.
    pub passed: bool,
    /// Number of questions.
    pub total_questions: u32,
    /// Correct answers.
    pub correct_answers: u32,
}

impl CompletionReport for QuizCompletion {
    const COMPLETION_TYPE: Option<&'static str> = Some("quiz");
}

/// Result of a watched video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCompletion {
    /// Last playback position in seconds.
    pub last_position: f64,
    /// Watched share, 0-100.
    pub watched_percent: f64,
    /// Whether the video was watched to the end.
    pub completed: bool,
}

impl CompletionReport for VideoCompletion {
    const COMPLETION_TYPE: Option<&'static str> = Some("video");
}

/// Error details carried by `mcp:error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorReport {
    /// Create a new error report.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Fields of `mcp:ready`.
pub fn ready_payload(version: &str, capabilities: &[String]) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("version".into(), Value::String(version.to_string()));
    payload.insert(
        "capabilities".into(),
        Value::Array(capabilities.iter().cloned().map(Value::String).collect()),
    );
    payload
}

/// Fields of `mcp:progress`.
pub fn progress_payload<P: ProgressReport>(report: &P) -> Result<Map<String, Value>> {
    let mut payload = Map::new();
    if let Some(kind) = P::PROGRESS_TYPE {
        payload.insert("progressType".into(), Value::String(kind.to_string()));
    }
    payload.insert("data".into(), serde_json::to_value(report)?);
    Ok(payload)
}

/// Fields of `mcp:complete`.
pub fn completion_payload<C: CompletionReport>(report: &C) -> Result<Map<String, Value>> {
    let mut data = serde_json::to_value(report)?;
    if let (Some(kind), Value::Object(fields)) = (C::COMPLETION_TYPE, &mut data) {
        fields.insert("type".into(), Value::String(kind.to_string()));
    }

    let mut payload = Map::new();
    payload.insert("status".into(), Value::String("completed".into()));
    payload.insert("success".into(), Value::Bool(true));
    payload.insert("data".into(), data);
    Ok(payload)
}

/// Fields of `mcp:cancel`.
pub fn cancel_payload(reason: &str, data: Option<Value>) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("status".into(), Value::String("cancelled".into()));
    payload.insert("reason".into(), Value::String(reason.to_string()));
    if let Some(data) = data {
        payload.insert("data".into(), data);
    }
    payload
}

/// Fields of `mcp:error`.
pub fn error_payload(report: &ErrorReport) -> Map<String, Value> {
    let mut error = Map::new();
    error.insert("code".into(), Value::String(report.code.clone()));
    error.insert("message".into(), Value::String(report.message.clone()));

    let mut payload = Map::new();
    payload.insert("error".into(), Value::Object(error));
    payload
}
