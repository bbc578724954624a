use mcp_format::payload::{cancel_payload, completion_payload, error_payload, progress_payload};
use mcp_format::{
    CalleeMessage, Envelope, ErrorReport, GameProgress, GameStatus, MessageType, QuizProgress,
    VideoCompletion,
};
use serde_json::json;

#[test]
fn game_progress_survives_host_side_parsing() {
    let sent = GameProgress {
        score: 150,
        lives: 2,
        level: Some(3),
        elapsed_time: Some(45),
        status: GameStatus::Playing,
    };
    let envelope = Envelope::new(
        MessageType::Progress,
        "corporate-arcade",
        progress_payload(&sent).unwrap(),
    );

    let text = serde_json::to_string(&envelope.to_wire()).unwrap();
    let received = CalleeMessage::parse(&serde_json::from_str(&text).unwrap()).unwrap();

    match &received {
        CalleeMessage::Progress {
            app_id,
            progress_type,
            ..
        } => {
            assert_eq!(app_id, "corporate-arcade");
            assert_eq!(progress_type.as_deref(), Some("game"));
        }
        other => panic!("expected progress, got {:?}", other),
    }

    let decoded: GameProgress = received.data_as().unwrap();
    assert_eq!(decoded.score, sent.score);
    assert_eq!(decoded.lives, sent.lives);
    assert_eq!(decoded.level, sent.level);
    assert_eq!(decoded, sent);
}

#[test]
fn quiz_progress_is_tagged() {
    let payload = progress_payload(&QuizProgress {
        current_question: 2,
        total_questions: 10,
        correct_answers: 1,
    })
    .unwrap();
    assert_eq!(payload["progressType"], "quiz");
    assert_eq!(payload["data"]["currentQuestion"], 2);
}

#[test]
fn cancel_with_data_matches_the_documented_shape() {
    let wire = Envelope::new(
        MessageType::Cancel,
        "corporate-arcade",
        cancel_payload("user_cancelled", Some(json!({"finalScore": 120}))),
    )
    .to_wire();

    assert_eq!(wire["type"], "mcp:cancel");
    assert_eq!(wire["reason"], "user_cancelled");
    assert_eq!(wire["data"], json!({"finalScore": 120}));

    let parsed = CalleeMessage::parse(&wire).unwrap();
    assert_eq!(
        parsed,
        CalleeMessage::Cancel {
            app_id: "corporate-arcade".into(),
            reason: "user_cancelled".into(),
            data: Some(json!({"finalScore": 120})),
        }
    );
}

#[test]
fn video_completion_parses_back() {
    let wire = Envelope::new(
        MessageType::Complete,
        "player",
        completion_payload(&VideoCompletion {
            last_position: 93.5,
            watched_percent: 100.0,
            completed: true,
        })
        .unwrap(),
    )
    .to_wire();

    let parsed = CalleeMessage::parse(&wire).unwrap();
    assert!(matches!(parsed, CalleeMessage::Complete { success: true, .. }));
    let data: VideoCompletion = parsed.data_as().unwrap();
    assert!(data.completed);
}

#[test]
fn error_envelope_carries_code_and_message() {
    let wire = Envelope::new(
        MessageType::Error,
        "corporate-arcade",
        error_payload(&ErrorReport::new("ASSET_LOAD", "sprite sheet missing")),
    )
    .to_wire();

    let parsed = CalleeMessage::parse(&wire).unwrap();
    assert_eq!(
        parsed,
        CalleeMessage::Error {
            app_id: "corporate-arcade".into(),
            error: ErrorReport::new("ASSET_LOAD", "sprite sheet missing"),
        }
    );
}

#[test]
fn callee_messages_without_app_id_are_rejected() {
    assert!(CalleeMessage::parse(&json!({"type": "mcp:ready", "version": "1.0.0"})).is_err());
}
