use mcp_format::{CalleeMessage, GameCompletion, GameProgress, GameStatus, TransportMode};
use mcp_host::{
    CallerConfig, CallerOrchestrator, Embedding, IssuedSession, LaunchContext,
    SessionIssuerClient, SurfaceKind,
};
use mcp_runtime::{CalleeSession, ContextSource, SessionEvent, SessionOptions, SessionState};
use serde_json::json;

fn orchestrator() -> CallerOrchestrator {
    let mut config = CallerConfig::new("https://issuer.example");
    config.default_theme = Some("dark".to_string());
    let client = SessionIssuerClient::new(&config, "caller-jwt").unwrap();
    let session: IssuedSession = serde_json::from_value(json!({
        "session": {
            "id": "sess-1",
            "expires_at": "2026-10-19T12:00:00Z",
            "customer_id": "cust-1",
            "project_id": "proj-1"
        },
        "apps": [{
            "id": "arcade",
            "name": "Arcade",
            "endpoint": "https://arcade.example/index.html",
            "token": "arcade-token",
            "token_expires_at": "2026-10-19T11:00:00Z",
            "response_type": "layer"
        }]
    }))
    .unwrap();
    CallerOrchestrator::new(config, client, session)
}

fn mount(surface: SurfaceKind) -> (Embedding, CalleeSession) {
    let context = LaunchContext::new("game-session-123", "user-456")
        .with_config("difficulty", json!("hard"));
    let embedding = orchestrator().embed("Arcade", &context, surface).unwrap();
    let session =
        CalleeSession::new(SessionOptions::new("corporate-arcade", "1.0.0"), embedding.callee_environment())
            .unwrap();
    (embedding, session)
}

async fn play_to_completion(surface: SurfaceKind, expected_mode: TransportMode) {
    let (mut embedding, mut session) = mount(surface);
    assert_eq!(session.mode(), expected_mode);

    // ready → exactly one init
    let ready = embedding.next_event().await.unwrap();
    assert!(matches!(ready, CalleeMessage::Ready { ref version, .. } if version == "1.0.0"));
    assert!(embedding.init_sent());

    match session.next_event().await {
        Some(SessionEvent::Initialized { context, source }) => {
            assert_eq!(source, ContextSource::Host);
            assert_eq!(context.resource_id.as_deref(), Some("game-session-123"));
            assert_eq!(context.user_id.as_deref(), Some("user-456"));
            assert_eq!(context.customer_id.as_deref(), Some("cust-1"));
            assert_eq!(context.token.as_deref(), Some("arcade-token"));
            assert_eq!(context.theme, "dark");
            assert_eq!(context.config["difficulty"], "hard");
        }
        other => panic!("expected init, got {:?}", other),
    }

    // progress is observational
    session.send_game_progress(&GameProgress {
        score: 150,
        lives: 2,
        level: Some(2),
        elapsed_time: Some(45),
        status: GameStatus::Playing,
    });
    let progress = embedding.next_event().await.unwrap();
    let reported: GameProgress = progress.data_as().unwrap();
    assert_eq!((reported.score, reported.lives, reported.level), (150, 2, Some(2)));
    assert!(embedding.is_open());

    // complete tears the surface down
    session
        .complete_game(&GameCompletion {
            final_score: 500,
            high_score: Some(500),
            level: Some(5),
            time_elapsed: Some(180),
            won: true,
            completed: true,
        })
        .await;
    match embedding.next_event().await {
        Some(CalleeMessage::Complete { success, data, .. }) => {
            assert!(success);
            assert_eq!(data["type"], "game");
            assert_eq!(data["finalScore"], 500);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(!embedding.is_open());
    assert!(embedding.next_event().await.is_none());
    assert!(session.state().is_terminal());
}

#[tokio::test(start_paused = true)]
async fn frame_embedding_runs_the_full_lifecycle() {
    play_to_completion(SurfaceKind::Frame, TransportMode::Iframe).await;
}

#[tokio::test(start_paused = true)]
async fn layer_embedding_runs_the_full_lifecycle() {
    play_to_completion(SurfaceKind::Layer, TransportMode::Layer).await;
}

#[tokio::test(start_paused = true)]
async fn control_and_close_reach_the_callee() {
    let (mut embedding, mut session) = mount(SurfaceKind::Layer);
    embedding.next_event().await.unwrap();
    session.next_event().await.unwrap();

    assert!(embedding.send_control("pause", json!({ "reason": "phone call" })));
    assert_eq!(
        session.next_event().await,
        Some(SessionEvent::Control {
            action: "pause".to_string(),
            params: json!({ "reason": "phone call" }),
        })
    );

    embedding.close("user_navigated");
    assert!(!embedding.is_open());
    assert_eq!(
        session.next_event().await,
        Some(SessionEvent::Closed {
            reason: "user_navigated".to_string()
        })
    );
    assert!(session.state().is_terminal());
}

#[tokio::test(start_paused = true)]
async fn cancelled_callee_is_torn_down() {
    let (mut embedding, mut session) = mount(SurfaceKind::Frame);
    embedding.next_event().await.unwrap();
    session.next_event().await.unwrap();

    session.cancel_with_data("user_cancelled", json!({ "finalScore": 120 }));
    match embedding.next_event().await {
        Some(CalleeMessage::Cancel { reason, data, .. }) => {
            assert_eq!(reason, "user_cancelled");
            assert_eq!(data, Some(json!({ "finalScore": 120 })));
        }
        other => panic!("expected cancel, got {:?}", other),
    }
    assert!(!embedding.is_open());
}

#[tokio::test(start_paused = true)]
async fn callee_without_init_falls_back_to_launch_url() {
    let (embedding, mut session) = mount(SurfaceKind::Frame);
    // The caller never answers the ready; the app reads its launch URL.
    assert!(!embedding.init_sent());

    match session.next_event().await {
        Some(SessionEvent::Initialized { context, source }) => {
            assert_eq!(source, ContextSource::UrlFallback);
            assert_eq!(context.token.as_deref(), Some("arcade-token"));
            assert_eq!(context.resource_id.as_deref(), Some("game-session-123"));
            assert_eq!(context.user_id.as_deref(), Some("user-456"));
        }
        other => panic!("expected fallback init, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Active);
}
