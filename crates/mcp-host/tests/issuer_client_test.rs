use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use mcp_host::{
    CallerConfig, CallerOrchestrator, Error, LaunchContext, ResponseType, SessionIssuerClient,
    SurfaceKind,
};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;

const CALLER_JWT: &str = "caller-jwt";

/// How the stub issuer behaves.
#[derive(Debug, Clone, Copy)]
enum Issuer {
    Healthy,
    Rejecting,
    Broken,
}

fn respond(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn issued_session(addr: SocketAddr) -> Value {
    json!({
        "status": "success",
        "session": {
            "id": "sess-1",
            "expires_at": "2026-10-19T12:00:00Z",
            "customer_id": "cust-1",
            "project_id": "proj-1"
        },
        "apps": [
            {
                "id": "arcade",
                "name": "Arcade",
                "endpoint": format!("http://{}/arcade/index.html", addr),
                "token": "arcade-token",
                "token_expires_at": "2026-10-19T11:00:00Z",
                "response_type": "layer",
                "keywords": { "intent": "play_game" }
            },
            {
                "id": "quiz-bot",
                "name": "Quiz Bot",
                "endpoint": format!("http://{}/apps/quiz", addr),
                "token": "quiz-token",
                "token_expires_at": "2026-10-19T11:00:00Z",
                "response_type": "inline"
            }
        ]
    })
}

async fn route(
    issuer: Issuer,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let auth = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let response = match (issuer, method.as_str(), path.as_str()) {
        (Issuer::Broken, _, _) => Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .body(Full::new(Bytes::from_static(b"bad gateway")))
            .unwrap(),
        (_, _, "/mcp/v1/session/init") | (_, _, "/mcp/v1/token/refresh")
            if auth != format!("Bearer {}", CALLER_JWT) =>
        {
            respond(
                StatusCode::UNAUTHORIZED,
                json!({ "status": "error", "error": { "message": "invalid token" } }),
            )
        }
        (Issuer::Rejecting, _, _) => respond(
            StatusCode::OK,
            json!({ "status": "error", "error": { "message": "customer suspended" } }),
        ),
        (Issuer::Healthy, "GET", "/mcp/v1/session/init") => {
            assert_eq!(query, "language=tr");
            respond(StatusCode::OK, issued_session(addr))
        }
        (Issuer::Healthy, "POST", "/mcp/v1/token/refresh") => {
            let app_id = body["app_id"].as_str().unwrap_or_default();
            respond(
                StatusCode::OK,
                json!({
                    "status": "success",
                    "token": format!("refreshed-{}", app_id),
                    "expires_at": "2026-10-19T13:00:00Z"
                }),
            )
        }
        (Issuer::Healthy, "POST", "/apps/quiz") => {
            assert_eq!(auth, "Bearer quiz-token");
            respond(StatusCode::OK, json!({ "answer": "42", "received": body }))
        }
        _ => respond(StatusCode::NOT_FOUND, json!({ "status": "error" })),
    };
    Ok(response)
}

/// Start a stub issuer on an ephemeral port and return its base URL.
async fn spawn_issuer(issuer: Issuer) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let io = TokioIo::new(stream);
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(io, service_fn(move |req| route(issuer, addr, req)))
                    .await;
            });
        }
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn bootstrap_lists_apps_and_builds_launch_url() {
    let base = spawn_issuer(Issuer::Healthy).await;
    let orchestrator = CallerOrchestrator::bootstrap(CallerConfig::new(&base), CALLER_JWT)
        .await
        .unwrap();

    let session = orchestrator.session();
    assert_eq!(session.session.id, "sess-1");
    assert_eq!(session.session.customer_id, "cust-1");
    assert_eq!(session.apps.len(), 2);
    assert_eq!(session.apps[1].response_type, ResponseType::Inline);

    let url = orchestrator
        .launch_url("Arcade", &LaunchContext::new("game-session-123", "user-456"))
        .unwrap();
    assert_eq!(url.path(), "/arcade/index.html");
    assert_eq!(
        url.query(),
        Some("token=arcade-token&resourceId=game-session-123&userId=user-456")
    );
}

#[tokio::test]
async fn rejected_session_blocks_launch() {
    let base = spawn_issuer(Issuer::Rejecting).await;
    let err = CallerOrchestrator::bootstrap(CallerConfig::new(&base), CALLER_JWT)
        .await
        .unwrap_err();

    match err {
        Error::UpstreamSession { status, message } => {
            assert_eq!(status, "error");
            assert_eq!(message, "customer suspended");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn wrong_bearer_is_reported_as_upstream_error() {
    let base = spawn_issuer(Issuer::Healthy).await;
    let client = SessionIssuerClient::new(&CallerConfig::new(&base), "someone-else").unwrap();

    let err = client.init_session().await.unwrap_err();
    assert!(matches!(
        err,
        Error::UpstreamSession { ref message, .. } if message == "invalid token"
    ));
}

#[tokio::test]
async fn non_json_failure_keeps_http_status() {
    let base = spawn_issuer(Issuer::Broken).await;
    let client = SessionIssuerClient::new(&CallerConfig::new(&base), CALLER_JWT).unwrap();

    match client.refresh_token("arcade").await.unwrap_err() {
        Error::UpstreamSession { status, message } => {
            assert_eq!(status, "502 Bad Gateway");
            assert_eq!(message, "bad gateway");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn refreshed_token_is_used_for_later_launches() {
    let base = spawn_issuer(Issuer::Healthy).await;
    let mut orchestrator = CallerOrchestrator::bootstrap(CallerConfig::new(&base), CALLER_JWT)
        .await
        .unwrap();

    let app = orchestrator.refresh_app_token("Arcade").await.unwrap();
    assert_eq!(app.token, "refreshed-arcade");
    assert_eq!(app.token_expires_at.to_rfc3339(), "2026-10-19T13:00:00+00:00");

    let url = orchestrator
        .launch_url("arcade", &LaunchContext::new("r1", "u1"))
        .unwrap();
    assert!(url.query().unwrap().starts_with("token=refreshed-arcade&"));
}

#[tokio::test]
async fn inline_app_receives_context_with_app_token() {
    let base = spawn_issuer(Issuer::Healthy).await;
    let orchestrator = CallerOrchestrator::bootstrap(CallerConfig::new(&base), CALLER_JWT)
        .await
        .unwrap();

    let context = LaunchContext::new("question-7", "user-456").with_param("topic", json!("math"));
    let answer = orchestrator.invoke_inline("quiz-bot", &context).await.unwrap();

    assert_eq!(answer["answer"], "42");
    let received = &answer["received"];
    assert_eq!(received["resourceId"], "question-7");
    assert_eq!(received["userId"], "user-456");
    assert_eq!(received["customerId"], "cust-1");
    assert_eq!(received["projectId"], "proj-1");
    assert_eq!(received["token"], "quiz-token");
    assert_eq!(received["params"]["topic"], "math");
}

#[tokio::test]
async fn response_type_decides_how_an_app_launches() {
    let base = spawn_issuer(Issuer::Healthy).await;
    let orchestrator = CallerOrchestrator::bootstrap(CallerConfig::new(&base), CALLER_JWT)
        .await
        .unwrap();
    let context = LaunchContext::new("r1", "u1");

    assert!(matches!(
        orchestrator.embed("quiz-bot", &context, SurfaceKind::Frame),
        Err(Error::UnsupportedResponseType {
            actual: ResponseType::Inline,
            ..
        })
    ));
    assert!(matches!(
        orchestrator.invoke_inline("arcade", &context).await,
        Err(Error::UnsupportedResponseType {
            expected: ResponseType::Inline,
            ..
        })
    ));
    assert!(matches!(
        orchestrator.launch_url("chess", &context),
        Err(Error::AppNotFound(_))
    ));
}
