//! Integration tests for the HTTP gateway client and a full engine run
//!
//! These tests run the engine against a wiremock gateway, covering chat
//! connection, membership checks, platform error names, rate limiting and
//! losing the gateway in the middle of a run.

use std::sync::Arc;
use std::time::Duration;

use progressstore::{Checkpoint, CheckpointStore};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{any, body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use inviter::config::{RunConfig, ThrottlePolicy};
use inviter::platform::{GatewayClient, MembershipStatus, Platform, PlatformError};
use inviter::{Identity, InvitationEngine, InviteError};

const TOKEN: &str = "secret-token";

// =============================================================================
// Test Helpers
// =============================================================================

fn ids(handles: &[&str]) -> Vec<Identity> {
    handles.iter().map(|h| Identity::parse(h).unwrap()).collect()
}

fn fast_pacing() -> RunConfig {
    RunConfig {
        initial_delay_secs: 0,
        delay_increment_secs: 1,
        max_delay_secs: 5,
        chunk_size: 2,
        chunk_pause_secs: 0,
        on_throttle: ThrottlePolicy::MarkProcessed,
    }
}

fn error_body(kind: &str) -> serde_json::Value {
    json!({ "error": { "code": 400, "type": kind, "message": kind } })
}

async fn mount_chat(server: &MockServer, can_invite: bool) {
    Mock::given(method("GET"))
        .and(path("/chats/my_chat"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": -100123, "title": "My Chat" })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/chats/-100123/members/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "administrator",
            "privileges": { "can_invite_users": can_invite }
        })))
        .mount(server)
        .await;
}

async fn mount_user(server: &MockServer, handle: &str, id: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/users/{}", handle)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id, "username": handle })))
        .mount(server)
        .await;
}

async fn mount_add(server: &MockServer, user_id: i64, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/chats/-100123/members"))
        .and(body_json(json!({ "user_id": user_id })))
        .respond_with(response)
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> GatewayClient {
    GatewayClient::new(&server.uri(), TOKEN, Duration::from_secs(5)).unwrap()
}

// =============================================================================
// Client Tests
// =============================================================================

#[tokio::test]
async fn test_get_chat_and_privileges() {
    let server = MockServer::start().await;
    mount_chat(&server, true).await;
    let client = client(&server);

    let chat = client.get_chat("my_chat").await.unwrap();
    assert_eq!(chat.id, -100123);
    assert_eq!(chat.title, "My Chat");

    let privileges = client.self_privileges(&chat).await.unwrap();
    assert!(privileges.can_invite_users);
}

#[tokio::test]
async fn test_wrong_token_is_not_authorized() {
    let server = MockServer::start().await;
    mount_chat(&server, true).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .with_priority(10)
        .mount(&server)
        .await;

    let err = client(&server).get_chat("my_chat").await;
    assert!(err.is_ok(), "the right token must still pass: {err:?}");

    let client = GatewayClient::new(&server.uri(), "wrong", Duration::from_secs(5)).unwrap();
    let err = client.get_chat("my_chat").await.unwrap_err();
    assert!(matches!(&err, PlatformError::Unauthorized(m) if m == "invalid token"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_slow_gateway_times_out_as_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats/my_chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": -100123, "title": "My Chat" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    let client = GatewayClient::new(&server.uri(), TOKEN, Duration::from_millis(300)).unwrap();

    let err = client.get_chat("my_chat").await.unwrap_err();
    assert!(matches!(err, PlatformError::Disconnected(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unavailable_gateway_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream session lost"))
        .mount(&server)
        .await;

    let err = client(&server).get_chat("my_chat").await.unwrap_err();
    assert!(err.is_fatal(), "got {err:?}");
}

#[tokio::test]
async fn test_membership_lookup() {
    let server = MockServer::start().await;
    mount_chat(&server, true).await;
    mount_user(&server, "carol", 3).await;
    Mock::given(method("GET"))
        .and(path("/chats/-100123/members/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "creator" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chats/-100123/members/4"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body("USER_NOT_PARTICIPANT")))
        .mount(&server)
        .await;
    let client = client(&server);

    let chat = client.get_chat("my_chat").await.unwrap();
    let carol = client.resolve_identity(&Identity::parse("carol").unwrap()).await.unwrap();
    assert_eq!(
        client.membership(&chat, &carol).await.unwrap(),
        Some(MembershipStatus::Owner)
    );

    let mut stranger = carol.clone();
    stranger.id = 4;
    assert_eq!(
        client.membership(&chat, &stranger).await.unwrap(),
        Some(MembershipStatus::NotMember)
    );
}

#[tokio::test]
async fn test_rate_limit_header() {
    let server = MockServer::start().await;
    mount_chat(&server, true).await;
    mount_user(&server, "dave", 4).await;
    mount_add(
        &server,
        4,
        ResponseTemplate::new(429).insert_header("retry-after", "30"),
    )
    .await;
    let client = client(&server);

    let chat = client.get_chat("my_chat").await.unwrap();
    let dave = client.resolve_identity(&Identity::parse("dave").unwrap()).await.unwrap();
    let err = client.add_member(&chat, &dave).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_unreachable_gateway_is_fatal() {
    let client = GatewayClient::new("http://127.0.0.1:1", TOKEN, Duration::from_secs(2)).unwrap();
    let err = client.get_chat("my_chat").await.unwrap_err();
    assert!(err.is_fatal(), "expected a fatal error, got {err:?}");
}

// =============================================================================
// Engine Tests
// =============================================================================

#[tokio::test]
async fn test_full_run_against_gateway() {
    let server = MockServer::start().await;
    mount_chat(&server, true).await;

    // alice: invited
    mount_user(&server, "alice", 1).await;
    mount_add(&server, 1, ResponseTemplate::new(200).set_body_json(json!({ "ok": true }))).await;

    // carol: already an administrator
    mount_user(&server, "carol", 3).await;
    Mock::given(method("GET"))
        .and(path("/chats/-100123/members/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "administrator" })))
        .mount(&server)
        .await;

    // bob: privacy restricted
    mount_user(&server, "bob", 2).await;
    mount_add(
        &server,
        2,
        ResponseTemplate::new(403).set_body_json(error_body("USER_PRIVACY_RESTRICTED")),
    )
    .await;

    // ghost: does not exist
    Mock::given(method("GET"))
        .and(path("/users/ghost"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body("USERNAME_NOT_OCCUPIED")))
        .mount(&server)
        .await;

    // dave: flood wait
    mount_user(&server, "dave", 4).await;
    mount_add(
        &server,
        4,
        ResponseTemplate::new(420).set_body_json(error_body("FLOOD_WAIT_0")),
    )
    .await;

    let temp = TempDir::new().unwrap();
    let checkpoint_path = temp.path().join("progress.json");
    let store = CheckpointStore::new(&checkpoint_path, 0);
    let engine = InvitationEngine::new(Arc::new(client(&server)), fast_pacing(), store);

    let summary = engine
        .run(
            "my_chat",
            &ids(&["alice", "carol", "bob", "ghost", "dave"]),
            Checkpoint::fresh(0),
        )
        .await
        .unwrap();

    assert_eq!(summary.successes, 1);
    assert_eq!(summary.skips, 2);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.throttles, 1);
    assert_eq!(summary.total_batches, 3);
    assert_eq!(summary.final_delay_secs, 1);
    assert!(summary.checkpoint_deleted);
    assert!(!checkpoint_path.exists());
}

fn saved_checkpoint(path: &std::path::Path) -> Checkpoint {
    let mut checkpoint = Checkpoint::fresh(0);
    checkpoint.processed.insert("earlier".to_string());
    checkpoint.last_completed_batch = 1;
    std::fs::write(path, serde_json::to_string(&checkpoint).unwrap()).unwrap();
    checkpoint
}

#[tokio::test]
async fn test_gateway_timeout_mid_run_keeps_checkpoint() {
    let server = MockServer::start().await;
    mount_chat(&server, true).await;
    Mock::given(method("GET"))
        .and(path_regex("^/users/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": 1, "username": "alice" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let checkpoint_path = temp.path().join("progress.json");
    let checkpoint = saved_checkpoint(&checkpoint_path);
    let client = GatewayClient::new(&server.uri(), TOKEN, Duration::from_millis(300)).unwrap();
    let mut pacing = fast_pacing();
    pacing.chunk_size = 1;
    let engine = InvitationEngine::new(Arc::new(client), pacing, CheckpointStore::new(&checkpoint_path, 0));

    let result = engine
        .run("my_chat", &ids(&["p0", "p1", "alice", "bob"]), checkpoint)
        .await;

    assert!(
        matches!(result, Err(InviteError::Platform(PlatformError::Disconnected(_)))),
        "got {result:?}"
    );
    let saved = CheckpointStore::new(&checkpoint_path, 0).try_load().await.unwrap().unwrap();
    assert_eq!(saved.last_completed_batch, 1);
    assert!(!saved.processed.contains("alice"));
}

#[tokio::test]
async fn test_expired_token_mid_run_keeps_checkpoint() {
    let server = MockServer::start().await;
    mount_chat(&server, true).await;
    Mock::given(method("GET"))
        .and(path_regex("^/users/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let checkpoint_path = temp.path().join("progress.json");
    let checkpoint = saved_checkpoint(&checkpoint_path);
    let engine = InvitationEngine::new(
        Arc::new(client(&server)),
        fast_pacing(),
        CheckpointStore::new(&checkpoint_path, 0),
    );

    let result = engine.run("my_chat", &ids(&["alice", "bob", "carol"]), checkpoint).await;

    assert!(matches!(
        result,
        Err(InviteError::Platform(PlatformError::Unauthorized(_)))
    ));
    assert!(checkpoint_path.exists());

    let requests = server.received_requests().await.unwrap();
    let lookups = requests.iter().filter(|r| r.url.path().starts_with("/users/")).count();
    assert_eq!(lookups, 1);
}

#[tokio::test]
async fn test_run_without_invite_rights() {
    let server = MockServer::start().await;
    mount_chat(&server, false).await;

    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path().join("progress.json"), 0);
    let engine = InvitationEngine::new(Arc::new(client(&server)), fast_pacing(), store);

    let result = engine.run("my_chat", &ids(&["alice"]), Checkpoint::fresh(0)).await;
    assert!(matches!(result, Err(InviteError::Permission { .. })));

    let requests = server.received_requests().await.unwrap();
    assert!(!requests.iter().any(|r| r.url.path().starts_with("/users/")));
}
