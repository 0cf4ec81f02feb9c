//! API integration tests for keygate-server.
//!
//! These tests drive the router in-process: password signup and login, the
//! bearer-protected profile, and both WebAuthn ceremonies end to end with a
//! software authenticator and the ceremony session cookie echoed back.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use keygate_core::password::Params;
use keygate_core::testing::SoftAuthenticator;
use keygate_core::{wire, PasswordHasher};
use keygate_server::{create_router_with_state, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;

const RP_ID: &str = "localhost";
const ORIGIN: &str = "http://localhost:8000";
const PASSWORD: &str = "wonderland1";

/// Relying party for the end-to-end `alice` scenario
const ALICE_RP_ID: &str = "example.test";
const ALICE_ORIGIN: &str = "https://example.test";

/// Build the test router with in-memory storage and cheap password hashing
fn create_test_app() -> Router {
    create_app(Config::default())
}

fn create_app(config: Config) -> Router {
    let state = AppState::in_memory(&config).unwrap();
    let hasher = PasswordHasher::with_params(state.keys.clone(), Params::new(64, 1, 1, None).unwrap());
    create_router_with_state(&config, state.with_password_hasher(hasher)).unwrap()
}

struct TestResponse {
    status: StatusCode,
    set_cookie: Option<String>,
    body: Value,
}

async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    // Keep only `name=value` to echo back like a browser would
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        set_cookie,
        body,
    }
}

async fn signup(app: &Router, username: &str, email: &str) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "username": username,
                "email": email,
                "password": PASSWORD,
                "first_name": "Test",
            })
            .to_string(),
        ))
        .unwrap();
    send(app, request).await
}

async fn login(app: &Router, username: &str, password: &str) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={}&password={}", username, password)))
        .unwrap();
    send(app, request).await
}

/// Sign up and log in, returning the bearer token
async fn user_token(app: &Router, username: &str) -> String {
    let created = signup(app, username, &format!("{}@example.com", username)).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let response = login(app, username, PASSWORD).await;
    assert_eq!(response.status, StatusCode::OK);
    response.body["access_token"].as_str().unwrap().to_string()
}

async fn get_authed(app: &Router, uri: &str, token: &str, cookie: Option<&str>) -> TestResponse {
    let mut builder = Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

async fn post_authed(
    app: &Router,
    uri: &str,
    token: &str,
    cookie: Option<&str>,
    body: String,
) -> TestResponse {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::from(body)).unwrap()).await
}

fn challenge_of(options: &Value) -> Vec<u8> {
    wire::decode("challenge", options["challenge"].as_str().unwrap()).unwrap()
}

/// Run registration for a fresh P-256 authenticator; returns it with the session cookie
async fn register_authenticator(app: &Router, token: &str) -> (SoftAuthenticator, String) {
    let options = get_authed(app, "/api/v1/authn/register/public_key", token, None).await;
    assert_eq!(options.status, StatusCode::OK);
    let cookie = options.set_cookie.expect("ceremony session cookie");

    let authenticator = SoftAuthenticator::p256();
    let credential = authenticator.register(RP_ID, ORIGIN, &challenge_of(&options.body));
    let response = post_authed(
        app,
        "/api/v1/authn/register",
        token,
        Some(&cookie),
        serde_json::to_string(&credential).unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    (authenticator, cookie)
}

// ============================================================================
// Health & Readiness Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();
    let response = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["storage"], "memory");
    assert_eq!(response.body["service"], "keygate-server");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let app = create_test_app();
    let response = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ready"], true);
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_test_app();
    let response = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let paths = response.body["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/v1/auth/token"));
    assert!(paths.contains_key("/api/v1/authn/register"));
    assert!(paths.contains_key("/api/v1/authn/auth/public_key"));
}

// ============================================================================
// Signup & Login Tests
// ============================================================================

#[tokio::test]
async fn test_signup() {
    let app = create_test_app();
    let response = signup(&app, "test", "test@example.com").await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body, json!({"message": "Created user successfully!"}));
}

#[tokio::test]
async fn test_signup_duplicate_username_or_email() {
    let app = create_test_app();
    assert_eq!(
        signup(&app, "test", "test@example.com").await.status,
        StatusCode::CREATED
    );

    let same_username = signup(&app, "test", "other@example.com").await;
    assert_eq!(same_username.status, StatusCode::CONFLICT);

    let same_email = signup(&app, "other", "TEST@example.com").await;
    assert_eq!(same_email.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_signup_with_invalid_email() {
    let app = create_test_app();
    let response = signup(&app, "test", "testexample.com").await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_signup_with_empty_payload() {
    let app = create_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_login_and_me() {
    let app = create_test_app();
    signup(&app, "alice", "alice@example.com").await;

    let response = login(&app, "alice", PASSWORD).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["token_type"], "bearer");
    let token = response.body["access_token"].as_str().unwrap();

    let me = get_authed(&app, "/api/v1/auth/me", token, None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "alice");
    assert_eq!(me.body["email"], "alice@example.com");
    assert_eq!(me.body["is_active"], true);
    assert!(me.body.get("hashed_password").is_none());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = create_test_app();
    signup(&app, "alice", "alice@example.com").await;

    let wrong_password = login(&app, "alice", "not-the-password").await;
    let unknown_user = login(&app, "mallory", PASSWORD).await;

    assert_eq!(wrong_password.status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown_user.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(
        wrong_password.body["error"],
        "Incorrect username or password"
    );
}

#[tokio::test]
async fn test_me_requires_valid_token() {
    let app = create_test_app();

    let missing = send(
        &app,
        Request::builder()
            .uri("/api/v1/auth/me")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body["code"], "INVALID_TOKEN");

    let garbage = get_authed(&app, "/api/v1/auth/me", "not.a.token", None).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.body["code"], "INVALID_TOKEN");
}

// ============================================================================
// WebAuthn Ceremony Tests
// ============================================================================

#[tokio::test]
async fn test_alice_end_to_end() {
    let app = create_app(Config {
        rp_id: ALICE_RP_ID.into(),
        expected_origin: ALICE_ORIGIN.into(),
        ..Config::default()
    });
    let token = user_token(&app, "alice").await;

    // Registration
    let options = get_authed(&app, "/api/v1/authn/register/public_key", &token, None).await;
    assert_eq!(options.status, StatusCode::OK);
    assert_eq!(options.body["rp"]["id"], ALICE_RP_ID);
    assert_eq!(options.body["user"]["name"], "alice");
    assert_eq!(options.body["attestation"], "none");
    let cookie = options.set_cookie.expect("ceremony session cookie");

    let mut authenticator = SoftAuthenticator::p256();
    let credential =
        authenticator.register(ALICE_RP_ID, ALICE_ORIGIN, &challenge_of(&options.body));
    let body = serde_json::to_string(&credential).unwrap();

    let registered =
        post_authed(&app, "/api/v1/authn/register", &token, Some(&cookie), body.clone()).await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.body, json!({"message": "User credential created"}));

    // The first challenge is spent
    let replayed = post_authed(&app, "/api/v1/authn/register", &token, Some(&cookie), body).await;
    assert_eq!(replayed.status, StatusCode::BAD_REQUEST);
    assert_eq!(replayed.body["code"], "NO_CHALLENGE");

    // Authentication
    let options = get_authed(&app, "/api/v1/authn/auth/public_key", &token, Some(&cookie)).await;
    assert_eq!(options.status, StatusCode::OK);
    assert_eq!(options.body["rpId"], ALICE_RP_ID);
    let allowed = options.body["allowCredentials"].as_array().unwrap();
    assert_eq!(allowed.len(), 1);
    assert_eq!(allowed[0]["id"], wire::encode(authenticator.credential_id()));

    authenticator.set_counter(1);
    let assertion =
        authenticator.authenticate(ALICE_RP_ID, ALICE_ORIGIN, &challenge_of(&options.body));
    let verified = post_authed(
        &app,
        "/api/v1/authn/auth",
        &token,
        Some(&cookie),
        serde_json::to_string(&assertion).unwrap(),
    )
    .await;
    assert_eq!(verified.status, StatusCode::OK);
    assert_eq!(verified.body, json!({"message": "OK"}));

    // Same counter on a fresh challenge is a replay
    let options = get_authed(&app, "/api/v1/authn/auth/public_key", &token, Some(&cookie)).await;
    let assertion =
        authenticator.authenticate(ALICE_RP_ID, ALICE_ORIGIN, &challenge_of(&options.body));
    let replay = post_authed(
        &app,
        "/api/v1/authn/auth",
        &token,
        Some(&cookie),
        serde_json::to_string(&assertion).unwrap(),
    )
    .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.body["code"], "AUTHENTICATION_FAILED");

    // A higher counter is accepted again
    authenticator.set_counter(2);
    let options = get_authed(&app, "/api/v1/authn/auth/public_key", &token, Some(&cookie)).await;
    let assertion =
        authenticator.authenticate(ALICE_RP_ID, ALICE_ORIGIN, &challenge_of(&options.body));
    let verified = post_authed(
        &app,
        "/api/v1/authn/auth",
        &token,
        Some(&cookie),
        serde_json::to_string(&assertion).unwrap(),
    )
    .await;
    assert_eq!(verified.status, StatusCode::OK);
}

#[tokio::test]
async fn test_ceremony_endpoints_require_token() {
    let app = create_test_app();

    let response = send(
        &app,
        Request::builder()
            .uri("/api/v1/authn/register/public_key")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_finish_without_session_has_no_challenge() {
    let app = create_test_app();
    let token = user_token(&app, "alice").await;

    let authenticator = SoftAuthenticator::p256();
    let credential = authenticator.register(RP_ID, ORIGIN, &[0u8; 32]);
    let response = post_authed(
        &app,
        "/api/v1/authn/register",
        &token,
        None,
        serde_json::to_string(&credential).unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "NO_CHALLENGE");
}

#[tokio::test]
async fn test_authentication_without_credentials() {
    let app = create_test_app();
    let token = user_token(&app, "alice").await;

    let response = get_authed(&app, "/api/v1/authn/auth/public_key", &token, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["code"], "CREDENTIALS_NOT_FOUND");
}

#[tokio::test]
async fn test_registration_from_wrong_origin_rejected() {
    let app = create_test_app();
    let token = user_token(&app, "alice").await;

    let options = get_authed(&app, "/api/v1/authn/register/public_key", &token, None).await;
    let cookie = options.set_cookie.unwrap();

    let authenticator = SoftAuthenticator::p256();
    let credential =
        authenticator.register(RP_ID, "https://evil.example", &challenge_of(&options.body));
    let response = post_authed(
        &app,
        "/api/v1/authn/register",
        &token,
        Some(&cookie),
        serde_json::to_string(&credential).unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "REGISTRATION_FAILED");
    assert_eq!(response.body["error"], "Credential registration failed");

    // Nothing was stored
    let auth = get_authed(&app, "/api/v1/authn/auth/public_key", &token, Some(&cookie)).await;
    assert_eq!(auth.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_ceremony_body() {
    let app = create_test_app();
    let token = user_token(&app, "alice").await;

    let options = get_authed(&app, "/api/v1/authn/register/public_key", &token, None).await;
    let cookie = options.set_cookie.unwrap();

    let not_json = post_authed(
        &app,
        "/api/v1/authn/register",
        &token,
        Some(&cookie),
        "{not json".to_string(),
    )
    .await;
    assert_eq!(not_json.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_json.body["code"], "INVALID_INPUT");

    let authenticator = SoftAuthenticator::p256();
    let mut credential = authenticator.register(RP_ID, ORIGIN, &challenge_of(&options.body));
    credential.raw_id = wire::encode(b"some-other-id");
    let mismatched = post_authed(
        &app,
        "/api/v1/authn/register",
        &token,
        Some(&cookie),
        serde_json::to_string(&credential).unwrap(),
    )
    .await;
    assert_eq!(mismatched.status, StatusCode::BAD_REQUEST);
    assert_eq!(mismatched.body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_assertion_with_another_users_credential() {
    let app = create_test_app();
    let alice_token = user_token(&app, "alice").await;
    let bob_token = user_token(&app, "bob").await;

    let (alice_authenticator, _) = register_authenticator(&app, &alice_token).await;
    let (_, bob_cookie) = register_authenticator(&app, &bob_token).await;

    let options =
        get_authed(&app, "/api/v1/authn/auth/public_key", &bob_token, Some(&bob_cookie)).await;
    assert_eq!(options.status, StatusCode::OK);

    let assertion = alice_authenticator.authenticate(RP_ID, ORIGIN, &challenge_of(&options.body));
    let response = post_authed(
        &app,
        "/api/v1/authn/auth",
        &bob_token,
        Some(&bob_cookie),
        serde_json::to_string(&assertion).unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["code"], "INVALID_CREDENTIAL");
}

#[tokio::test]
async fn test_registration_lists_existing_credentials() {
    let app = create_test_app();
    let token = user_token(&app, "alice").await;
    let (authenticator, cookie) = register_authenticator(&app, &token).await;

    let options =
        get_authed(&app, "/api/v1/authn/register/public_key", &token, Some(&cookie)).await;
    let excluded = options.body["excludeCredentials"].as_array().unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0]["id"], wire::encode(authenticator.credential_id()));
}
