use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;
use songuse_client::ApiClient;
use songuse_client::ApiRequest;
use songuse_client::ClientConfig;
use songuse_client::CredentialRefresher;
use songuse_client::FetchError;
use songuse_client::RetryConfig;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

use super::client_for;
use super::fast_retry;
use super::seed_tokens;
use super::test_client;

const REFRESH_DELAY: Duration = Duration::from_millis(500);

/// `/songs` answers 200 for the fresh bearer token and 401 otherwise.
async fn mount_protected_songs(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/songs"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let songs: Value = client.auth().get_json("/songs").await.expect("songs");

    assert_eq!(songs, json!([{"id": 1}]));
}

#[tokio::test]
async fn server_errors_exhaust_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .auth()
        .request(ApiRequest::get("/songs"))
        .await
        .expect_err("server error");

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(err.to_string(), "Server error 503");
}

#[tokio::test]
async fn expired_credential_is_refreshed_once() {
    let server = MockServer::start().await;
    mount_protected_songs(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    seed_tokens(&client, "stale");

    let songs: Value = client.auth().get_json("/songs").await.expect("songs");

    assert_eq!(songs, json!([{"id": 1}]));
    assert_eq!(client.session().access_token().as_deref(), Some("fresh"));
    assert_eq!(client.session().refresh_token().as_deref(), Some("r1"));
}

#[tokio::test]
async fn cookie_refresh_renews_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .and(header("cookie", "access_token=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "access_token=fresh; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let songs: Value = client.auth().get_json("/songs").await.expect("songs");

    assert_eq!(songs, json!([]));
}

#[tokio::test]
async fn rejected_refresh_expires_session() {
    let server = MockServer::start().await;
    mount_protected_songs(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    seed_tokens(&client, "stale");

    let err = client
        .auth()
        .request(ApiRequest::get("/songs"))
        .await
        .expect_err("session expired");

    assert_eq!(err, FetchError::SessionExpired);
    assert_eq!(client.session().tokens(), None);
}

#[tokio::test]
async fn second_unauthorized_after_refresh_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .auth()
        .request(ApiRequest::get("/songs"))
        .await
        .expect_err("session expired");

    assert!(err.is_session_expired());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;
    mount_protected_songs(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh"}))
                .set_delay(REFRESH_DELAY),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    seed_tokens(&client, "stale");

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.auth().get_json::<Value>("/songs").await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        let songs = result.expect("join").expect("songs");
        assert_eq!(songs, json!([{"id": 1}]));
    }
    assert!(!client.coordinator().is_refreshing());
    assert_eq!(client.coordinator().pending_waiters(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_refresh_releases_every_waiter() {
    let server = MockServer::start().await;
    mount_protected_songs(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_delay(REFRESH_DELAY))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    seed_tokens(&client, "stale");

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.auth().request(ApiRequest::get("/songs")).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        let err = result.expect("join").expect_err("session expired");
        assert_eq!(err, FetchError::SessionExpired);
    }
    assert_eq!(client.coordinator().pending_waiters(), 0);
}

#[tokio::test]
async fn not_found_is_a_client_error_with_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/songs/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Song not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .auth()
        .request(ApiRequest::get("songs/99"))
        .await
        .expect_err("not found");

    assert_eq!(err.to_string(), "Client error 404");
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.detail_message(), "Song not found");
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    // Bind then release a port so nothing is listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let client = client_for(&format!("http://127.0.0.1:{port}"));

    let err = client
        .auth()
        .request(ApiRequest::get("/songs"))
        .await
        .expect_err("connection refused");

    assert!(matches!(err, FetchError::Network { .. }));
    assert_eq!(err.detail_message(), "Connection error. Please try again.");
}

#[tokio::test]
async fn undecodable_body_is_a_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/songs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .auth()
        .get_json::<Value>("/songs")
        .await
        .expect_err("decode failure");

    assert!(matches!(err, FetchError::Network { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_unauthorized_after_refresh_reuses_new_credential() {
    let server = MockServer::start().await;
    for (route, delay) in [("/a", Duration::ZERO), ("/b", Duration::from_millis(300))] {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"route": route})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(401).set_delay(delay))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh"}))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    seed_tokens(&client, "stale");

    let (a, b) = tokio::join!(
        client.auth().get_json::<Value>("/a"),
        client.auth().get_json::<Value>("/b"),
    );

    assert_eq!(a.expect("a"), json!({"route": "/a"}));
    assert_eq!(b.expect("b"), json!({"route": "/b"}));
    assert_eq!(client.coordinator().generation(), 1);
}

#[tokio::test]
async fn malformed_path_fails_without_retrying() {
    let server = MockServer::start().await;
    let mut config = ClientConfig::with_base_url(server.uri());
    config.retry = RetryConfig {
        base_delay_ms: 10_000,
        ..fast_retry()
    };
    let client = ApiClient::new(config).expect("build client");

    let auth = tokio::time::timeout(
        Duration::from_secs(1),
        client.auth().request(ApiRequest::get("http://[::1")),
    )
    .await
    .expect("no backoff");
    let unauth = tokio::time::timeout(
        Duration::from_secs(1),
        client.unauth().request(ApiRequest::get("http://[::1")),
    )
    .await
    .expect("no backoff");

    for err in [auth.expect_err("invalid url"), unauth.expect_err("invalid url")] {
        assert!(matches!(err, FetchError::Network { .. }));
    }
    assert!(server.received_requests().await.expect("recording").is_empty());
}

/// Refresher that counts calls and always fails.
struct RejectingRefresher {
    calls: AtomicUsize,
}

#[async_trait]
impl CredentialRefresher for RejectingRefresher {
    async fn refresh(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[tokio::test]
async fn custom_refresher_decides_the_outcome() {
    let server = MockServer::start().await;
    mount_protected_songs(&server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let refresher = Arc::new(RejectingRefresher {
        calls: AtomicUsize::new(0),
    });
    let mut config = ClientConfig::with_base_url(server.uri());
    config.retry = fast_retry();
    let client = ApiClient::with_refresher(config, refresher.clone()).expect("build client");
    seed_tokens(&client, "stale");

    let err = client
        .auth()
        .request(ApiRequest::get("/songs"))
        .await
        .expect_err("session expired");

    assert_eq!(err, FetchError::SessionExpired);
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.coordinator().generation(), 0);
}
