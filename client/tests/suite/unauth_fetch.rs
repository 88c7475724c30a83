use pretty_assertions::assert_eq;
use reqwest::Method;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;
use songuse_client::ApiRequest;
use songuse_client::FetchError;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

use super::seed_tokens;
use super::test_client;

#[tokio::test]
async fn unauthorized_is_a_plain_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid credentials"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .unauth()
        .send_json(Method::POST, "/auth/login", &json!({"username": "x"}))
        .await
        .expect_err("unauthorized");

    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert!(matches!(err, FetchError::Client { .. }));
    assert_eq!(err.detail_message(), "Invalid credentials");
}

#[tokio::test]
async fn never_sends_the_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/networks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = test_client(&server);
    seed_tokens(&client, "secret");
    let _: Value = client.unauth().get_json("/networks").await.expect("networks");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let response = client
        .unauth()
        .request(ApiRequest::post("/auth/register"))
        .await
        .expect("registered");

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn validation_errors_join_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [
                {"loc": ["body", "username"], "msg": "field required"},
                {"loc": ["body", "password"], "msg": "too short"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .unauth()
        .request(ApiRequest::post("/auth/register"))
        .await
        .expect_err("unprocessable");

    assert_eq!(err.detail_message(), "field required, too short");
}

#[tokio::test]
async fn non_json_error_body_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/networks"))
        .respond_with(ResponseTemplate::new(418).set_body_string("teapot"))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .unauth()
        .request(ApiRequest::get("/networks"))
        .await
        .expect_err("client error");

    assert_eq!(err.detail_message(), "Request failed with status 418");
}
