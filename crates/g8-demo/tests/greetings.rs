//! End-to-end tests of the greeting API through the local HTTP adapter.

use axum_test::TestServer;
use g8::HandlerConfig;
use g8_demo::{endpoints, Greeting, CODE_INVALID_NAME};
use http::StatusCode;
use serde_json::{json, Value};

fn server() -> TestServer {
    let config = HandlerConfig::new("greetings").with_build_version("test-build");
    let app = g8_http::router(endpoints(config)).unwrap();
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_create_greeting() {
    let response = server()
        .post("/greetings")
        .json(&json!({ "name": "Ada" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    assert_eq!(response.header("content-type"), "application/json");
    assert_eq!(response.header("build-version"), "test-build");
    assert!(!response.header("correlation-id").is_empty());
    assert_eq!(
        response.json::<Greeting>(),
        Greeting {
            message: "Hello, Ada!".to_string()
        }
    );
}

#[tokio::test]
async fn test_create_greeting_rejects_empty_name() {
    let response = server()
        .post("/greetings")
        .json(&json!({ "name": "" }))
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], CODE_INVALID_NAME);
}

#[tokio::test]
async fn test_create_greeting_rejects_missing_name() {
    let response = server()
        .post("/greetings")
        .json(&json!({}))
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], CODE_INVALID_NAME);
}

#[tokio::test]
async fn test_create_greeting_rejects_malformed_body() {
    let response = server()
        .post("/greetings")
        .text("{not json")
        .expect_failure()
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_REQUEST_BODY");
}

#[tokio::test]
async fn test_get_greeting() {
    let response = server().get("/greetings/Grace").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "message": "Hello, Grace!" }));
}

#[tokio::test]
async fn test_get_greeting_decodes_name() {
    let response = server().get("/greetings/John%20Doe").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.json::<Greeting>(),
        Greeting {
            message: "Hello, John Doe!".to_string()
        }
    );
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let response = server()
        .get("/greetings/Grace")
        .add_header(
            http::HeaderName::from_static("correlation-id"),
            http::HeaderValue::from_static("corr-42"),
        )
        .await;

    assert_eq!(response.header("correlation-id"), "corr-42");
}

#[tokio::test]
async fn test_unknown_method_is_not_allowed() {
    let response = server().delete("/greetings").expect_failure().await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}
