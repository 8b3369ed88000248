// Integration tests for the PostgREST-style HTTP state store
//
// A mockito server stands in for the hosted backend.

use gamesync::store::{HttpStateStore, HttpStoreConfig, StateStore};
use gamesync::FetchError;
use mockito::Matcher;
use serde_json::json;
use std::io::Write;

fn store_for(server: &mockito::Server, api_key: Option<&str>) -> HttpStateStore {
    HttpStateStore::new(HttpStoreConfig {
        base_url: server.url(),
        api_key: api_key.map(str::to_string),
        ..Default::default()
    })
}

fn row_query(id: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("id".into(), format!("eq.{}", id)),
        Matcher::UrlEncoded("select".into(), "*".into()),
    ])
}

#[tokio::test]
async fn test_fetch_returns_first_row() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/v1/games")
        .match_query(row_query("g1"))
        .match_header("apikey", "anon-key")
        .match_header("authorization", "Bearer anon-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":"g1","turn":3,"state":{"hand":[1,2]}}]"#)
        .create_async()
        .await;

    let store = store_for(&server, Some("anon-key"));
    let snapshot = store.fetch_record("g1").await.unwrap();

    // Forwarded verbatim
    assert_eq!(
        snapshot.record(),
        &json!({"id": "g1", "turn": 3, "state": {"hand": [1, 2]}})
    );

    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_result_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/v1/games")
        .match_query(row_query("missing"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let store = store_for(&server, None);
    let err = store.fetch_record("missing").await.unwrap_err();
    assert_eq!(err, FetchError::NotFound("missing".to_string()));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_network_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/v1/games")
        .match_query(row_query("g1"))
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let store = store_for(&server, None);
    match store.fetch_record("g1").await {
        Err(FetchError::Network(message)) => {
            assert!(message.contains("503"), "{}", message);
            assert!(message.contains("upstream unavailable"), "{}", message);
        }
        other => panic!("expected network error, got {:?}", other),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unexpected_body_is_network_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/v1/games")
        .match_query(row_query("g1"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"g1"}"#)
        .create_async()
        .await;

    let store = store_for(&server, None);
    match store.fetch_record("g1").await {
        Err(FetchError::Network(message)) => assert!(message.contains("object"), "{}", message),
        other => panic!("expected network error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_identifier_is_url_encoded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/v1/games")
        .match_query(row_query("room 7&x"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id":"room 7&x"}]"#)
        .create_async()
        .await;

    let store = store_for(&server, None);
    let snapshot = store.fetch_record("room 7&x").await.unwrap();
    assert_eq!(snapshot.record()["id"], json!("room 7&x"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let store = HttpStateStore::new(HttpStoreConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        ..Default::default()
    });

    assert!(matches!(
        store.fetch_record("g1").await,
        Err(FetchError::Network(_))
    ));
}

#[tokio::test]
async fn test_request_timeout_applies() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/v1/games")
        .match_query(row_query("g1"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_millis(500));
            w.write_all(br#"[{"id":"g1"}]"#)
        })
        .create_async()
        .await;

    let store = HttpStateStore::new(HttpStoreConfig {
        base_url: server.url(),
        request_timeout_ms: 50,
        ..Default::default()
    });

    assert!(matches!(
        store.fetch_record("g1").await,
        Err(FetchError::Network(_))
    ));
}
