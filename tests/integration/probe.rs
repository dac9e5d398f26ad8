use convo_console::config::MessagingConfig;
use convo_console::credentials::{CredentialStore, HeaderFormat, API_KEY_HEADER};
use convo_console::error::ProbeError;
use convo_console::probe::{connect, probe};
use convo_console::upstream::build_http_client;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn messaging(urls: &[&MockServer]) -> MessagingConfig {
    MessagingConfig {
        regional_base_urls: urls.iter().map(|s| s.uri()).collect(),
        request_timeout_seconds: 5,
        ..MessagingConfig::default()
    }
}

#[tokio::test]
async fn test_server_error_moves_to_next_base_url() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/contact"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&a)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/contact"))
        .and(query_param("limit", "1"))
        .and(query_param("offset", "0"))
        .and(header(API_KEY_HEADER, "key-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "contact"}])))
        .expect(1)
        .mount(&b)
        .await;

    let http = build_http_client(5).unwrap();
    let found = probe(&http, &messaging(&[&a, &b]), "key-1", None).await.unwrap();
    assert_eq!(found.base_url, b.uri());
    assert_eq!(found.header_format, HeaderFormat::KeyHeader);
    assert_eq!(found.sample[0]["id"], "contact");
}

#[tokio::test]
async fn test_auth_error_stops_immediately() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/contact"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&a)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&b)
        .await;

    let http = build_http_client(5).unwrap();
    let err = probe(&http, &messaging(&[&a, &b]), "key-1", None)
        .await
        .unwrap_err();
    match err {
        ProbeError::Auth {
            base_url,
            status,
            body,
        } => {
            assert_eq!(base_url, a.uri());
            assert_eq!(status, 401);
            assert_eq!(body, "bad key");
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bearer_format_discovered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/contact"))
        .and(header("Authorization", "Bearer key-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/contact"))
        .and(header(API_KEY_HEADER, "key-1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let http = build_http_client(5).unwrap();
    let store = CredentialStore::default();
    let found = connect(&http, &messaging(&[&server]), &store, "key-1", None)
        .await
        .unwrap();
    assert_eq!(found.header_format, HeaderFormat::BearerHeader);

    let cred = store.current().unwrap();
    assert_eq!(cred.base_url, server.uri());
    assert_eq!(cred.header_format, HeaderFormat::BearerHeader);
    assert_eq!(cred.api_key, "key-1");
}

#[tokio::test]
async fn test_preferred_url_tried_first() {
    let preferred = MockServer::start().await;
    let regional = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&preferred)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&regional)
        .await;

    let http = build_http_client(5).unwrap();
    let preferred_uri = format!("{}/", preferred.uri());
    let found = probe(&http, &messaging(&[&regional]), "k", Some(&preferred_uri))
        .await
        .unwrap();
    assert_eq!(found.base_url, preferred.uri());
}

#[tokio::test]
async fn test_nothing_reachable() {
    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&a)
        .await;

    let http = build_http_client(5).unwrap();
    let store = CredentialStore::default();
    let err = connect(&http, &messaging(&[&a]), &store, "k", None)
        .await
        .unwrap_err();
    match err {
        ProbeError::EndpointNotFound { tried, last_error } => {
            assert_eq!(tried, vec![a.uri()]);
            assert!(last_error.is_some());
        }
        other => panic!("expected endpoint-not-found, got {other:?}"),
    }
    assert!(!store.is_connected());
}

#[tokio::test]
async fn test_blank_key_rejected_without_calls() {
    let http = build_http_client(5).unwrap();
    let err = probe(&http, &MessagingConfig::default(), "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::MissingKey));
}
