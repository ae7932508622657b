use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use body_tracker::codec;
use body_tracker::errors::RemoteError;
use body_tracker::models::{Credentials, MetricEntry, MetricKey, Phase, Snapshot};
use body_tracker::remote::{GithubStore, RemoteStore};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const CONTENTS_PATH: &str = "/repos/octo/health/contents/body-tracker.json";

fn credentials() -> Credentials {
    Credentials {
        token: "test-token".to_string(),
        owner: "octo".to_string(),
        repo: "health".to_string(),
        connected: true,
    }
}

fn store_for(server: &MockServer) -> GithubStore {
    GithubStore::new(server.uri(), "body-tracker.json", &credentials()).unwrap()
}

fn sample_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::default();
    snapshot.entries.insert(
        "2024-01-01".to_string(),
        MetricEntry::default().with_value(MetricKey::Weight, "80"),
    );
    snapshot.phases.push(Phase {
        id: 1,
        name: "Прогресс über alles ✓".to_string(),
        start: "2024-01-01".to_string(),
        end: String::new(),
        goals: BTreeMap::new(),
    });
    snapshot
}

/// Base64 wrapped at 60 columns, the way the contents API returns it.
fn wrapped_content(snapshot: &Snapshot) -> String {
    let encoded = codec::encode_content(snapshot).unwrap();
    encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| format!("{}\n", std::str::from_utf8(chunk).unwrap()))
        .collect()
}

#[tokio::test]
async fn fetch_decodes_wrapped_multibyte_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": wrapped_content(&sample_snapshot()),
            "sha": "abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let document = store_for(&server).fetch().await.unwrap().unwrap();
    assert_eq!(document.snapshot, sample_snapshot());
    assert_eq!(document.version.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn missing_document_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    assert!(store_for(&server).fetch().await.unwrap().is_none());
}

#[tokio::test]
async fn corrupted_remote_content_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": STANDARD.encode("{\"entries\": [oops"),
            "sha": "abc123"
        })))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch().await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn store_sends_version_token_and_returns_new_one() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .and(body_partial_json(json!({ "sha": "abc123" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": { "sha": "def456" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let version = store_for(&server)
        .store(&sample_snapshot(), Some("abc123"))
        .await
        .unwrap();
    assert_eq!(version.as_deref(), Some("def456"));

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let content = body["content"].as_str().unwrap();
    assert_eq!(codec::decode_content(content).unwrap(), sample_snapshot());
}

#[tokio::test]
async fn first_write_omits_version_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "content": { "sha": "first" }
        })))
        .mount(&server)
        .await;

    store_for(&server).store(&Snapshot::default(), None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("sha").is_none());
}

#[tokio::test]
async fn version_mismatch_is_a_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "is at 999 but expected abc123"
        })))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .store(&sample_snapshot(), Some("abc123"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn bad_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = store_for(&server).fetch().await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized));
}

#[tokio::test]
async fn commit_count_comes_from_last_page_link() {
    let server = MockServer::start().await;
    let page = |n: u32| {
        format!(
            "<{}/repos/octo/health/commits?since=2024-01-01T00%3A00%3A00Z&per_page=1&page={n}>",
            server.uri()
        )
    };
    let last = format!("{}; rel=\"next\", {}; rel=\"last\"", page(2), page(6));
    Mock::given(method("GET"))
        .and(path("/repos/octo/health/commits"))
        .and(query_param("per_page", "1"))
        .and(query_param("since", "2024-01-01T00:00:00Z"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", last.as_str())
                .set_body_json(json!([{ "sha": "a" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(store_for(&server).commits_since(since).await.unwrap(), 6);
}

#[tokio::test]
async fn commit_count_without_link_uses_page_length() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/health/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(store_for(&server).commits_since(since).await.unwrap(), 0);
}
