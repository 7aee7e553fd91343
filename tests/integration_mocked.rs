/// Integration tests with a mocked person API
/// Exercises FullContactClient and a full lookup pass without hitting the real service
use std::sync::Arc;
use std::time::Duration;

use busybody::document_store::DocumentStore;
use busybody::orchestrator::LookupOrchestrator;
use busybody::person_client::{FullContactClient, PersonLookupClient, ResponseStyle};
use busybody::store::{DuplicatePolicy, FailureFilter, RecordStore};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create a client pointed at the mock server
fn create_test_client(base_url: &str) -> FullContactClient {
    FullContactClient::new(
        base_url,
        "test_key".to_string(),
        ResponseStyle::Dictionary,
        Duration::ZERO,
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_person_lookup_success() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "status": 200,
        "requestId": "8d1b9a2c-success",
        "likelihood": 0.95,
        "contactInfo": {"givenName": "Bart", "familyName": "Lorang"},
        "demographics": {"ageRange": "25-34", "locationGeneral": "Boulder, Colorado"}
    });

    Mock::given(method("GET"))
        .and(path("/v2/person.json"))
        .and(query_param("email", "bart@fullcontact.com"))
        .and(query_param("apiKey", "test_key"))
        .and(query_param("style", "dictionary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&format!("{}/v2", mock_server.uri()));
    let result = client.get_person("bart@fullcontact.com").await.unwrap();

    assert_eq!(result.status(), 200);
    assert_eq!(result.request_id(), "8d1b9a2c-success");
    let payload = result.payload().unwrap();
    assert_eq!(payload["contactInfo"]["givenName"], "Bart");
}

#[tokio::test]
async fn test_person_lookup_accepted_is_not_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/person.json"))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "status": 202,
            "requestId": "queued-1",
            "message": "Queued for search. Please retry your query within the next 2 minutes."
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.get_person("pending@example.com").await.unwrap();

    assert_eq!(result.status(), 202);
    assert_eq!(result.request_id(), "queued-1");
    assert!(result.message().starts_with("Queued for search"));
    assert!(result.payload().is_none());
}

#[tokio::test]
async fn test_person_lookup_plain_text_error_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/person.json"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let result = client.get_person("boom@example.com").await.unwrap();

    assert_eq!(result.status(), 500);
    assert_eq!(result.message(), "Internal Server Error");
    assert_eq!(result.request_id(), "");
}

#[tokio::test]
async fn test_person_lookup_unreachable_is_transport_error() {
    // Reserve a free port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = create_test_client(&format!("http://{}", addr));
    let err = client.get_person("nobody@example.com").await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_lookup_pass_against_mock_api() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/person.json"))
        .and(query_param("email", "bart@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 200,
            "requestId": "req-bart",
            "contactInfo": {"givenName": "Bart"},
            "socialProfiles": {
                "twitter": [{
                    "typeId": "twitter",
                    "typeName": "Twitter",
                    "id": "5998422",
                    "username": "bartlorang",
                    "followers": 1234,
                    "following": 321
                }]
            }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/person.json"))
        .and(query_param("email", "slow@example.com"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "status": 403,
            "requestId": "req-slow",
            "message": "Usage limits for the provided API Key have been exceeded."
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/person.json"))
        .and(query_param("email", "gone@example.com"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "status": 404,
            "requestId": "req-gone",
            "message": "Searched within the last 24 hours. No results found for this Id."
        })))
        .mount(&mock_server)
        .await;

    let store = Arc::new(DocumentStore::in_memory(DuplicatePolicy::Fail));
    let orchestrator =
        LookupOrchestrator::new(Arc::new(create_test_client(&mock_server.uri())), store.clone());

    let summary = orchestrator
        .run_batch(&["bart@example.com", "slow@example.com", "gone@example.com"])
        .await
        .unwrap();

    assert_eq!(summary.stored, 1);
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.failed, 1);

    let users = store.export_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].first_name.as_deref(), Some("Bart"));
    assert_eq!(users[0].twitter_screen_name.as_deref(), Some("bartlorang"));
    assert_eq!(users[0].twitter_followers, Some(1234));

    let pending = store.pending_entries().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, "req-slow");
    assert!(pending[0].message.starts_with("Usage limits"));

    let all = store.export_failures(FailureFilter::All).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[1].retry_complete);
}
