//! Jira client tests (using WireMock)
//! These run against a local mock server, not a real tracker site.

use serde_json::json;
use warden_authz::{JiraClient, TrackerClient, TrackerError};
use warden_config::Credentials;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASIC_AUTH: &str = "Basic Ym90QGFjbWUuaW86czNjcmV0";

fn create_test_client(base_url: &str) -> JiraClient {
    JiraClient::new(&Credentials {
        site_url: base_url.to_string(),
        email: "bot@acme.io".to_string(),
        api_token: "s3cret".to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn test_search_posts_jql() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .and(header("authorization", BASIC_AUTH))
        .and(body_json(json!({
            "jql": "key = \"OPS-5\" AND (watcher = currentUser())",
            "maxResults": 1,
            "fields": ["key"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{ "id": "10001", "key": "OPS-5", "fields": {} }],
            "isLast": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let issues = client
        .search(r#"key = "OPS-5" AND (watcher = currentUser())"#, 1)
        .await
        .unwrap();

    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].key, "OPS-5");
}

#[tokio::test]
async fn test_search_without_issues_field() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "isLast": true })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    assert!(client.search("project = OPS", 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_issue_project_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/OPS-5"))
        .and(query_param("fields", "project"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "OPS-5",
            "fields": { "project": { "id": "10000", "key": "OPS", "name": "Operations" } }
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&format!("{}/", mock_server.uri()));
    assert_eq!(client.fetch_issue_project_key("OPS-5").await.unwrap(), "OPS");
}

#[tokio::test]
async fn test_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = client.search("project = OPS", 1).await.unwrap_err();
    assert!(matches!(err, TrackerError::Unauthorized { status: 401 }));
}

#[tokio::test]
async fn test_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/NOPE-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorMessages": ["Issue does not exist or you do not have permission to see it."]
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = client.fetch_issue_project_key("NOPE-1").await.unwrap_err();
    assert!(matches!(err, TrackerError::NotFound(key) if key == "NOPE-1"));
}

#[tokio::test]
async fn test_bad_request_keeps_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search/jql"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"errorMessages":["Field 'issueFunction' does not exist"]}"#),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    match client.search("issueFunction in commented(x)", 1).await.unwrap_err() {
        TrackerError::Status { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("issueFunction"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/OPS-5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = client.fetch_issue_project_key("OPS-5").await.unwrap_err();
    assert!(matches!(err, TrackerError::Decode(_)));
}

#[test]
fn test_invalid_site_url() {
    let err = JiraClient::new(&Credentials {
        site_url: "not a url".to_string(),
        email: "bot@acme.io".to_string(),
        api_token: "s3cret".to_string(),
    })
    .unwrap_err();
    assert!(matches!(err, TrackerError::Transport(_)));
}
