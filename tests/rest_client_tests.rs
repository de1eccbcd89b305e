//! Integration tests for the REST client: paging and error surfacing
//!
//! Uses wiremock to simulate Graph, SharePoint and Power Platform responses.

use m365_cli::api::entra::EntraClient;
use m365_cli::api::spo::SpoClient;
use m365_cli::api::{Endpoints, RestClient};
use m365_cli::error::M365Error;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let client = RestClient::with_token("test-token", Endpoints::single(&server.uri())).unwrap();
    (server, client)
}

#[tokio::test]
async fn test_get_all_items_follows_graph_next_links() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@odata.nextLink": format!("{}/v1.0/users-page2?$skiptoken=abc", server.uri()),
            "value": [{"id": "1"}, {"id": "2"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users-page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@odata.nextLink": format!("{}/v1.0/users-page3", server.uri()),
            "value": [{"id": "3"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Last page has no value array and no link
    Mock::given(method("GET"))
        .and(path("/v1.0/users-page3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let users: Vec<Value> = client
        .get_all_items(&client.graph_url("users"))
        .await
        .unwrap();

    let ids: Vec<&str> = users.iter().filter_map(|u| u["id"].as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_sharepoint_lists_follow_odata_next_link() {
    let (server, client) = setup().await;
    let web_url = format!("{}/sites/marketing", server.uri());

    Mock::given(method("GET"))
        .and(path("/sites/marketing/_api/web/lists"))
        .and(header("accept", "application/json;odata=nometadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "odata.nextLink": format!("{}/sites/marketing/_api/web/lists-next", server.uri()),
            "value": [{"Title": "Documents"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sites/marketing/_api/web/lists-next"))
        .and(header("accept", "application/json;odata=nometadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"Title": "Site Pages"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let lists = SpoClient::new(&client)
        .list_lists(&web_url, None)
        .await
        .unwrap();
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[1]["Title"], "Site Pages");
}

#[tokio::test]
async fn test_throttled_request_surfaces_upstream_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups/1"))
        .respond_with(
            ResponseTemplate::new(429)
                .append_header("Retry-After", "0")
                .set_body_json(json!({"error": {"code": "TooManyRequests", "message": "Slow down"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = EntraClient::new(&client).get_group("1").await.unwrap_err();
    match err {
        M365Error::ApiError { status, message } => {
            assert_eq!(status, 429);
            assert!(message.starts_with("TooManyRequests: Slow down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_text_error_body_is_surfaced() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/applications"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let err = EntraClient::new(&client).list_apps().await.unwrap_err();
    assert_eq!(err.to_string(), "Service Unavailable");
}

#[tokio::test]
async fn test_graph_error_is_surfaced() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": "Request_ResourceNotFound",
                "message": "Resource 'missing' does not exist or one of its queried reference-property objects are not present."
            }
        })))
        .mount(&server)
        .await;

    let err = EntraClient::new(&client)
        .get_group("missing")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Request_ResourceNotFound: Resource 'missing' does not exist or one of its queried reference-property objects are not present."
    );
}

#[tokio::test]
async fn test_sharepoint_error_is_surfaced() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/sites/missing/_api/web"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "odata.error": {
                "code": "-2147024894, System.IO.FileNotFoundException",
                "message": {"lang": "en-US", "value": "File Not Found."}
            }
        })))
        .mount(&server)
        .await;

    let err = SpoClient::new(&client)
        .get_web(&format!("{}/sites/missing", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().ends_with("File Not Found."));
}

#[tokio::test]
async fn test_group_lookup_by_name_rejects_duplicates() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"id": "a", "displayName": "Marketing"},
                {"id": "b", "displayName": "Marketing"}
            ]
        })))
        .mount(&server)
        .await;

    let err = EntraClient::new(&client)
        .get_group_by_name("Marketing")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Multiple groups with name 'Marketing' found: a, b"
    );
}

#[tokio::test]
async fn test_singleton_policy_is_wrapped_in_list() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/policies/authorizationPolicy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "authorizationPolicy",
            "displayName": "Authorization Policy"
        })))
        .mount(&server)
        .await;

    let policies = EntraClient::new(&client)
        .list_policies(m365_cli::api::entra::PolicyType::Authorization)
        .await
        .unwrap();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0]["id"], "authorizationPolicy");
}
