//! `ResourceClient` against a `wiremock` server.

use lib_realtime::retrieve::{Resource, ResourceClient};
use project_tests::within;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_root(server: &MockServer) -> String {
    format!("{}/api/v1", server.uri())
}

#[tokio::test]
async fn list_sends_the_bearer_token_to_the_collection_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"course_id": "CSE101"}])))
        .expect(1)
        .mount(&server)
        .await;
    let client = ResourceClient::new(&api_root(&server), Some("tok-123".to_string())).unwrap();

    let response = within(client.list(Resource::Courses)).await.unwrap();

    assert!(response.success);
    assert_eq!(response.status, 200);
    assert_eq!(response.data, Some(json!([{"course_id": "CSE101"}])));
}

#[tokio::test]
async fn update_puts_json_to_the_item_path() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/time-slots/TS1"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"room_id": "B202"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updated": true})))
        .expect(1)
        .mount(&server)
        .await;
    let client = ResourceClient::new(&api_root(&server), None).unwrap();

    let response = within(client.update(
        Resource::TimeSlots,
        "TS1",
        &json!({"room_id": "B202"}),
    ))
    .await
    .unwrap();

    assert_eq!(response.data, Some(json!({"updated": true})));
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn error_status_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/schedule/S404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Schedule not found"})))
        .expect(1)
        .mount(&server)
        .await;
    let client = ResourceClient::new(&api_root(&server), Some("tok".to_string())).unwrap();

    let response = within(client.get(Resource::Schedules, "S404")).await.unwrap();

    assert!(!response.success);
    assert_eq!(response.status, 404);
    assert!(response.data.is_none());
    assert!(response.error_body.unwrap().contains("Schedule not found"));
}

#[tokio::test]
async fn reserved_characters_in_ids_address_the_same_item() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/courses/A%231"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/A%3Fx=1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"course_id": "A?x=1"})))
        .expect(1)
        .mount(&server)
        .await;
    let client = ResourceClient::new(&api_root(&server), None).unwrap();

    let deleted = within(client.delete(Resource::Courses, "A#1")).await.unwrap();
    let fetched = within(client.get(Resource::Courses, "A?x=1")).await.unwrap();

    assert_eq!(deleted.data, Some(json!({"deleted": true})));
    assert_eq!(fetched.data, Some(json!({"course_id": "A?x=1"})));
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.query().is_none()));
}
