//! Integration tests for the Firestore backend using wiremock
//!
//! These tests mock the Firestore REST API to verify request shapes and
//! error mapping.

use datagate_core::{
    Backend, BackendKind, Conflict, Connector, Error, NotFound, TenantDescriptor, TenantToken,
    options::{ArrayAction, ArrayMutation, InsertOptions, UpdateOptions},
    query::FindQuery,
};
use datagate_firestore::FirestoreConnector;
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing},
};

const ROOT: &str = "/v1/projects/demo/databases/(default)/documents";

fn tenant(server: &MockServer) -> TenantDescriptor {
    TenantDescriptor {
        token: TenantToken::new("fs-token").unwrap(),
        backend: BackendKind::ManagedDocument,
        display_id: "mobile".to_string(),
        connection: json!({
            "projectId": "demo",
            "baseUrl": format!("{}/v1", server.uri()),
            "accessToken": "test-token"
        }),
    }
}

fn doc(id: &str, fields: Value) -> Value {
    json!({
        "name": format!("projects/demo/databases/(default)/documents/users/{}", id),
        "fields": fields,
        "createTime": "2024-01-01T00:00:00.000000Z",
        "updateTime": "2024-01-01T00:00:00.000000Z"
    })
}

async fn mount_probe(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("{}:listCollectionIds", ROOT)))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"collectionIds": ["users", "orders"]})),
        )
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> Arc<dyn Backend> {
    mount_probe(server).await;
    FirestoreConnector::new()
        .unwrap()
        .connect(&tenant(server))
        .await
        .unwrap()
}

fn record(value: Value) -> datagate_core::Record {
    value.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_connect_fails_when_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}:listCollectionIds", ROOT)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let result = FirestoreConnector::new()
        .unwrap()
        .connect(&tenant(&server))
        .await;
    match result {
        Err(Error::BackendUnavailable(msg)) => {
            assert_eq!(msg, "Missing or insufficient permissions.")
        }
        Err(other) => panic!("Expected unavailable, got {:?}", other),
        Ok(_) => panic!("Expected unavailable, got a handle"),
    }
}

#[tokio::test]
async fn test_list_all_follows_page_tokens() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/users", ROOT)))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [doc("b", json!({"n": {"integerValue": "2"}}))]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/users", ROOT)))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [doc("a", json!({"n": {"integerValue": "1"}}))],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let records = backend.list_all("users", None).await.unwrap();
    assert_eq!(
        records.into_iter().map(Value::Object).collect::<Vec<_>>(),
        vec![json!({"id": "a", "n": 1}), json!({"id": "b", "n": 2})]
    );
}

#[tokio::test]
async fn test_list_collections_sorted() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;
    assert_eq!(
        backend.list_collections().await.unwrap(),
        vec!["orders", "users"]
    );
}

#[tokio::test]
async fn test_get_missing_document() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/users/nope", ROOT)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Document not found", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    assert!(matches!(
        backend.get_by_id("users", "nope", None).await,
        Err(Error::NotFound(NotFound::Document))
    ));
}

#[tokio::test]
async fn test_insert_rejects_duplicate_unique_field() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", ROOT)))
        .and(body_partial_json(json!({
            "structuredQuery": {"limit": 1, "from": [{"collectionId": "users"}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"document": doc("a", json!({"email": {"stringValue": "a@b.com"}})), "readTime": "2024-01-01T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let options = InsertOptions {
        unique_fields: vec![vec!["email".to_string()], vec!["email".to_string()]],
        ..Default::default()
    };
    match backend
        .insert("users", record(json!({"email": "a@b.com"})), &options)
        .await
    {
        Err(Error::Conflict(Conflict::DuplicateFields(fields))) => assert_eq!(fields, vec!["email"]),
        other => panic!("Expected duplicate, got {:?}", other),
    }
}

#[tokio::test]
async fn test_insert_writes_typed_fields() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", ROOT)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"readTime": "2024-01-01T00:00:00Z"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/users", ROOT)))
        .and(body_partial_json(json!({
            "fields": {"email": {"stringValue": "a@b.com"}, "age": {"integerValue": "30"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc(
            "gen1",
            json!({
                "email": {"stringValue": "a@b.com"},
                "age": {"integerValue": "30"},
                "createdAt": {"timestampValue": "2024-01-01T00:00:00.000Z"}
            }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let options = InsertOptions {
        unique_fields: vec![vec!["email".to_string()]],
        text_index_fields: vec!["email".to_string()],
        field_type: vec![(
            "age".to_string(),
            datagate_core::options::FieldType::Number,
        )],
    };
    let created = backend
        .insert("users", record(json!({"email": "a@b.com", "age": "30"})), &options)
        .await
        .unwrap();
    assert_eq!(created["id"], "gen1");
    assert_eq!(created["age"], 30);
    assert_eq!(created["createdAt"], "2024-01-01T00:00:00.000Z");
}

#[tokio::test]
async fn test_insert_rejects_non_string_id() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/users", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc("x", json!({}))))
        .expect(0)
        .mount(&server)
        .await;

    let result = backend
        .insert(
            "users",
            record(json!({"id": 42, "name": "A"})),
            &InsertOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_array_mutation_keeps_stored_value_types() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    let stored = json!([
        {"integerValue": "9007199254740993"},
        {"timestampValue": "2024-01-01T00:00:00Z"},
        {"referenceValue": "projects/demo/databases/(default)/documents/users/u1"}
    ]);
    Mock::given(method("GET"))
        .and(path(format!("{}/users/p1", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc(
            "p1",
            json!({"refs": {"arrayValue": {"values": stored}}}),
        )))
        .mount(&server)
        .await;

    let mut written = stored.as_array().unwrap().clone();
    written.push(json!({"stringValue": "new"}));
    Mock::given(method("PATCH"))
        .and(path(format!("{}/users/p1", ROOT)))
        .and(query_param(
            "currentDocument.updateTime",
            "2024-01-01T00:00:00.000000Z",
        ))
        .and(query_param("updateMask.fieldPaths", "refs"))
        .and(body_partial_json(json!({
            "fields": {"refs": {"arrayValue": {"values": written}}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc(
            "p1",
            json!({"refs": {"arrayValue": {"values": written}}}),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mutation = ArrayMutation {
        field: "refs".to_string(),
        action: ArrayAction::Add,
        element: json!("new"),
        new_element: None,
        element_type: None,
    };
    let updated = backend.mutate_array("users", "p1", &mutation).await.unwrap();
    assert_eq!(updated["refs"][0], "9007199254740993");
    assert_eq!(updated["refs"][3], "new");
}

#[tokio::test]
async fn test_update_and_delete_missing_document() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/users/gone", ROOT)))
        .and(query_param("currentDocument.exists", "true"))
        .and(query_param("updateMask.fieldPaths", "name"))
        .and(query_param("updateMask.fieldPaths", "updatedAt"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "No document to update", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/users/gone", ROOT)))
        .and(query_param("currentDocument.exists", "true"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(matches!(
        backend
            .update(
                "users",
                "gone",
                record(json!({"name": "A"})),
                &UpdateOptions::default()
            )
            .await,
        Err(Error::NotFound(NotFound::Record))
    ));
    assert!(matches!(
        backend.remove("users", "gone").await,
        Err(Error::NotFound(NotFound::Record))
    ));
}

#[tokio::test]
async fn test_find_windows_and_counts() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;

    let native_filter = json!({
        "fieldFilter": {"field": {"fieldPath": "active"}, "op": "EQUAL", "value": {"booleanValue": true}}
    });

    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", ROOT)))
        .and(body_partial_json(json!({
            "structuredQuery": {"offset": 10, "limit": 10, "where": native_filter}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"document": doc("k", json!({"secret": {"stringValue": "x"}, "n": {"integerValue": "11"}}))},
            {"document": doc("l", json!({"secret": {"stringValue": "y"}, "n": {"integerValue": "12"}}))}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runAggregationQuery", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"result": {"aggregateFields": {"total": {"integerValue": "25"}}}, "readTime": "2024-01-01T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let result = backend
        .find(
            "users",
            &FindQuery {
                filter: native_filter.clone(),
                hidden: vec!["secret".to_string()],
                skip: 10,
                limit: Some(10),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.total, 25);
    assert_eq!(result.records.len(), 2);
    assert!(result.records.iter().all(|r| !r.contains_key("secret")));

    assert_eq!(backend.count("users", json!({})).await.unwrap(), 25);
}

#[tokio::test]
async fn test_join_is_unsupported() {
    let server = MockServer::start().await;
    let backend = connect(&server).await;
    let join = datagate_core::options::JoinSpec {
        collection: "tags".to_string(),
        field: "tags".to_string(),
    };
    assert!(matches!(
        backend.get_by_id("users", "a", Some(&join)).await,
        Err(Error::Validation(_))
    ));
    assert!(!backend.capabilities().supports_join);
}
