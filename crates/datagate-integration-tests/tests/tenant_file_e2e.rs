//! Tenant file on disk through to routed requests

mod common;

use axum::http::StatusCode;
use common::{call, gateway_with, send};
use datagate_config_file::FileTenantSource;
use datagate_core::TenantRegistry;
use serde_json::json;
use std::io::Write;
use tempfile::Builder;

#[tokio::test]
async fn test_legacy_map_file_serves_every_tenant() {
    let mut file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        "{}",
        json!({
            "shop": {"clientToken": "tok-shop", "source": "mongodb", "clientId": "Shop"},
            "blog": {"clientToken": "tok-blog", "source": "mongo", "clientId": "Blog"}
        })
    )
    .unwrap();

    let source = FileTenantSource::new(file.path().to_str().unwrap()).unwrap();
    let registry = TenantRegistry::load(&source).await.unwrap();
    assert_eq!(registry.len(), 2);

    let (app, _) = gateway_with(registry, Some("tok-shop"));

    let response = send(&app, "GET", "/api/tok-blog/posts", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-client-name"], "Blog");
    assert_eq!(response.headers()["x-clientid"], "Blog");

    let (status, _) = call(
        &app,
        "POST",
        "/api//posts",
        Some(json!({"data": {"title": "hello"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, shop_posts) = call(&app, "GET", "/api/tok-shop/posts", None).await;
    assert_eq!(shop_posts.as_array().unwrap().len(), 1);
    let (_, blog_posts) = call(&app, "GET", "/api/tok-blog/posts", None).await;
    assert_eq!(blog_posts, json!([]));
}

#[tokio::test]
async fn test_yaml_list_file() {
    let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "tenants:\n  - token: tok-1\n    backend: document\n    display_id: one\n    connection:\n      uri: mongodb://localhost/one"
    )
    .unwrap();

    let source = FileTenantSource::new(file.path().to_str().unwrap()).unwrap();
    let registry = TenantRegistry::load(&source).await.unwrap();
    let (app, _) = gateway_with(registry, None);

    let (status, body) = call(
        &app,
        "POST",
        "/api/tok-1/things/search",
        Some(json!({"kind": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}
