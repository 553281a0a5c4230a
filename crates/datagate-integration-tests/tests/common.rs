//! Common test utilities for integration tests

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use datagate_core::{
    Backend, BackendKind, Capabilities, Conflict, Connector, Error, NotFound, Record, Result,
    TenantDescriptor, TenantRegistry, TenantToken, clock,
    options::{ArrayMutation, InsertOptions, JoinSpec, UpdateOptions, apply_field_types},
    query::{FindQuery, FindResult, Method, Operation},
    record::{apply_array_mutation, strip_hidden},
};
use datagate_ingress::{GatewaySettings, GatewayState};
use datagate_pool::PoolManager;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};
use std::time::Duration;
use tokio::sync::Mutex;
use tower::ServiceExt;

/// In-memory backend with equality filters
#[derive(Default)]
#[allow(dead_code)]
pub struct MemoryBackend {
    collections: Mutex<BTreeMap<String, Vec<Record>>>,
    next_id: AtomicU64,
}

fn matches(record: &Record, filter: &Value) -> bool {
    match filter {
        Value::Object(conditions) => conditions
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected)),
        _ => true,
    }
}

fn id_of(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list_all(&self, collection: &str, filter: Option<Value>) -> Result<Vec<Record>> {
        let filter = filter.unwrap_or(Value::Null);
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches(r, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
        _join: Option<&JoinSpec>,
    ) -> Result<Record> {
        let collections = self.collections.lock().await;
        collections
            .get(collection)
            .and_then(|records| records.iter().find(|r| id_of(r) == Some(id)))
            .cloned()
            .ok_or_else(|| NotFound::Document.into())
    }

    async fn insert(
        &self,
        collection: &str,
        mut data: Record,
        options: &InsertOptions,
    ) -> Result<Record> {
        apply_field_types(&mut data, &options.field_type);

        let mut collections = self.collections.lock().await;
        let records = collections.entry(collection.to_string()).or_default();

        let duplicates: Vec<String> = options
            .unique_candidate_fields(&data)
            .into_iter()
            .filter(|field| records.iter().any(|r| r.get(field) == data.get(field)))
            .collect();
        if !duplicates.is_empty() {
            return Err(Conflict::DuplicateFields(duplicates).into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        data.insert("id".to_string(), json!(id.to_string()));
        data.insert("createdAt".to_string(), json!(clock::now_rfc3339()));
        records.push(data.clone());
        Ok(data)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Record,
        options: &UpdateOptions,
    ) -> Result<Record> {
        let mut collections = self.collections.lock().await;
        let records = collections
            .get_mut(collection)
            .ok_or(Error::NotFound(NotFound::Record))?;

        if let Some(field) = &options.unique
            && let Some(value) = data.get(field)
            && records
                .iter()
                .any(|r| id_of(r) != Some(id) && r.get(field) == Some(value))
        {
            return Err(Conflict::DuplicateUnique(field.clone()).into());
        }

        let record = records
            .iter_mut()
            .find(|r| id_of(r) == Some(id))
            .ok_or(Error::NotFound(NotFound::Record))?;
        for (field, value) in data {
            record.insert(field, value);
        }
        record.insert("updatedAt".to_string(), json!(clock::now_rfc3339()));
        Ok(record.clone())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.lock().await;
        let records = collections
            .get_mut(collection)
            .ok_or(Error::NotFound(NotFound::Record))?;
        let before = records.len();
        records.retain(|r| id_of(r) != Some(id));
        if records.len() == before {
            return Err(NotFound::Record.into());
        }
        Ok(())
    }

    async fn mutate_array(
        &self,
        collection: &str,
        id: &str,
        mutation: &ArrayMutation,
    ) -> Result<Record> {
        let mut collections = self.collections.lock().await;
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| id_of(r) == Some(id)))
            .ok_or(Error::NotFound(NotFound::Document))?;
        apply_array_mutation(record, mutation)?;
        Ok(record.clone())
    }

    async fn count(&self, collection: &str, filter: Value) -> Result<u64> {
        Ok(self.list_all(collection, Some(filter)).await?.len() as u64)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<FindResult> {
        let matching = self.list_all(collection, Some(query.filter.clone())).await?;
        let total = matching.len() as u64;
        let records = matching
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .map(|mut r| {
                strip_hidden(&mut r, &query.hidden);
                r
            })
            .collect();
        Ok(FindResult { records, total })
    }

    async fn invoke(&self, collection: &str, operation: &Operation) -> Result<Value> {
        match operation {
            Operation::FindOne { filter } => Ok(self
                .list_all(collection, Some(filter.clone()))
                .await?
                .into_iter()
                .next()
                .map(Value::Object)
                .unwrap_or(Value::Null)),
            Operation::Count { filter } => Ok(json!(self.count(collection, filter.clone()).await?)),
            other => Err(Error::unsupported(other.method().as_str())),
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.lock().await.keys().cloned().collect())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            methods: &[Method::Find, Method::FindOne, Method::Count],
            supports_join: false,
            supports_sql: false,
            supports_drop: false,
        }
    }
}

/// Connector handing out a fresh [`MemoryBackend`] per tenant and counting
/// connects. The connect sleeps briefly so concurrent first requests overlap.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MemoryConnector {
    pub connects: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MemoryConnector {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn connect(&self, _tenant: &TenantDescriptor) -> Result<Arc<dyn Backend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Arc::new(MemoryBackend::default()))
    }
}

#[allow(dead_code)]
pub fn tenant(token: &str, name: &str) -> TenantDescriptor {
    TenantDescriptor {
        token: TenantToken::new(token).unwrap(),
        backend: BackendKind::Document,
        display_id: name.to_string(),
        connection: json!({}),
    }
}

/// Gateway over two in-memory tenants, `tok-a` ("alpha") and `tok-b` ("beta")
#[allow(dead_code)]
pub fn gateway(default_token: Option<&str>) -> (Router, MemoryConnector) {
    let registry =
        TenantRegistry::from_descriptors(vec![tenant("tok-a", "alpha"), tenant("tok-b", "beta")])
            .unwrap();
    gateway_with(registry, default_token)
}

#[allow(dead_code)]
pub fn gateway_with(
    registry: TenantRegistry,
    default_token: Option<&str>,
) -> (Router, MemoryConnector) {
    let connector = MemoryConnector::default();
    let pools = Arc::new(PoolManager::new().with_connector(Arc::new(connector.clone())));
    let settings = GatewaySettings {
        default_token: default_token.map(|t| TenantToken::new(t).unwrap()),
        ..Default::default()
    };
    let state = GatewayState::new(Arc::new(registry), pools, settings).unwrap();
    (datagate_ingress::router(Arc::new(state)), connector)
}

#[allow(dead_code)]
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

/// Send a request and return status and JSON body
#[allow(dead_code)]
pub async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = send(app, method, uri, body).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
