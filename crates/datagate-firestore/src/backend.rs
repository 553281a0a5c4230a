//! FirestoreBackend: the generic CRUD contract over the Firestore REST API

use async_trait::async_trait;
use reqwest::{Client, Method as HttpMethod, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use datagate_core::{
    Backend, Capabilities, Conflict, Error, NotFound, Record, Result, clock,
    options::{ArrayMutation, InsertOptions, JoinSpec, UpdateOptions, apply_field_types},
    query::{FindQuery, FindResult, Method, Operation},
    record::strip_hidden,
};

use crate::{
    client::transport_error,
    value::{
        Document, encode_fields, equality_filter, field_path, mutate_array_value, timestamp_value,
    },
};

const ID: &str = "id";
const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";
const LIST_PAGE_SIZE: &str = "300";

const METHODS: &[Method] = &[Method::Find, Method::FindOne, Method::Count];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCollectionIdsResponse {
    #[serde(default)]
    collection_ids: Vec<String>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<Document>,
}

pub struct FirestoreBackend {
    client: Client,
    /// `.../projects/{p}/databases/{db}/documents`
    root: Url,
    token: Option<String>,
}

/// Collection names and document ids are single path segments
fn check_segment(kind: &str, segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
        return Err(Error::malformed(format!("Invalid {}: {}", kind, segment)));
    }
    Ok(())
}

/// Native `where` filter, `None` for an empty filter
fn where_filter(filter: &Value) -> Result<Option<Value>> {
    match filter {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(_) => Ok(Some(filter.clone())),
        _ => Err(Error::malformed("filter must be an object")),
    }
}

fn structured_query(
    collection: &str,
    filter: Option<Value>,
    offset: u64,
    limit: Option<u64>,
) -> Result<Value> {
    let mut query = Map::new();
    query.insert("from".to_string(), json!([{ "collectionId": collection }]));
    if let Some(filter) = filter {
        query.insert("where".to_string(), filter);
    }
    if offset > 0 {
        let offset = i32::try_from(offset).map_err(|_| Error::malformed("offset is too large"))?;
        query.insert("offset".to_string(), json!(offset));
    }
    if let Some(limit) = limit {
        let limit = i32::try_from(limit).map_err(|_| Error::malformed("limit is too large"))?;
        query.insert("limit".to_string(), json!(limit));
    }
    Ok(Value::Object(query))
}

/// Google API error message, or the raw body
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Firestore returned {}: {}", status, body))
}

/// Decode a successful response, mapping 404 to `missing` when given
async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
    missing: Option<NotFound>,
) -> Result<T> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND
        && let Some(missing) = missing
    {
        return Err(missing.into());
    }
    if !status.is_success() {
        return Err(Error::Backend(error_message(response).await));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::Backend(format!("Failed to parse Firestore response: {}", e)))
}

impl FirestoreBackend {
    pub fn new(client: Client, root: Url, token: Option<String>) -> Self {
        Self {
            client,
            root,
            token,
        }
    }

    fn request(&self, method: HttpMethod, url: Url) -> RequestBuilder {
        debug!("Firestore {} {}", method, url.path());
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn document_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("Firestore base url cannot hold a path".to_string()))?
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// `{root}:{rpc}`, e.g. `documents:runQuery`
    fn rpc_url(&self, rpc: &str) -> Result<Url> {
        Url::parse(&format!("{}:{}", self.root, rpc))
            .map_err(|e| Error::Config(format!("Invalid Firestore url: {}", e)))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(transport_error)
    }

    async fn fetch_document(&self, collection: &str, id: &str) -> Result<Document> {
        check_segment("collection", collection)?;
        check_segment("document id", id)?;
        let url = self.document_url(&[collection, id], &[])?;
        let response = self.send(self.request(HttpMethod::GET, url)).await?;
        read_json(response, Some(NotFound::Document)).await
    }

    async fn run_query(&self, structured: Value) -> Result<Vec<Document>> {
        let url = self.rpc_url("runQuery")?;
        let response = self
            .send(
                self.request(HttpMethod::POST, url)
                    .json(&json!({ "structuredQuery": structured })),
            )
            .await?;
        let items: Vec<RunQueryItem> = read_json(response, None).await?;
        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }

    async fn query_records(
        &self,
        collection: &str,
        filter: Option<Value>,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        check_segment("collection", collection)?;
        let documents = self
            .run_query(structured_query(collection, filter, offset, limit)?)
            .await?;
        Ok(documents.iter().map(Document::to_record).collect())
    }

    async fn count_where(&self, collection: &str, filter: Option<Value>) -> Result<u64> {
        check_segment("collection", collection)?;
        let url = self.rpc_url("runAggregationQuery")?;
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": structured_query(collection, filter, 0, None)?,
                "aggregations": [{ "alias": "total", "count": {} }]
            }
        });
        let response = self
            .send(self.request(HttpMethod::POST, url).json(&body))
            .await?;
        let items: Vec<Value> = read_json(response, None).await?;

        let total = items
            .iter()
            .find_map(|item| item.pointer("/result/aggregateFields/total/integerValue"))
            .and_then(|v| match v {
                Value::String(s) => s.parse().ok(),
                Value::Number(n) => n.as_u64(),
                _ => None,
            })
            .unwrap_or(0);
        Ok(total)
    }

    /// Ids of documents where `field == value`, at most `limit`
    async fn matching_ids(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: u64,
    ) -> Result<Vec<String>> {
        let documents = self
            .run_query(structured_query(
                collection,
                Some(equality_filter(field, value)),
                0,
                Some(limit),
            )?)
            .await?;
        Ok(documents.iter().map(|d| d.id().to_string()).collect())
    }

    async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        precondition: (&str, &str),
        missing: NotFound,
    ) -> Result<Record> {
        let mask: Vec<String> = fields.keys().map(|k| field_path(k)).collect();
        let mut query: Vec<(&str, &str)> = mask
            .iter()
            .map(|path| ("updateMask.fieldPaths", path.as_str()))
            .collect();
        query.push(precondition);

        let url = self.document_url(&[collection, id], &query)?;
        let response = self
            .send(
                self.request(HttpMethod::PATCH, url)
                    .json(&json!({ "fields": fields })),
            )
            .await?;
        let document: Document = read_json(response, Some(missing)).await?;
        Ok(document.to_record())
    }
}

#[async_trait]
impl Backend for FirestoreBackend {
    async fn list_all(&self, collection: &str, filter: Option<Value>) -> Result<Vec<Record>> {
        check_segment("collection", collection)?;
        if let Some(filter) = where_filter(&filter.unwrap_or(Value::Null))? {
            return self.query_records(collection, Some(filter), 0, None).await;
        }

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", LIST_PAGE_SIZE)];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }
            let url = self.document_url(&[collection], &query)?;
            let response = self.send(self.request(HttpMethod::GET, url)).await?;
            let page: ListDocumentsResponse = read_json(response, None).await?;

            records.extend(page.documents.iter().map(Document::to_record));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(records)
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
        join: Option<&JoinSpec>,
    ) -> Result<Record> {
        if join.is_some() {
            return Err(Error::unsupported("join"));
        }
        Ok(self.fetch_document(collection, id).await?.to_record())
    }

    async fn insert(
        &self,
        collection: &str,
        mut data: Record,
        options: &InsertOptions,
    ) -> Result<Record> {
        check_segment("collection", collection)?;
        apply_field_types(&mut data, &options.field_type);

        let document_id = match data.remove(ID) {
            Some(Value::String(id)) if !id.is_empty() => {
                check_segment("document id", &id)?;
                Some(id)
            }
            None | Some(Value::Null) | Some(Value::String(_)) => None,
            Some(other) => {
                return Err(Error::malformed(format!(
                    "document id must be a string, got {}",
                    other
                )));
            }
        };

        let mut duplicates = Vec::new();
        for field in options.unique_candidate_fields(&data) {
            let value = data.get(&field).cloned().unwrap_or(Value::Null);
            if !self
                .matching_ids(collection, &field, &value, 1)
                .await?
                .is_empty()
            {
                duplicates.push(field);
            }
        }
        if !duplicates.is_empty() {
            return Err(Conflict::DuplicateFields(duplicates).into());
        }

        if !options.text_index_fields.is_empty() {
            warn!(
                "Firestore has no text indexes, ignoring textIndexFields on {}",
                collection
            );
        }

        let mut fields = encode_fields(&data);
        fields.insert(
            CREATED_AT.to_string(),
            timestamp_value(&clock::now_rfc3339()),
        );

        let query: Vec<(&str, &str)> = document_id
            .as_deref()
            .map(|id| vec![("documentId", id)])
            .unwrap_or_default();
        let url = self.document_url(&[collection], &query)?;
        let response = self
            .send(
                self.request(HttpMethod::POST, url)
                    .json(&json!({ "fields": fields })),
            )
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(Conflict::DuplicateFields(vec![ID.to_string()]).into());
        }
        let document: Document = read_json(response, None).await?;
        Ok(document.to_record())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut data: Record,
        options: &UpdateOptions,
    ) -> Result<Record> {
        check_segment("collection", collection)?;
        check_segment("document id", id)?;

        if let Some(field) = &options.unique
            && let Some(value) = data.get(field)
        {
            let holders = self.matching_ids(collection, field, value, 2).await?;
            if holders.iter().any(|holder| holder != id) {
                return Err(Conflict::DuplicateUnique(field.clone()).into());
            }
        }

        data.remove(ID);
        let mut fields = encode_fields(&data);
        fields.insert(
            UPDATED_AT.to_string(),
            timestamp_value(&clock::now_rfc3339()),
        );
        self.patch(
            collection,
            id,
            fields,
            ("currentDocument.exists", "true"),
            NotFound::Record,
        )
        .await
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        check_segment("collection", collection)?;
        check_segment("document id", id)?;
        let url = self.document_url(&[collection, id], &[("currentDocument.exists", "true")])?;
        let response = self.send(self.request(HttpMethod::DELETE, url)).await?;
        let _: Value = read_json(response, Some(NotFound::Record)).await?;
        Ok(())
    }

    async fn mutate_array(
        &self,
        collection: &str,
        id: &str,
        mutation: &ArrayMutation,
    ) -> Result<Record> {
        let document = self.fetch_document(collection, id).await?;
        let items = mutate_array_value(document.fields.get(&mutation.field), mutation)?;

        let mut fields = Map::new();
        fields.insert(mutation.field.clone(), items);
        fields.insert(
            UPDATED_AT.to_string(),
            timestamp_value(&clock::now_rfc3339()),
        );

        // Fails if the document changed since it was read
        let precondition = match &document.update_time {
            Some(time) => ("currentDocument.updateTime", time.as_str()),
            None => ("currentDocument.exists", "true"),
        };
        self.patch(collection, id, fields, precondition, NotFound::Document)
            .await
    }

    async fn count(&self, collection: &str, filter: Value) -> Result<u64> {
        self.count_where(collection, where_filter(&filter)?).await
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<FindResult> {
        let filter = where_filter(&query.filter)?;
        let mut records = self
            .query_records(collection, filter.clone(), query.skip, query.limit)
            .await?;
        for record in &mut records {
            strip_hidden(record, &query.hidden);
        }
        let total = self.count_where(collection, filter).await?;
        Ok(FindResult { records, total })
    }

    async fn invoke(&self, collection: &str, operation: &Operation) -> Result<Value> {
        match operation {
            Operation::Find { filter } => {
                let records = self
                    .query_records(collection, where_filter(filter)?, 0, None)
                    .await?;
                Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
            }
            Operation::FindOne { filter } => {
                let records = self
                    .query_records(collection, where_filter(filter)?, 0, Some(1))
                    .await?;
                Ok(records
                    .into_iter()
                    .next()
                    .map(Value::Object)
                    .unwrap_or(Value::Null))
            }
            Operation::Count { filter } => Ok(Value::from(
                self.count_where(collection, where_filter(filter)?).await?,
            )),
            other => Err(Error::unsupported(other.method().as_str())),
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let url = self.rpc_url("listCollectionIds")?;
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({ "pageSize": 300 });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }
            let response = self
                .send(self.request(HttpMethod::POST, url.clone()).json(&body))
                .await?;
            let page: ListCollectionIdsResponse = read_json(response, None).await?;

            names.extend(page.collection_ids);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        names.sort();
        Ok(names)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            methods: METHODS,
            supports_join: false,
            supports_sql: false,
            supports_drop: false,
        }
    }
}
