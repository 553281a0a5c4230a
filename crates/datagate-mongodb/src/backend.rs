//! MongoBackend: the generic CRUD contract over a MongoDB database

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, Document, doc},
};
use serde_json::Value;
use tracing::{debug, info};

use datagate_core::{
    Backend, Capabilities, Conflict, Error, NotFound, Record, Result,
    options::{ArrayAction, ArrayMutation, InsertOptions, JoinSpec, UpdateOptions},
    query::{FindQuery, FindResult, Method, Operation},
    record::display_element,
};

use crate::codec::{
    apply_field_types, bson_to_json, document_to_record, hidden_projection, id_filter,
    join_ids, json_to_document, record_to_document, timestamp, typed_bson,
};

const METHODS: &[Method] = &[
    Method::Find,
    Method::FindOne,
    Method::Count,
    Method::Distinct,
    Method::Aggregate,
    Method::EstimatedCount,
];

pub struct MongoBackend {
    client: Client,
    db: Database,
    /// Client is owned by the connector and shared with other tenants
    shared: bool,
}

impl MongoBackend {
    pub fn new(client: Client, db: Database, shared: bool) -> Self {
        Self { client, db, shared }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    async fn fetch(&self, coll: &Collection<Document>, filter: Document) -> Result<Option<Record>> {
        let found = coll.find_one(filter).await.map_err(Error::backend)?;
        Ok(found.map(document_to_record))
    }

    async fn collect(&self, coll: &Collection<Document>, filter: Document) -> Result<Vec<Record>> {
        let cursor = coll.find(filter).await.map_err(Error::backend)?;
        let docs: Vec<Document> = cursor.try_collect().await.map_err(Error::backend)?;
        Ok(docs.into_iter().map(document_to_record).collect())
    }

    /// Replace the id list in `join.field` with the referenced records
    async fn expand_join(&self, doc: &mut Document, join: &JoinSpec) -> Result<()> {
        let Some(ids) = join_ids(doc.get(&join.field)) else {
            debug!("Join field '{}' is not an array, skipping expansion", join.field);
            return Ok(());
        };
        let joined = self.collection(&join.collection);
        let cursor = joined
            .find(doc! { "_id": { "$in": ids } })
            .await
            .map_err(Error::backend)?;
        let docs: Vec<Document> = cursor.try_collect().await.map_err(Error::backend)?;
        doc.insert(
            join.field.clone(),
            Bson::Array(docs.into_iter().map(Bson::Document).collect()),
        );
        Ok(())
    }
}

fn filter_document(filter: Value) -> Result<Document> {
    if filter.is_null() {
        return Ok(Document::new());
    }
    json_to_document(filter)
}

/// Build the single update for an array mutation.
///
/// Operands are converted and the target located before anything is
/// written, so a failed mutation leaves the document untouched. A field that
/// is absent or not an array is replaced by the resulting array.
fn array_update(existing: Option<&[Bson]>, mutation: &ArrayMutation) -> Result<Document> {
    let field = mutation.field.as_str();
    let element = typed_bson(&mutation.element, mutation.element_type)?;

    let update = match (mutation.action, existing) {
        (ArrayAction::Update, items) => {
            let replacement = typed_bson(mutation.replacement()?, mutation.element_type)?;
            let Some(index) = items.and_then(|items| items.iter().position(|item| *item == element))
            else {
                return Err(NotFound::Element {
                    element: display_element(&mutation.element),
                    field: mutation.field.clone(),
                }
                .into());
            };
            doc! {
                "$set": {
                    format!("{}.{}", field, index): replacement,
                    "updatedAt": timestamp(),
                }
            }
        }
        (ArrayAction::Add, Some(_)) => doc! {
            "$addToSet": { field: element },
            "$set": { "updatedAt": timestamp() },
        },
        (ArrayAction::Remove, Some(_)) => doc! {
            "$pull": { field: element },
            "$set": { "updatedAt": timestamp() },
        },
        (ArrayAction::Add, None) => doc! {
            "$set": { field: [element], "updatedAt": timestamp() },
        },
        (ArrayAction::Remove, None) => doc! {
            "$set": { field: [], "updatedAt": timestamp() },
        },
    };
    Ok(update)
}

#[async_trait]
impl Backend for MongoBackend {
    async fn list_all(&self, collection: &str, filter: Option<Value>) -> Result<Vec<Record>> {
        let filter = filter_document(filter.unwrap_or(Value::Null))?;
        self.collect(&self.collection(collection), filter).await
    }

    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
        join: Option<&JoinSpec>,
    ) -> Result<Record> {
        let coll = self.collection(collection);
        let mut doc = coll
            .find_one(id_filter(id))
            .await
            .map_err(Error::backend)?
            .ok_or(NotFound::Document)?;

        if let Some(join) = join {
            self.expand_join(&mut doc, join).await?;
        }
        Ok(document_to_record(doc))
    }

    async fn insert(
        &self,
        collection: &str,
        data: Record,
        options: &InsertOptions,
    ) -> Result<Record> {
        let coll = self.collection(collection);
        let unique = options.unique_candidate_fields(&data);

        let mut doc = record_to_document(data)?;
        apply_field_types(&mut doc, &options.field_type)?;

        let mut duplicates = Vec::new();
        for field in unique {
            let Some(value) = doc.get(&field) else {
                continue;
            };
            let existing = coll
                .find_one(doc! { field.as_str(): value.clone() })
                .await
                .map_err(Error::backend)?;
            if existing.is_some() {
                duplicates.push(field);
            }
        }
        if !duplicates.is_empty() {
            return Err(Conflict::DuplicateFields(duplicates).into());
        }

        if !options.text_index_fields.is_empty() {
            let mut keys = Document::new();
            for field in &options.text_index_fields {
                keys.insert(field.clone(), "text");
            }
            coll.create_index(IndexModel::builder().keys(keys).build())
                .await
                .map_err(Error::backend)?;
        }

        doc.insert("createdAt", timestamp());

        let inserted = coll.insert_one(&doc).await.map_err(Error::backend)?;
        let stored = self
            .fetch(&coll, doc! { "_id": inserted.inserted_id.clone() })
            .await?;
        Ok(stored.unwrap_or_else(|| {
            doc.insert("_id", inserted.inserted_id);
            document_to_record(doc)
        }))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        data: Record,
        options: &UpdateOptions,
    ) -> Result<Record> {
        let coll = self.collection(collection);
        let filter = id_filter(id);
        let id_value = filter.get("_id").cloned().unwrap_or(Bson::Null);

        let mut changes = record_to_document(data)?;
        changes.remove("_id");

        if let Some(field) = &options.unique
            && let Some(value) = changes.get(field)
        {
            let existing = coll
                .find_one(doc! { field.as_str(): value.clone(), "_id": { "$ne": id_value } })
                .await
                .map_err(Error::backend)?;
            if existing.is_some() {
                return Err(Conflict::DuplicateUnique(field.clone()).into());
            }
        }

        changes.insert("updatedAt", timestamp());
        let result = coll
            .update_one(filter.clone(), doc! { "$set": changes })
            .await
            .map_err(Error::backend)?;
        if result.matched_count == 0 {
            return Err(NotFound::Record.into());
        }

        self.fetch(&coll, filter)
            .await?
            .ok_or_else(|| NotFound::Record.into())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let result = self
            .collection(collection)
            .delete_one(id_filter(id))
            .await
            .map_err(Error::backend)?;
        if result.deleted_count == 0 {
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
        let coll = self.collection(collection);
        let filter = id_filter(id);

        let doc = coll
            .find_one(filter.clone())
            .await
            .map_err(Error::backend)?
            .ok_or(NotFound::Document)?;

        let existing = match doc.get(&mutation.field) {
            Some(Bson::Array(items)) => Some(items.as_slice()),
            _ => None,
        };
        let update = array_update(existing, mutation)?;

        coll.update_one(filter.clone(), update)
            .await
            .map_err(Error::backend)?;
        self.fetch(&coll, filter)
            .await?
            .ok_or_else(|| NotFound::Document.into())
    }

    async fn count(&self, collection: &str, filter: Value) -> Result<u64> {
        self.collection(collection)
            .count_documents(filter_document(filter)?)
            .await
            .map_err(Error::backend)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<FindResult> {
        let coll = self.collection(collection);
        let filter = filter_document(query.filter.clone())?;

        let mut action = coll.find(filter.clone()).skip(query.skip);
        if let Some(limit) = query.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(projection) = hidden_projection(&query.hidden) {
            action = action.projection(projection);
        }
        let docs: Vec<Document> = action
            .await
            .map_err(Error::backend)?
            .try_collect()
            .await
            .map_err(Error::backend)?;

        let total = coll.count_documents(filter).await.map_err(Error::backend)?;
        Ok(FindResult {
            records: docs.into_iter().map(document_to_record).collect(),
            total,
        })
    }

    async fn invoke(&self, collection: &str, operation: &Operation) -> Result<Value> {
        let coll = self.collection(collection);
        let value = match operation {
            Operation::Find { filter } => {
                let records = self.collect(&coll, filter_document(filter.clone())?).await?;
                Value::Array(records.into_iter().map(Value::Object).collect())
            }
            Operation::FindOne { filter } => self
                .fetch(&coll, filter_document(filter.clone())?)
                .await?
                .map(Value::Object)
                .unwrap_or(Value::Null),
            Operation::Count { filter } => Value::from(
                coll.count_documents(filter_document(filter.clone())?)
                    .await
                    .map_err(Error::backend)?,
            ),
            Operation::Distinct { field, filter } => {
                let values = coll
                    .distinct(field, filter_document(filter.clone())?)
                    .await
                    .map_err(Error::backend)?;
                Value::Array(values.into_iter().map(bson_to_json).collect())
            }
            Operation::Aggregate { pipeline } => {
                let stages = pipeline
                    .iter()
                    .cloned()
                    .map(json_to_document)
                    .collect::<Result<Vec<_>>>()?;
                let docs: Vec<Document> = coll
                    .aggregate(stages)
                    .await
                    .map_err(Error::backend)?
                    .try_collect()
                    .await
                    .map_err(Error::backend)?;
                Value::Array(
                    docs.into_iter()
                        .map(|d| Value::Object(document_to_record(d)))
                        .collect(),
                )
            }
            Operation::EstimatedCount => Value::from(
                coll.estimated_document_count()
                    .await
                    .map_err(Error::backend)?,
            ),
        };
        Ok(value)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = self
            .db
            .list_collection_names()
            .await
            .map_err(Error::backend)?;
        names.sort();
        Ok(names)
    }

    async fn close(&self) {
        if self.shared {
            return;
        }
        info!("Shutting down MongoDB client for database {}", self.db.name());
        self.client.clone().shutdown().await;
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            methods: METHODS,
            supports_join: true,
            supports_sql: false,
            supports_drop: false,
        }
    }
}
