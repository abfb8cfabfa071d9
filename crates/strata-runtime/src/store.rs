//! Document store for raw entities
//!
//! Raw documents are staged in a schemaless collection, one document per
//! natural key. MongoDB is the production backend.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use mongodb::Collection;
use mongodb::bson::{self, Bson, Document, doc};
use serde_json::Value;

use crate::error::{Error, Result};

/// A raw document: a JSON object stored verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument(Value);

impl RawDocument {
    /// Wrap a JSON value; anything other than an object is handed back
    pub fn from_json(value: Value) -> std::result::Result<Self, Value> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(value)
        }
    }

    /// Value of the natural key field, `null` when missing
    pub fn natural_key(&self, field: &str) -> Value {
        self.0.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Borrow the underlying JSON
    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// Storage for raw documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replace the document whose `key_field` matches `document`'s own value,
    /// inserting it when no such document exists.
    async fn upsert(&self, key_field: &str, document: &RawDocument) -> Result<()>;

    /// Stream every document, without the store's internal identity field
    async fn scan(&self) -> Result<BoxStream<'_, Result<RawDocument>>>;
}

/// MongoDB-backed document store scoped to one collection
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connect to `uri` and scope the handle to `database.collection`.
    ///
    /// The server is pinged so an unreachable store fails here rather than on
    /// the first write.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .map_err(|e| Error::connection("mongodb", e))?;

        let db = client.database(database);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::connection(format!("mongodb database '{}'", database), e))?;

        tracing::debug!("Connected to MongoDB collection {}.{}", database, collection);
        Ok(Self {
            collection: db.collection(collection),
        })
    }
}

fn to_raw(document: Document) -> Result<RawDocument> {
    let json = Bson::Document(document).into_relaxed_extjson();
    RawDocument::from_json(json).map_err(|other| Error::UnexpectedResponse {
        url: "mongodb".to_string(),
        message: format!("expected a document, got {}", other),
    })
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn upsert(&self, key_field: &str, document: &RawDocument) -> Result<()> {
        let key = bson::to_bson(&document.natural_key(key_field))?;
        let replacement = bson::to_document(document.as_json())?;

        self.collection
            .replace_one(doc! { key_field: key }, replacement)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn scan(&self) -> Result<BoxStream<'_, Result<RawDocument>>> {
        let cursor = self
            .collection
            .find(doc! {})
            .projection(doc! { "_id": 0 })
            .await?;

        Ok(cursor
            .map(|item| item.map_err(Error::from).and_then(to_raw))
            .boxed())
    }
}
