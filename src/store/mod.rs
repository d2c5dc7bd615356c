//! C7: the document-store adapter. Forwards aggregate pipelines to a Mongo
//! collection without interpreting their semantics beyond preserving stage
//! order, matching the original's thin wrapper over `pymongo`.

pub mod memory;
pub mod pipeline;
pub mod query;

use crate::classify::record::ClassifiedRecord;
use crate::error::AppError;
use async_trait::async_trait;
use bson::{doc, Document};
use futures::stream::TryStreamExt;
use mongodb::{Client, Collection, IndexModel};
use tracing::info;

const COLLECTION_NAME: &str = "packets";

/// Persistence boundary the consumer pool and query engine both depend on.
/// Implemented by `MongoDocumentStore` in production and `InMemoryStore`
/// (see `store::memory`) in tests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_one(&self, record: ClassifiedRecord) -> Result<(), AppError>;
    async fn insert_many(&self, records: Vec<ClassifiedRecord>) -> Result<u64, AppError>;
    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, AppError>;
    async fn delete_before(&self, timestamp: f64) -> Result<u64, AppError>;
}

/// Mongo-backed implementation. Owns one shared client handle (itself a
/// cheap, pool-backed clone) constructed once at process start.
#[derive(Clone)]
pub struct MongoDocumentStore {
    collection: Collection<Document>,
}

impl MongoDocumentStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        let client = Client::with_uri_str(uri).await.map_err(|e| AppError::Store(e.to_string()))?;
        let collection = client.database(database).collection::<Document>(COLLECTION_NAME);
        let store = MongoDocumentStore { collection };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Descending index on timestamp, ascending on source IP and protocol.
    async fn ensure_indexes(&self) -> Result<(), AppError> {
        let models = vec![
            IndexModel::builder().keys(doc! { "timestamp": -1 }).build(),
            IndexModel::builder().keys(doc! { "source_ip": 1 }).build(),
            IndexModel::builder().keys(doc! { "protocol": 1 }).build(),
        ];
        self.collection
            .create_indexes(models)
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        info!("document store indexes ensured");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn insert_one(&self, record: ClassifiedRecord) -> Result<(), AppError> {
        let doc = bson::to_document(&record).map_err(|e| AppError::Store(e.to_string()))?;
        self.collection.insert_one(doc).await.map_err(|e| AppError::Store(e.to_string()))?;
        Ok(())
    }

    async fn insert_many(&self, records: Vec<ClassifiedRecord>) -> Result<u64, AppError> {
        if records.is_empty() {
            return Ok(0);
        }
        let docs: Result<Vec<Document>, _> = records.iter().map(bson::to_document).collect();
        let docs = docs.map_err(|e| AppError::Store(e.to_string()))?;
        let result = self.collection.insert_many(docs).await.map_err(|e| AppError::Store(e.to_string()))?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, AppError> {
        let mut cursor = self.collection.aggregate(pipeline).await.map_err(|e| AppError::Store(e.to_string()))?;
        let mut results = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(|e| AppError::Store(e.to_string()))? {
            results.push(doc);
        }
        Ok(results)
    }

    async fn delete_before(&self, timestamp: f64) -> Result<u64, AppError> {
        let result = self
            .collection
            .delete_many(doc! { "timestamp": { "$lt": timestamp } })
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;
        Ok(result.deleted_count)
    }
}
