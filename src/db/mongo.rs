//! Typed MongoDB access
//!
//! Every collection is wrapped in `MongoCollection<T>`, which applies the
//! schema's declared indexes on open, stamps `Metadata` timestamps on
//! insert, and injects the soft-delete filter into every read. Deletes are
//! always soft; a filtered-out document stays in the collection.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{IndexOptions, ReturnDocument, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::KalikeError;

/// Index definitions a schema wants on its collection
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Access to the common metadata block, for timestamp stamping
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping. Short server-selection and connect timeouts keep
    /// an unreachable MongoDB from hanging startup.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, KalikeError> {
        info!("Connecting to MongoDB at {}", uri);

        let separator = if uri.contains('?') { '&' } else { '?' };
        let timeout_uri =
            format!("{uri}{separator}serverSelectionTimeoutMS=3000&connectTimeoutMS=3000");

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| KalikeError::Database(format!("MongoDB connection failed: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| KalikeError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Open a typed collection, applying the schema's indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, KalikeError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        let collection = MongoCollection {
            inner: self.client.database(&self.db_name).collection::<T>(name),
        };
        collection.ensure_indexes().await?;
        Ok(collection)
    }
}

#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    async fn ensure_indexes(&self) -> Result<(), KalikeError> {
        let declared = T::into_indices();
        if declared.is_empty() {
            return Ok(());
        }

        let models: Vec<IndexModel> = declared
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(models)
            .await
            .map_err(|e| KalikeError::Database(format!("Index creation failed: {}", e)))?;

        Ok(())
    }

    /// Insert with fresh metadata timestamps, returning the assigned id
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, KalikeError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        self.inner
            .insert_one(item)
            .await
            .map_err(|e| KalikeError::Database(format!("Insert failed: {}", e)))?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| KalikeError::Database("Insert returned a non-ObjectId id".into()))
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, KalikeError> {
        self.inner
            .find_one(Self::without_deleted(filter))
            .await
            .map_err(|e| KalikeError::Database(format!("Find failed: {}", e)))
    }

    /// First matching document under the given sort order
    pub async fn find_one_sorted(
        &self,
        filter: Document,
        sort: Document,
    ) -> Result<Option<T>, KalikeError> {
        self.inner
            .find_one(Self::without_deleted(filter))
            .sort(sort)
            .await
            .map_err(|e| KalikeError::Database(format!("Find failed: {}", e)))
    }

    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, KalikeError> {
        self.find_many_sorted(filter, None, None).await
    }

    /// Find with optional sort and limit. Documents that fail to decode
    /// are logged and skipped rather than failing the whole read.
    pub async fn find_many_sorted(
        &self,
        filter: Document,
        sort: Option<Document>,
        limit: Option<i64>,
    ) -> Result<Vec<T>, KalikeError> {
        use futures_util::StreamExt;

        let mut find = self.inner.find(Self::without_deleted(filter));
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        if let Some(limit) = limit {
            find = find.limit(limit);
        }

        let cursor = find
            .await
            .map_err(|e| KalikeError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Skipping undecodable document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, KalikeError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| KalikeError::Database(format!("Update failed: {}", e)))
    }

    /// Update and return the post-update document; None when nothing matched
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<Option<T>, KalikeError> {
        self.inner
            .find_one_and_update(Self::without_deleted(filter), update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| KalikeError::Database(format!("Update failed: {}", e)))
    }

    /// Mark matching document deleted; reads stop returning it
    pub async fn soft_delete(&self, filter: Document) -> Result<UpdateResult, KalikeError> {
        self.update_one(
            filter,
            doc! {
                "$set": {
                    "metadata.is_deleted": true,
                    "metadata.deleted_at": DateTime::now(),
                    "metadata.updated_at": DateTime::now(),
                }
            },
        )
        .await
    }

    /// Raw collection handle, for operations the wrapper does not cover
    /// (the billing webhook's upsert). Callers bypass the soft-delete
    /// filter.
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }

    fn without_deleted(mut filter: Document) -> Document {
        filter.insert("metadata.is_deleted", doc! { "$ne": true });
        filter
    }
}

#[cfg(test)]
mod tests {
    // Integration tests require a running MongoDB instance
}
