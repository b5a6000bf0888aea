//! Persistence seam for progress records
//!
//! The store surface is deliberately narrow: find the latest record for a
//! user, insert a new one, or patch an existing one by id. `MongoProgressStore`
//! is the production implementation; `MemoryProgressStore` backs dev mode
//! (no MongoDB) and unit tests.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::db::schemas::{ProgressDoc, PROGRESS_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{KalikeError, Result};

use super::ProgressRecord;

/// Fields for a brand-new record (first qualifying activity)
#[derive(Debug, Clone)]
pub struct NewProgress {
    pub user_id: String,
    pub lesson_id: Option<String>,
    pub xp: i64,
    pub streak: i64,
    pub badges: Vec<String>,
}

/// Partial update applied to an existing record
///
/// `lesson_id` only overwrites the stored association when supplied.
#[derive(Debug, Clone)]
pub struct ProgressPatch {
    pub xp: i64,
    pub streak: i64,
    pub badges: Vec<String>,
    pub lesson_id: Option<String>,
}

/// Persisted-record collaborator for the progress service
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Most-recently-updated record for a user, if any
    async fn find_latest_by_user(&self, user_id: &str) -> Result<Option<ProgressRecord>>;

    /// Insert a new record, returning it with id and timestamps assigned
    async fn insert(&self, new: NewProgress) -> Result<ProgressRecord>;

    /// Patch an existing record; None when the record no longer exists
    async fn update_by_id(&self, id: &str, patch: ProgressPatch) -> Result<Option<ProgressRecord>>;
}

// ============================================================================
// MongoDB implementation
// ============================================================================

pub struct MongoProgressStore {
    collection: MongoCollection<ProgressDoc>,
}

impl MongoProgressStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<ProgressDoc>(PROGRESS_COLLECTION).await?;
        Ok(Self { collection })
    }
}

fn doc_to_record(doc: ProgressDoc) -> Result<ProgressRecord> {
    let id = doc
        ._id
        .ok_or_else(|| KalikeError::Database("Progress document missing _id".into()))?
        .to_hex();

    let created_at = doc
        .metadata
        .created_at
        .map(|d| d.to_chrono())
        .unwrap_or_else(Utc::now);
    let updated_at = doc
        .metadata
        .updated_at
        .map(|d| d.to_chrono())
        .unwrap_or_else(Utc::now);

    Ok(ProgressRecord {
        id,
        user_id: doc.user_id,
        lesson_id: doc.lesson_id,
        xp: doc.xp,
        streak: doc.streak,
        badges: doc.badges,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl ProgressStore for MongoProgressStore {
    async fn find_latest_by_user(&self, user_id: &str) -> Result<Option<ProgressRecord>> {
        let doc = self
            .collection
            .find_one_sorted(
                doc! { "user_id": user_id },
                doc! { "metadata.updated_at": -1 },
            )
            .await?;

        doc.map(doc_to_record).transpose()
    }

    async fn insert(&self, new: NewProgress) -> Result<ProgressRecord> {
        let now = Utc::now();
        let doc = ProgressDoc {
            _id: None,
            metadata: Default::default(),
            user_id: new.user_id.clone(),
            lesson_id: new.lesson_id.clone(),
            xp: new.xp,
            streak: new.streak,
            badges: new.badges.clone(),
        };

        let id = self.collection.insert_one(doc).await?;

        Ok(ProgressRecord {
            id: id.to_hex(),
            user_id: new.user_id,
            lesson_id: new.lesson_id,
            xp: new.xp,
            streak: new.streak,
            badges: new.badges,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_by_id(&self, id: &str, patch: ProgressPatch) -> Result<Option<ProgressRecord>> {
        let oid = ObjectId::parse_str(id)
            .map_err(|_| KalikeError::Validation(format!("Invalid progress record id: {}", id)))?;

        let mut set = doc! {
            "xp": patch.xp,
            "streak": patch.streak,
            "badges": patch.badges,
            "metadata.updated_at": bson::DateTime::now(),
        };
        if let Some(lesson_id) = patch.lesson_id {
            set.insert("lesson_id", lesson_id);
        }

        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": oid }, doc! { "$set": set })
            .await?;

        updated.map(doc_to_record).transpose()
    }
}

// ============================================================================
// In-memory implementation (dev mode, tests)
// ============================================================================

#[derive(Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<String, ProgressRecord>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite a record's last-updated timestamp (streak-window tests)
    #[cfg(test)]
    pub fn backdate(&self, id: &str, updated_at: chrono::DateTime<Utc>) {
        let mut records = self.records.lock().expect("progress store lock poisoned");
        if let Some(record) = records.get_mut(id) {
            record.updated_at = updated_at;
        }
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn find_latest_by_user(&self, user_id: &str) -> Result<Option<ProgressRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| KalikeError::Database("Progress store lock poisoned".into()))?;

        Ok(records
            .values()
            .filter(|r| r.user_id == user_id)
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn insert(&self, new: NewProgress) -> Result<ProgressRecord> {
        let now = Utc::now();
        let record = ProgressRecord {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            lesson_id: new.lesson_id,
            xp: new.xp,
            streak: new.streak,
            badges: new.badges,
            created_at: now,
            updated_at: now,
        };

        let mut records = self
            .records
            .lock()
            .map_err(|_| KalikeError::Database("Progress store lock poisoned".into()))?;
        records.insert(record.id.clone(), record.clone());

        Ok(record)
    }

    async fn update_by_id(&self, id: &str, patch: ProgressPatch) -> Result<Option<ProgressRecord>> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| KalikeError::Database("Progress store lock poisoned".into()))?;

        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };

        record.xp = patch.xp;
        record.streak = patch.streak;
        record.badges = patch.badges;
        if patch.lesson_id.is_some() {
            record.lesson_id = patch.lesson_id;
        }
        record.updated_at = Utc::now();

        Ok(Some(record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryProgressStore::new();

        assert!(store.find_latest_by_user("u1").await.unwrap().is_none());

        let inserted = store
            .insert(NewProgress {
                user_id: "u1".into(),
                lesson_id: Some("greetings".into()),
                xp: 10,
                streak: 1,
                badges: vec![],
            })
            .await
            .unwrap();

        let found = store.find_latest_by_user("u1").await.unwrap().unwrap();
        assert_eq!(found, inserted);
        assert_eq!(found.lesson_id.as_deref(), Some("greetings"));
    }

    #[tokio::test]
    async fn test_memory_store_patch_keeps_lesson_when_absent() {
        let store = MemoryProgressStore::new();
        let inserted = store
            .insert(NewProgress {
                user_id: "u1".into(),
                lesson_id: Some("greetings".into()),
                xp: 10,
                streak: 1,
                badges: vec![],
            })
            .await
            .unwrap();

        let updated = store
            .update_by_id(
                &inserted.id,
                ProgressPatch {
                    xp: 20,
                    streak: 2,
                    badges: vec![],
                    lesson_id: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.xp, 20);
        assert_eq!(updated.lesson_id.as_deref(), Some("greetings"));
    }

    #[tokio::test]
    async fn test_memory_store_update_missing_record() {
        let store = MemoryProgressStore::new();
        let result = store
            .update_by_id(
                "nope",
                ProgressPatch {
                    xp: 10,
                    streak: 1,
                    badges: vec![],
                    lesson_id: None,
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
