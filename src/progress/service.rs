//! Progress update unit of work
//!
//! `record_activity` is the single write path for gamification state. The
//! read-compute-write sequence runs under a per-user async lock so two
//! concurrent activities for the same user cannot both read the same prior
//! record and clobber each other's award. The lock map is process-local;
//! multi-replica deployments still need the store's last-write-wins ordering.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::types::{KalikeError, Result};

use super::rule::apply_activity;
use super::store::{NewProgress, ProgressPatch, ProgressStore};
use super::ProgressRecord;

pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            user_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply one completed activity to the user's cumulative state.
    ///
    /// Creates the record on first activity; otherwise patches the latest
    /// one. When a lesson id is supplied it replaces the stored association.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn record_activity(
        &self,
        user_id: &str,
        lesson_id: Option<String>,
    ) -> Result<ProgressRecord> {
        if user_id.trim().is_empty() {
            return Err(KalikeError::Validation("User id is required".to_string()));
        }

        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let prior = self.store.find_latest_by_user(user_id).await?;
        let outcome = apply_activity(prior.as_ref(), Utc::now());

        debug!(
            xp = outcome.xp,
            streak = outcome.streak,
            badges = outcome.badges.len(),
            "Recording activity"
        );

        match prior {
            None => {
                self.store
                    .insert(NewProgress {
                        user_id: user_id.to_string(),
                        lesson_id,
                        xp: outcome.xp,
                        streak: outcome.streak,
                        badges: outcome.badges,
                    })
                    .await
            }
            Some(existing) => self
                .store
                .update_by_id(
                    &existing.id,
                    ProgressPatch {
                        xp: outcome.xp,
                        streak: outcome.streak,
                        badges: outcome.badges,
                        lesson_id,
                    },
                )
                .await?
                .ok_or_else(|| {
                    KalikeError::NotFound(format!(
                        "Progress record {} vanished during update",
                        existing.id
                    ))
                }),
        }
    }

    /// Current state for a user, if they have recorded any activity
    pub async fn current(&self, user_id: &str) -> Result<Option<ProgressRecord>> {
        if user_id.trim().is_empty() {
            return Err(KalikeError::Validation("User id is required".to_string()));
        }
        self.store.find_latest_by_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::store::MemoryProgressStore;
    use chrono::Duration;

    fn service_with_memory() -> (ProgressService, Arc<MemoryProgressStore>) {
        let store = Arc::new(MemoryProgressStore::new());
        (ProgressService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_first_activity_creates_record() {
        let (service, _) = service_with_memory();
        let record = service.record_activity("u1", None).await.unwrap();
        assert_eq!(record.xp, 10);
        assert_eq!(record.streak, 1);
        assert!(record.badges.is_empty());
    }

    #[tokio::test]
    async fn test_second_activity_updates_in_place() {
        let (service, _) = service_with_memory();
        let first = service.record_activity("u1", None).await.unwrap();
        let second = service
            .record_activity("u1", Some("greetings".into()))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.xp, 20);
        assert_eq!(second.streak, 2);
        assert_eq!(second.lesson_id.as_deref(), Some("greetings"));
    }

    #[tokio::test]
    async fn test_empty_user_id_rejected() {
        let (service, _) = service_with_memory();
        let err = service.record_activity("  ", None).await.unwrap_err();
        assert!(matches!(err, KalikeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_streak_resets_after_long_gap() {
        let (service, store) = service_with_memory();
        let first = service.record_activity("u1", None).await.unwrap();
        store.backdate(&first.id, Utc::now() - Duration::hours(72));

        let second = service.record_activity("u1", None).await.unwrap();
        assert_eq!(second.xp, 20);
        assert_eq!(second.streak, 1);
    }

    #[tokio::test]
    async fn test_badge_earned_at_threshold() {
        let (service, _) = service_with_memory();
        let mut last = None;
        for _ in 0..5 {
            last = Some(service.record_activity("u1", None).await.unwrap());
        }
        let record = last.unwrap();
        assert_eq!(record.xp, 50);
        assert_eq!(record.badges, vec!["Learner".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_activities_both_count() {
        let (service, _) = service_with_memory();
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let svc = service.clone();
            handles.push(tokio::spawn(async move {
                svc.record_activity("u1", None).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = service.current("u1").await.unwrap().unwrap();
        assert_eq!(record.xp, 100);
        assert_eq!(record.streak, 10);
        assert_eq!(record.badges, vec!["Learner".to_string()]);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let (service, _) = service_with_memory();
        service.record_activity("u1", None).await.unwrap();
        service.record_activity("u1", None).await.unwrap();
        let other = service.record_activity("u2", None).await.unwrap();
        assert_eq!(other.xp, 10);
        assert_eq!(other.streak, 1);

        let first = service.current("u1").await.unwrap().unwrap();
        assert_eq!(first.xp, 20);
    }

    #[tokio::test]
    async fn test_current_is_none_without_activity() {
        let (service, _) = service_with_memory();
        assert!(service.current("u1").await.unwrap().is_none());
    }
}
