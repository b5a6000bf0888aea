//! Gamified progress tracking
//!
//! One record per user holds cumulative experience points, a consecutive-day
//! streak, and the earned badge set. `rule` is the pure update arithmetic,
//! `store` the persistence seam, `service` the request-scoped unit of work
//! that ties them together with one read and one write per activity.

pub mod rule;
pub mod service;
pub mod store;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use rule::{apply_activity, ActivityOutcome, ACTIVITY_AWARD, BADGE_THRESHOLDS};
pub use service::ProgressService;
pub use store::{MemoryProgressStore, MongoProgressStore, NewProgress, ProgressPatch, ProgressStore};

/// A user's persisted gamification state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    /// Store-assigned record id
    pub id: String,
    /// Opaque owning-user identifier
    pub user_id: String,
    /// Lesson the most recent activity belonged to, when supplied
    pub lesson_id: Option<String>,
    /// Cumulative experience points
    pub xp: i64,
    /// Consecutive qualifying days
    pub streak: i64,
    /// Earned badges, insertion order preserved, no duplicates
    pub badges: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
