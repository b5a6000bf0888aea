//! Tutor booking document schema

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for bookings
pub const BOOKING_COLLECTION: &str = "bookings";

/// Booking lifecycle state
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BookingDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex ObjectId of the learner
    pub learner_id: String,

    /// Hex ObjectId of the tutor profile
    pub tutor_id: String,

    /// Scheduled start time (UTC)
    pub scheduled_start: DateTime,

    pub duration_minutes: i64,

    pub status: BookingStatus,

    /// Agreed price in minor currency units
    pub price_minor: i64,
}

impl BookingDoc {
    /// Whether this booking still occupies its slot
    pub fn occupies_slot(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

// Manual impl: bson::DateTime has no Default, and the collection wrapper
// requires one.
impl Default for BookingDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            learner_id: String::new(),
            tutor_id: String::new(),
            scheduled_start: DateTime::from_millis(0),
            duration_minutes: 0,
            status: BookingStatus::default(),
            price_minor: 0,
        }
    }
}

impl IntoIndexes for BookingDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tutor_id": 1, "scheduled_start": 1 },
                Some(
                    IndexOptions::builder()
                        .name("tutor_schedule".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "learner_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("learner_id".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for BookingDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_booking_is_a_pending_epoch_slot() {
        let booking = BookingDoc::default();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.scheduled_start, DateTime::from_millis(0));
        assert!(booking.occupies_slot());
    }
}
