//! Submission document schema
//!
//! One row per graded (or accepted-ungraded) exercise attempt.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for submissions
pub const SUBMISSION_COLLECTION: &str = "submissions";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SubmissionDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex ObjectId of the submitting user
    pub user_id: String,

    /// Hex ObjectId of the exercise
    pub exercise_id: String,

    /// Answer text or speech transcript as submitted
    pub payload: String,

    /// Whether the attempt counted as correct/accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,

    /// Score 0-100 where graded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,

    /// Feedback text from the grader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    /// "rule" for quiz grading, "model" for model grading, absent if ungraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graded_by: Option<String>,
}

impl IntoIndexes for SubmissionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(IndexOptions::builder().name("user_id".to_string()).build()),
        )]
    }
}

impl MutMetadata for SubmissionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
