//! Exercise document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for exercises
pub const EXERCISE_COLLECTION: &str = "exercises";

/// Kind of exercise, determines how a submission is graded
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    /// Multiple choice or exact answer, graded by string match
    #[default]
    Quiz,
    /// Free-form written Kannada, graded by the language model
    Writing,
    /// Spoken response, client sends the transcript, graded by the model
    Speaking,
}

/// An exercise attached to a lesson
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ExerciseDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Slug of the owning lesson
    pub lesson_slug: String,

    pub kind: ExerciseKind,

    /// Question or task shown to the learner
    pub prompt: String,

    /// Answer choices for quiz exercises
    #[serde(default)]
    pub choices: Vec<String>,

    /// Expected answer for quiz exercises
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// Grading hints passed to the model for writing/speaking exercises
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric: Option<String>,
}

impl IntoIndexes for ExerciseDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "lesson_slug": 1 },
            Some(
                IndexOptions::builder()
                    .name("lesson_slug".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ExerciseDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
