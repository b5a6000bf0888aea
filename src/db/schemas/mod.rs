//! Document schemas for Kalike collections

pub mod booking;
pub mod chat_message;
pub mod exercise;
pub mod lesson;
pub mod metadata;
pub mod progress;
pub mod submission;
pub mod subscription;
pub mod tutor;
pub mod user;

pub use booking::{BookingDoc, BookingStatus, BOOKING_COLLECTION};
pub use chat_message::{ChatMessageDoc, CHAT_MESSAGE_COLLECTION};
pub use exercise::{ExerciseDoc, ExerciseKind, EXERCISE_COLLECTION};
pub use lesson::{LessonDoc, LESSON_COLLECTION};
pub use metadata::Metadata;
pub use progress::{ProgressDoc, PROGRESS_COLLECTION};
pub use submission::{SubmissionDoc, SUBMISSION_COLLECTION};
pub use subscription::{SubscriptionDoc, SUBSCRIPTION_COLLECTION};
pub use tutor::{TutorDoc, TUTOR_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
