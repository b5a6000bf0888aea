//! HTTP routes for Kalike

pub mod auth_routes;
pub mod billing_routes;
pub mod chat_routes;
pub mod exercises;
pub mod health;
pub mod helpers;
pub mod lessons;
pub mod progress_routes;
pub mod tutors;

pub use auth_routes::handle_auth_request;
pub use billing_routes::handle_billing_request;
pub use chat_routes::handle_chat_request;
pub use exercises::handle_exercise_request;
pub use health::{health_check, readiness_check, version_info};
pub use lessons::handle_lesson_request;
pub use progress_routes::handle_progress_request;
pub use tutors::handle_tutor_request;
