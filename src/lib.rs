//! Kalike - server backend for the Kannada learning platform
//!
//! ## Services
//!
//! - **Auth**: JWT sessions over argon2-hashed credentials
//! - **Lessons**: structured Kannada lesson catalog with admin CRUD
//! - **Exercises**: quiz, writing and speaking exercises with rule and
//!   model grading
//! - **Progress**: experience points, daily streaks and badges
//! - **Chat**: room-scoped practice chat over WebSocket
//! - **Tutors**: tutor marketplace with premium-gated bookings
//! - **Billing**: provider-hosted checkout mirrored via webhook

pub mod auth;
pub mod billing;
pub mod chat;
pub mod config;
pub mod db;
pub mod llm;
pub mod progress;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{KalikeError, Result};
