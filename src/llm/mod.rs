//! Model-backed exercise grading

pub mod client;

pub use client::{ModelClient, ModelClientConfig, ModelGrade};
