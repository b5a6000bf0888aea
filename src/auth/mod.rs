//! Authentication and authorization for Kalike
//!
//! Provides:
//! - JWT token generation and validation
//! - Permission levels for operation authorization
//! - Password hashing with Argon2

pub mod jwt;
pub mod password;
pub mod permissions;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, MIN_SECRET_CHARS};
pub use password::{hash_password, verify_password};
pub use permissions::{get_required_permission, is_operation_allowed, PermissionLevel};
