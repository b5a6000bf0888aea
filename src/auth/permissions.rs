//! Permission levels and operation gating
//!
//! Learner accounts cover the normal study workflow. Tutor accounts can
//! additionally manage bookings made against them. Admin accounts manage
//! lesson content and tutor profiles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission levels for gated operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
#[derive(Default)]
pub enum PermissionLevel {
    /// Authenticated learner - study workflow operations
    #[default]
    Learner = 0,
    /// Tutor - can confirm and manage bookings against their profile
    Tutor = 1,
    /// Admin - content and tutor-profile management
    Admin = 2,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Learner => write!(f, "LEARNER"),
            PermissionLevel::Tutor => write!(f, "TUTOR"),
            PermissionLevel::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Get the required permission level for a gated operation.
/// Returns None for unknown operations (which should be blocked).
pub fn get_required_permission(operation: &str) -> Option<PermissionLevel> {
    match operation {
        // Learner - normal study workflow
        "submit_exercise"
        | "record_activity"
        | "view_progress"
        | "join_chat"
        | "book_tutor"
        | "cancel_booking"
        | "view_subscription"
        | "start_checkout" => Some(PermissionLevel::Learner),

        // Tutor - booking management on own profile
        "confirm_booking" => Some(PermissionLevel::Tutor),

        // Admin - content management
        "create_lesson"
        | "update_lesson"
        | "delete_lesson"
        | "create_exercise"
        | "create_tutor" => Some(PermissionLevel::Admin),

        // Unknown operations are blocked
        _ => None,
    }
}

/// Check if an operation is allowed for the given permission level
pub fn is_operation_allowed(operation: &str, level: PermissionLevel) -> bool {
    match get_required_permission(operation) {
        Some(required) => level >= required,
        None => false, // Unknown operations are blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learner_operations() {
        assert!(is_operation_allowed("submit_exercise", PermissionLevel::Learner));
        assert!(is_operation_allowed("submit_exercise", PermissionLevel::Tutor));
        assert!(is_operation_allowed("submit_exercise", PermissionLevel::Admin));
    }

    #[test]
    fn test_tutor_operations() {
        assert!(!is_operation_allowed("confirm_booking", PermissionLevel::Learner));
        assert!(is_operation_allowed("confirm_booking", PermissionLevel::Tutor));
        assert!(is_operation_allowed("confirm_booking", PermissionLevel::Admin));
    }

    #[test]
    fn test_admin_operations() {
        assert!(!is_operation_allowed("create_lesson", PermissionLevel::Learner));
        assert!(!is_operation_allowed("create_lesson", PermissionLevel::Tutor));
        assert!(is_operation_allowed("create_lesson", PermissionLevel::Admin));
    }

    #[test]
    fn test_unknown_operations_blocked() {
        assert!(!is_operation_allowed("unknown_operation", PermissionLevel::Admin));
        assert!(!is_operation_allowed("drop_database", PermissionLevel::Admin));
    }

    #[test]
    fn test_every_gated_route_operation_is_listed() {
        // The route layer resolves these names through the table, so each
        // one must stay present here
        for op in [
            "create_lesson",
            "update_lesson",
            "delete_lesson",
            "create_exercise",
            "create_tutor",
        ] {
            assert_eq!(get_required_permission(op), Some(PermissionLevel::Admin));
        }
        assert_eq!(
            get_required_permission("confirm_booking"),
            Some(PermissionLevel::Tutor)
        );
    }

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::Admin > PermissionLevel::Tutor);
        assert!(PermissionLevel::Tutor > PermissionLevel::Learner);
    }
}
