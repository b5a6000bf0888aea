//! Progress update arithmetic
//!
//! Pure function over (prior record, now). Streak rules:
//! - no prior record: streak starts at 1
//! - prior activity less than one window (24h) ago: streak increments
//! - prior activity more than two windows (48h) ago: streak resets to 1
//! - in between: streak is held unchanged
//!
//! The hold policy for the 24-48h zone is deliberate: incrementing would
//! reward a missed day, and the 48h boundary already handles true lapses.

use chrono::{DateTime, Duration, Utc};

use super::ProgressRecord;

/// Points granted per completed activity. No partial credit, no weighting.
pub const ACTIVITY_AWARD: i64 = 10;

/// Hours in one streak window
pub const STREAK_WINDOW_HOURS: i64 = 24;

/// Ordered badge thresholds: minimum cumulative xp -> badge name.
/// Badges latch: once earned they are never removed.
pub const BADGE_THRESHOLDS: &[(i64, &str)] = &[
    (50, "Learner"),
    (150, "Scholar"),
    (300, "Master"),
];

/// Result of applying one activity to a prior state
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOutcome {
    pub xp: i64,
    pub streak: i64,
    pub badges: Vec<String>,
}

/// Compute the new cumulative state after one completed activity.
pub fn apply_activity(prior: Option<&ProgressRecord>, now: DateTime<Utc>) -> ActivityOutcome {
    let prior_xp = prior.map(|p| p.xp).unwrap_or(0);
    let xp = prior_xp + ACTIVITY_AWARD;

    let streak = match prior {
        None => 1,
        Some(p) => {
            let elapsed = now - p.updated_at;
            if elapsed < Duration::hours(STREAK_WINDOW_HOURS) {
                p.streak + 1
            } else if elapsed > Duration::hours(2 * STREAK_WINDOW_HOURS) {
                1
            } else {
                p.streak
            }
        }
    };

    let mut badges: Vec<String> = prior.map(|p| p.badges.clone()).unwrap_or_default();
    for (minimum, name) in BADGE_THRESHOLDS {
        if xp >= *minimum && !badges.iter().any(|b| b == name) {
            badges.push((*name).to_string());
        }
    }

    ActivityOutcome { xp, streak, badges }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(xp: i64, streak: i64, badges: &[&str], hours_ago: i64) -> ProgressRecord {
        let updated_at = Utc::now() - Duration::hours(hours_ago);
        ProgressRecord {
            id: "p1".into(),
            user_id: "u1".into(),
            lesson_id: None,
            xp,
            streak,
            badges: badges.iter().map(|b| b.to_string()).collect(),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn test_first_activity() {
        let outcome = apply_activity(None, Utc::now());
        assert_eq!(outcome.xp, 10);
        assert_eq!(outcome.streak, 1);
        assert!(outcome.badges.is_empty());
    }

    #[test]
    fn test_award_is_fixed() {
        let prior = record(70, 2, &["Learner"], 1);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.xp, 80);
    }

    #[test]
    fn test_streak_increments_inside_window() {
        let prior = record(40, 3, &[], 1);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.streak, 4);
    }

    #[test]
    fn test_streak_resets_after_two_windows() {
        let prior = record(20, 2, &[], 50);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.xp, 30);
        assert_eq!(outcome.streak, 1);
        assert!(outcome.badges.is_empty());
    }

    #[test]
    fn test_streak_held_in_middle_zone() {
        let prior = record(100, 5, &["Learner"], 30);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.streak, 5);
    }

    #[test]
    fn test_learner_badge_at_fifty() {
        let prior = record(40, 3, &[], 1);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.xp, 50);
        assert_eq!(outcome.streak, 4);
        assert_eq!(outcome.badges, vec!["Learner".to_string()]);
    }

    #[test]
    fn test_scholar_badge_at_one_fifty() {
        let prior = record(145, 5, &["Learner"], 10);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.xp, 155);
        assert_eq!(outcome.streak, 6);
        assert_eq!(
            outcome.badges,
            vec!["Learner".to_string(), "Scholar".to_string()]
        );
    }

    #[test]
    fn test_badges_never_shrink() {
        // Prior set is preserved even when xp was backfilled oddly
        let prior = record(300, 1, &["Learner", "Scholar"], 1);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert!(outcome.badges.contains(&"Learner".to_string()));
        assert!(outcome.badges.contains(&"Scholar".to_string()));
        assert!(outcome.badges.contains(&"Master".to_string()));
        assert_eq!(outcome.badges.len(), 3);
    }

    #[test]
    fn test_badges_not_duplicated() {
        let prior = record(60, 2, &["Learner"], 1);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.badges, vec!["Learner".to_string()]);
    }

    #[test]
    fn test_all_thresholds_latch_in_one_pass() {
        // A fresh record jumping past every threshold earns everything at once
        let prior = record(295, 9, &["Learner", "Scholar"], 1);
        let outcome = apply_activity(Some(&prior), Utc::now());
        assert_eq!(outcome.xp, 305);
        assert_eq!(
            outcome.badges,
            vec![
                "Learner".to_string(),
                "Scholar".to_string(),
                "Master".to_string()
            ]
        );
    }
}
