//! Aggregation logic shared by every metrics backend.
//!
//! The backends differ in where counters and logs come from; ranking users and
//! assembling the snapshot is the same everywhere.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{MetricsSnapshot, PanicLog, Period, PeriodStats, User};

/// Rank users who have sent at least one alert, most alerts first.
///
/// The sort is stable: users with equal counts keep their directory order.
pub fn top_panic_users(users: &[User]) -> Vec<User> {
    let mut top: Vec<User> = users
        .iter()
        .filter(|u| u.panic_count > 0)
        .cloned()
        .collect();
    top.sort_by(|a, b| b.panic_count.cmp(&a.panic_count));
    top
}

/// Assemble the snapshot returned by a metrics query.
pub fn build_snapshot(
    period: Period,
    stats: PeriodStats,
    users: &[User],
    recent_logs: Vec<PanicLog>,
) -> MetricsSnapshot {
    MetricsSnapshot {
        period,
        new_signups: stats.new_signups,
        active_users: stats.active_users,
        top_users: top_panic_users(users),
        recent_logs,
    }
}

/// Build the log entry for an alert sent by `user` at `now`.
///
/// Missing phone or agent are stored as empty strings.
pub fn panic_log_for(user: &User, location: Option<String>, now: DateTime<Utc>) -> PanicLog {
    PanicLog {
        id: Uuid::new_v4().to_string(),
        user_name: user.full_name(),
        user_phone: user.phone.clone().unwrap_or_default(),
        agent: user.agent.clone().unwrap_or_default(),
        timestamp: now,
        location,
    }
}
