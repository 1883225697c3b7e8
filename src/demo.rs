//! In-memory demo backend.
//!
//! [`DemoStore`] holds the session user, a mock user directory, mock panic
//! logs, the admin SMS configuration and static per-period counters. Nothing
//! is persisted; dropping the store drops the data.
//!
//! All collections sit behind one lock, so a store shared across a
//! multi-threaded runtime still sees every operation in a single order.
//! Reads always hand back owned copies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::aggregation::{build_snapshot, panic_log_for};
use crate::error::Result;
use crate::model::{
    EmergencyContact, MetricsSnapshot, PanicLog, Period, PeriodStats, Recipient,
    RecipientSettings, User,
};
use crate::store::{ConfigRepository, MetricsSource, PanicLogRepository, UserRepository};

/// Simulated latency of a metrics query.
pub const DEFAULT_METRICS_LATENCY: Duration = Duration::from_millis(400);

/// Primary agent number the demo store starts with.
pub const SEED_PRIMARY_NUMBER: &str = "+15611231234";

#[derive(Debug, Default)]
struct DemoState {
    session: Option<User>,
    users: Vec<User>,
    logs: Vec<PanicLog>,
    primary: String,
    recipients: Vec<Recipient>,
    stats: HashMap<Period, PeriodStats>,
}

/// The in-memory backend. Cloning shares the same data.
#[derive(Debug, Clone)]
pub struct DemoStore {
    state: Arc<RwLock<DemoState>>,
    latency: Duration,
}

impl DemoStore {
    /// A store with no users, logs, recipients or counters.
    pub fn empty() -> Self {
        Self {
            state: Arc::new(RwLock::new(DemoState::default())),
            latency: DEFAULT_METRICS_LATENCY,
        }
    }

    /// A store preloaded with the demo directory, logs and admin settings.
    pub fn seeded() -> Self {
        let state = DemoState {
            session: None,
            users: seed_users(),
            logs: seed_logs(),
            primary: SEED_PRIMARY_NUMBER.to_string(),
            recipients: vec![
                recipient("r1", "Dispatch Center", "+15619990001"),
                recipient("r2", "Regional Manager", "+15619990002"),
            ],
            stats: HashMap::from([
                (Period::Week, stats(12, 45)),
                (Period::Month, stats(58, 120)),
                (Period::All, stats(1450, 890)),
            ]),
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            latency: DEFAULT_METRICS_LATENCY,
        }
    }

    /// Override the simulated metrics latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for DemoStore {
    fn default() -> Self {
        Self::seeded()
    }
}

impl UserRepository for DemoStore {
    async fn set_user(&self, user: User) -> Result<()> {
        self.state.write().await.session = Some(user);
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<User>> {
        Ok(self.state.read().await.session.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.state.write().await.session = None;
        Ok(())
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().await.users.clone())
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        match state.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => state.users.push(user),
        }
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(idx) = state.users.iter().position(|u| u.id == id) else {
            debug!(user_id = %id, "Delete skipped, user not in directory");
            return Ok(false);
        };
        state.users.remove(idx);
        Ok(true)
    }

    async fn update_user(&self, user: User) -> Result<bool> {
        let mut state = self.state.write().await;

        if let Some(session) = state.session.as_mut().filter(|s| s.id == user.id) {
            *session = user.clone();
        }

        match state.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => {
                *existing = user;
                Ok(true)
            }
            None => {
                debug!(user_id = %user.id, "Update skipped, user not in directory");
                Ok(false)
            }
        }
    }
}

impl ConfigRepository for DemoStore {
    async fn get_recipients(&self) -> Result<RecipientSettings> {
        let state = self.state.read().await;
        Ok(RecipientSettings {
            primary: state.primary.clone(),
            list: state.recipients.clone(),
        })
    }

    async fn update_primary_number(&self, phone: String) -> Result<()> {
        self.state.write().await.primary = phone;
        Ok(())
    }

    async fn add_recipient(&self, name: String, phone: String) -> Result<Recipient> {
        let created = Recipient {
            id: Uuid::new_v4().to_string(),
            name,
            phone,
        };
        self.state.write().await.recipients.push(created.clone());
        Ok(created)
    }

    async fn remove_recipient(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.recipients.len();
        state.recipients.retain(|r| r.id != id);
        Ok(state.recipients.len() != before)
    }
}

impl MetricsSource for DemoStore {
    /// Static counters per period; the log list is returned whole whatever the
    /// period.
    async fn fetch_metrics(&self, period: Period) -> Result<MetricsSnapshot> {
        tokio::time::sleep(self.latency).await;

        let state = self.state.read().await;
        let stats = state
            .stats
            .get(&period)
            .copied()
            .unwrap_or(PeriodStats {
                new_signups: 0,
                active_users: 0,
            });

        Ok(build_snapshot(
            period,
            stats,
            &state.users,
            state.logs.clone(),
        ))
    }
}

impl PanicLogRepository for DemoStore {
    async fn record_panic(&self, user: &User, location: Option<String>) -> Result<PanicLog> {
        let log = panic_log_for(user, location, Utc::now());

        let mut state = self.state.write().await;
        if let Some(entry) = state.users.iter_mut().find(|u| u.id == user.id) {
            entry.panic_count = entry.panic_count.saturating_add(1);
        }
        if let Some(session) = state.session.as_mut().filter(|s| s.id == user.id) {
            session.panic_count = session.panic_count.saturating_add(1);
        }
        state.logs.push(log.clone());

        Ok(log)
    }
}

// ============================================================================
// Seed data
// ============================================================================

fn stats(new_signups: u64, active_users: u64) -> PeriodStats {
    PeriodStats {
        new_signups,
        active_users,
    }
}

fn recipient(id: &str, name: &str, phone: &str) -> Recipient {
    Recipient {
        id: id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
    }
}

fn seed_user(
    id: &str,
    first_name: &str,
    last_name: &str,
    agent: &str,
    joined_day: u32,
    panic_count: u32,
) -> User {
    let digit = id.trim_start_matches('u');
    User {
        id: id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        dob: None,
        phone: Some(format!("+156100000{digit:0>2}")),
        agent: Some(agent.to_string()),
        email: Some(format!("{}@example.com", first_name.to_lowercase())),
        emergency_contacts: Vec::new(),
        joined_date: NaiveDate::from_ymd_opt(2025, 2, joined_day),
        panic_count,
    }
}

fn seed_users() -> Vec<User> {
    vec![
        seed_user("u1", "John", "Doe", "Agent Smith", 10, 3),
        seed_user("u2", "Alice", "Wonder", "Agent Carter", 15, 0),
        seed_user("u3", "Bob", "Builder", "Agent Smith", 20, 5),
        seed_user("u4", "Charlie", "Chaplin", "Agent Bond", 22, 1),
        seed_user("u5", "David", "Goggins", "Agent Smith", 23, 8),
        seed_user("u6", "Eve", "Polastri", "Agent Carter", 24, 2),
    ]
}

fn seed_log(id: &str, user_name: &str, user_phone: &str, agent: &str, at: &str) -> PanicLog {
    PanicLog {
        id: id.to_string(),
        user_name: user_name.to_string(),
        user_phone: user_phone.to_string(),
        agent: agent.to_string(),
        timestamp: at.parse::<DateTime<Utc>>().unwrap_or_default(),
        location: None,
    }
}

fn seed_logs() -> Vec<PanicLog> {
    vec![
        seed_log("p1", "Bob Builder", "+15610000003", "Agent Smith", "2025-02-24T14:30:00Z"),
        seed_log("p2", "John Doe", "+15610000001", "Agent Smith", "2025-02-24T12:15:00Z"),
        seed_log("p3", "Bob Builder", "+15610000003", "Agent Smith", "2025-02-23T09:45:00Z"),
        seed_log("p4", "Charlie Chaplin", "+15610000004", "Agent Bond", "2025-02-22T18:20:00Z"),
        seed_log("p5", "Bob Builder", "+15610000003", "Agent Smith", "2025-02-21T22:10:00Z"),
        seed_log("p6", "David Goggins", "+15610000005", "Agent Smith", "2025-02-25T08:00:00Z"),
        seed_log("p7", "Eve Polastri", "+15610000006", "Agent Carter", "2025-02-25T09:15:00Z"),
    ]
}

/// Emergency contacts attached to the demo login account.
pub fn demo_contacts() -> Vec<EmergencyContact> {
    [
        ("Jane Doe", "+15615550199"),
        ("Bob Smith", "+15615550188"),
        ("Alice Wonderland", "+15615550177"),
    ]
    .into_iter()
    .map(|(name, phone)| EmergencyContact {
        name: name.to_string(),
        phone: phone.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(id: &str) -> User {
        User {
            id: id.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            dob: Some("01/02/1990".to_string()),
            phone: Some("+15615550100".to_string()),
            agent: Some("Agent Smith".to_string()),
            email: None,
            emergency_contacts: demo_contacts(),
            joined_date: None,
            panic_count: 0,
        }
    }

    #[tokio::test]
    async fn test_session_set_get_clear() {
        let store = DemoStore::seeded();
        assert!(store.get_user().await.unwrap().is_none());

        store.set_user(sample_user("s1")).await.unwrap();
        assert_eq!(store.get_user().await.unwrap().unwrap().id, "s1");

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_users_returns_copy() {
        let store = DemoStore::seeded();

        let mut users = store.get_all_users().await.unwrap();
        users.clear();

        assert_eq!(store.get_all_users().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_seeded_phone_numbers() {
        let store = DemoStore::seeded();
        let users = store.get_all_users().await.unwrap();
        assert_eq!(users[0].phone.as_deref(), Some("+15610000001"));
        assert_eq!(users[5].phone.as_deref(), Some("+15610000006"));
    }

    #[tokio::test]
    async fn test_add_then_remove_recipient() {
        let store = DemoStore::seeded();

        let added = store
            .add_recipient("Night Desk".to_string(), "+15619990003".to_string())
            .await
            .unwrap();

        let settings = store.get_recipients().await.unwrap();
        assert_eq!(settings.list.iter().filter(|r| r.id == added.id).count(), 1);
        assert_eq!(settings.list.len(), 3);

        assert!(store.remove_recipient(&added.id).await.unwrap());
        let settings = store.get_recipients().await.unwrap();
        assert!(settings.list.iter().all(|r| r.id != added.id));
        assert_eq!(settings.list.len(), 2);
    }

    #[tokio::test]
    async fn test_recipient_ids_are_unique() {
        let store = DemoStore::empty();
        let a = store
            .add_recipient("A".to_string(), "+1".to_string())
            .await
            .unwrap();
        let b = store
            .add_recipient("A".to_string(), "+1".to_string())
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.get_recipients().await.unwrap().list.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_missing_recipient_is_noop() {
        let store = DemoStore::seeded();
        assert!(!store.remove_recipient("nope").await.unwrap());
        assert_eq!(store.get_recipients().await.unwrap().list.len(), 2);
    }

    #[tokio::test]
    async fn test_removing_primary_recipient_leaves_primary_stale() {
        let store = DemoStore::seeded();
        store
            .update_primary_number("+15619990001".to_string())
            .await
            .unwrap();

        store.remove_recipient("r1").await.unwrap();

        let settings = store.get_recipients().await.unwrap();
        assert_eq!(settings.primary, "+15619990001");
        assert!(settings.list.iter().all(|r| r.phone != "+15619990001"));
    }

    #[tokio::test]
    async fn test_update_primary_number_accepts_anything() {
        let store = DemoStore::seeded();
        store
            .update_primary_number("not a phone".to_string())
            .await
            .unwrap();
        assert_eq!(store.get_recipients().await.unwrap().primary, "not a phone");
    }

    #[tokio::test]
    async fn test_update_user_patches_matching_session() {
        let store = DemoStore::seeded();
        let mut john = store.get_all_users().await.unwrap()[0].clone();
        store.set_user(john.clone()).await.unwrap();

        john.agent = Some("Agent Carter".to_string());
        assert!(store.update_user(john.clone()).await.unwrap());

        let session = store.get_user().await.unwrap().unwrap();
        let entry = store.get_all_users().await.unwrap()[0].clone();
        assert_eq!(session, john);
        assert_eq!(entry, john);
    }

    #[tokio::test]
    async fn test_update_user_leaves_other_session_alone() {
        let store = DemoStore::seeded();
        let me = sample_user("s1");
        store.set_user(me.clone()).await.unwrap();

        let mut alice = store.get_all_users().await.unwrap()[1].clone();
        alice.last_name = "Liddell".to_string();
        assert!(store.update_user(alice).await.unwrap());

        assert_eq!(store.get_user().await.unwrap().unwrap(), me);
    }

    #[tokio::test]
    async fn test_update_missing_user_is_noop() {
        let store = DemoStore::seeded();
        let before = store.get_all_users().await.unwrap();

        assert!(!store.update_user(sample_user("ghost")).await.unwrap());

        assert_eq!(store.get_all_users().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_user_removes_exactly_one() {
        let store = DemoStore::seeded();

        assert!(store.delete_user("u3").await.unwrap());
        let users = store.get_all_users().await.unwrap();
        assert_eq!(users.len(), 5);
        assert!(users.iter().all(|u| u.id != "u3"));

        assert!(!store.delete_user("u3").await.unwrap());
        assert_eq!(store.get_all_users().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_delete_user_keeps_session() {
        let store = DemoStore::seeded();
        let john = store.get_all_users().await.unwrap()[0].clone();
        store.set_user(john.clone()).await.unwrap();

        store.delete_user("u1").await.unwrap();

        assert_eq!(store.get_user().await.unwrap(), Some(john));
    }

    #[tokio::test]
    async fn test_insert_user_replaces_same_id() {
        let store = DemoStore::empty();
        store.insert_user(sample_user("n1")).await.unwrap();

        let mut renamed = sample_user("n1");
        renamed.first_name = "Renamed".to_string();
        store.insert_user(renamed).await.unwrap();

        let users = store.get_all_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].first_name, "Renamed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_metrics_per_period() {
        let store = DemoStore::seeded();

        let week = store.fetch_metrics(Period::Week).await.unwrap();
        assert_eq!((week.new_signups, week.active_users), (12, 45));

        let month = store.fetch_metrics(Period::Month).await.unwrap();
        assert_eq!((month.new_signups, month.active_users), (58, 120));

        let all = store.fetch_metrics(Period::All).await.unwrap();
        assert_eq!((all.new_signups, all.active_users), (1450, 890));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_metrics_top_users_and_logs() {
        let store = DemoStore::seeded();

        for period in [Period::Week, Period::Month, Period::All] {
            let snapshot = store.fetch_metrics(period).await.unwrap();

            assert!(snapshot.top_users.iter().all(|u| u.panic_count > 0));
            assert!(
                snapshot
                    .top_users
                    .windows(2)
                    .all(|w| w[0].panic_count >= w[1].panic_count)
            );
            let ids: Vec<&str> = snapshot.top_users.iter().map(|u| u.id.as_str()).collect();
            assert_eq!(ids, vec!["u5", "u3", "u1", "u6", "u4"]);

            // The demo store does not narrow logs by period.
            assert_eq!(snapshot.recent_logs.len(), 7);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_metrics_waits() {
        let store = DemoStore::seeded();
        let start = tokio::time::Instant::now();

        store.fetch_metrics(Period::Week).await.unwrap();

        assert!(start.elapsed() >= DEFAULT_METRICS_LATENCY);
    }

    #[tokio::test]
    async fn test_record_panic_appends_and_counts() {
        let store = DemoStore::seeded().with_latency(Duration::from_millis(1));
        let bob = store.get_all_users().await.unwrap()[2].clone();
        store.set_user(bob.clone()).await.unwrap();

        let log = store
            .record_panic(&bob, Some("https://maps.google.com/?q=1,2".to_string()))
            .await
            .unwrap();

        assert_eq!(log.user_name, "Bob Builder");
        assert_eq!(store.get_all_users().await.unwrap()[2].panic_count, 6);
        assert_eq!(store.get_user().await.unwrap().unwrap().panic_count, 6);

        let snapshot = store.fetch_metrics(Period::All).await.unwrap();
        assert_eq!(snapshot.recent_logs.len(), 8);
    }

    #[tokio::test]
    async fn test_record_panic_count_saturates() {
        let store = DemoStore::empty();
        let mut user = sample_user("n1");
        user.panic_count = u32::MAX;
        store.insert_user(user.clone()).await.unwrap();
        store.set_user(user.clone()).await.unwrap();

        store.record_panic(&user, None).await.unwrap();

        assert_eq!(store.get_all_users().await.unwrap()[0].panic_count, u32::MAX);
        assert_eq!(store.get_user().await.unwrap().unwrap().panic_count, u32::MAX);
    }
}
