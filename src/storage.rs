//! SQLite storage layer for Bondguard.
//!
//! [`Storage`] is the persistent counterpart to [`DemoStore`](crate::demo::DemoStore)
//! and implements the same repository traits. The schema is flat:
//!
//! - `users`: the directory, emergency contacts as a JSON column
//! - `recipients`: admin SMS broadcast list
//! - `settings`: key/value admin settings (the primary agent number, seeded
//!   so the panic flow always has someone to dial)
//! - `panic_logs`: append-only alert history
//!
//! The session user is process-local and never written to the database.
//! Metrics are computed from the tables for the requested window.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::aggregation::{build_snapshot, panic_log_for};
use crate::demo::SEED_PRIMARY_NUMBER;
use crate::error::{Error, Result};
use crate::model::{
    EmergencyContact, MetricsSnapshot, PanicLog, Period, PeriodStats, Recipient,
    RecipientSettings, User,
};
use crate::store::{ConfigRepository, MetricsSource, PanicLogRepository, UserRepository};

const PRIMARY_NUMBER_KEY: &str = "primary_number";

/// Database connection pool plus the in-memory session.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
    session: Arc<RwLock<Option<User>>>,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:bondguard.db?mode=rwc")
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Self::with_pool(pool).await
    }

    /// A fresh in-memory database on a single connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let storage = Self {
            pool,
            session: Arc::new(RwLock::new(None)),
        };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                dob TEXT,
                phone TEXT,
                agent TEXT,
                email TEXT,
                emergency_contacts TEXT NOT NULL DEFAULT '[]',
                joined_date TEXT,
                panic_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recipients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS panic_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                user_name TEXT NOT NULL,
                user_phone TEXT NOT NULL,
                agent TEXT NOT NULL,
                ts TEXT NOT NULL,
                location TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Window queries filter and order on the timestamp
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_panic_logs_ts
            ON panic_logs(ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(PRIMARY_NUMBER_KEY)
            .bind(SEED_PRIMARY_NUMBER)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Count users whose join date falls inside the window.
    async fn count_signups(&self, since: Option<DateTime<Utc>>) -> Result<u64> {
        let since_date = since
            .map(|ts| ts.date_naive().to_string())
            .unwrap_or_default();

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as total
            FROM users
            WHERE ? = '' OR joined_date >= ?
            "#,
        )
        .bind(&since_date)
        .bind(&since_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(to_count(row.try_get("total")?))
    }

    /// Count distinct users who sent an alert inside the window.
    async fn count_active(&self, since_ts: &str) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT user_id) as total
            FROM panic_logs
            WHERE ts >= ?
            "#,
        )
        .bind(since_ts)
        .fetch_one(&self.pool)
        .await?;

        Ok(to_count(row.try_get("total")?))
    }

    /// Logs inside the window, newest first.
    async fn logs_since(&self, since_ts: &str) -> Result<Vec<PanicLog>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_name, user_phone, agent, ts, location
            FROM panic_logs
            WHERE ts >= ?
            ORDER BY ts DESC
            "#,
        )
        .bind(since_ts)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }
}

impl UserRepository for Storage {
    async fn set_user(&self, user: User) -> Result<()> {
        *self.session.write().await = Some(user);
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<User>> {
        Ok(self.session.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.session.write().await = None;
        Ok(())
    }

    async fn get_all_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, first_name, last_name, dob, phone, agent, email,
                   emergency_contacts, joined_date, panic_count
            FROM users
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn insert_user(&self, user: User) -> Result<()> {
        let contacts = serde_json::to_string(&user.emergency_contacts)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, first_name, last_name, dob, phone, agent, email,
                               emergency_contacts, joined_date, panic_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                dob = excluded.dob,
                phone = excluded.phone,
                agent = excluded.agent,
                email = excluded.email,
                emergency_contacts = excluded.emergency_contacts,
                joined_date = excluded.joined_date,
                panic_count = excluded.panic_count
            "#,
        )
        .bind(&user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.dob)
        .bind(&user.phone)
        .bind(&user.agent)
        .bind(&user.email)
        .bind(contacts)
        .bind(user.joined_date.map(|d| d.to_string()))
        .bind(i64::from(user.panic_count))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_user(&self, user: User) -> Result<bool> {
        let contacts = serde_json::to_string(&user.emergency_contacts)?;

        let result = sqlx::query(
            r#"
            UPDATE users SET
                first_name = ?, last_name = ?, dob = ?, phone = ?, agent = ?,
                email = ?, emergency_contacts = ?, joined_date = ?, panic_count = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.dob)
        .bind(&user.phone)
        .bind(&user.agent)
        .bind(&user.email)
        .bind(contacts)
        .bind(user.joined_date.map(|d| d.to_string()))
        .bind(i64::from(user.panic_count))
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        let mut session = self.session.write().await;
        if let Some(current) = session.as_mut().filter(|s| s.id == user.id) {
            *current = user;
        }

        Ok(result.rows_affected() > 0)
    }
}

impl ConfigRepository for Storage {
    async fn get_recipients(&self) -> Result<RecipientSettings> {
        let primary: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(PRIMARY_NUMBER_KEY)
                .fetch_optional(&self.pool)
                .await?;

        let rows = sqlx::query("SELECT id, name, phone FROM recipients ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        let list = rows
            .iter()
            .map(|r| {
                Ok(Recipient {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                    phone: r.try_get("phone")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RecipientSettings {
            primary: primary.unwrap_or_default(),
            list,
        })
    }

    async fn update_primary_number(&self, phone: String) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(PRIMARY_NUMBER_KEY)
        .bind(&phone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_recipient(&self, name: String, phone: String) -> Result<Recipient> {
        let created = Recipient {
            id: Uuid::new_v4().to_string(),
            name,
            phone,
        };

        sqlx::query("INSERT INTO recipients (id, name, phone) VALUES (?, ?, ?)")
            .bind(&created.id)
            .bind(&created.name)
            .bind(&created.phone)
            .execute(&self.pool)
            .await?;

        Ok(created)
    }

    async fn remove_recipient(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM recipients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl MetricsSource for Storage {
    async fn fetch_metrics(&self, period: Period) -> Result<MetricsSnapshot> {
        let since = period.since(Utc::now());
        let since_ts = since.map(format_ts).unwrap_or_default();

        let stats = PeriodStats {
            new_signups: self.count_signups(since).await?,
            active_users: self.count_active(&since_ts).await?,
        };
        let users = self.get_all_users().await?;
        let logs = self.logs_since(&since_ts).await?;

        debug!(
            period = period.as_str(),
            log_count = logs.len(),
            "Metrics computed"
        );

        Ok(build_snapshot(period, stats, &users, logs))
    }
}

impl PanicLogRepository for Storage {
    async fn record_panic(&self, user: &User, location: Option<String>) -> Result<PanicLog> {
        let log = panic_log_for(user, location, Utc::now());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO panic_logs (id, user_id, user_name, user_phone, agent, ts, location)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&user.id)
        .bind(&log.user_name)
        .bind(&log.user_phone)
        .bind(&log.agent)
        .bind(format_ts(log.timestamp))
        .bind(&log.location)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET panic_count = panic_count + 1 WHERE id = ?")
            .bind(&user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut session = self.session.write().await;
        if let Some(current) = session.as_mut().filter(|s| s.id == user.id) {
            current.panic_count = current.panic_count.saturating_add(1);
        }

        Ok(log)
    }
}

/// Fixed-width UTC timestamps so string comparison orders them correctly.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_count(total: i64) -> u64 {
    u64::try_from(total).unwrap_or(0)
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let contacts: String = row.try_get("emergency_contacts")?;
    let emergency_contacts: Vec<EmergencyContact> = serde_json::from_str(&contacts)?;
    let joined_date: Option<String> = row.try_get("joined_date")?;
    let panic_count: i64 = row.try_get("panic_count")?;

    Ok(User {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        dob: row.try_get("dob")?,
        phone: row.try_get("phone")?,
        agent: row.try_get("agent")?,
        email: row.try_get("email")?,
        emergency_contacts,
        joined_date: joined_date.and_then(|d| d.parse().ok()),
        panic_count: u32::try_from(panic_count).unwrap_or(u32::MAX),
    })
}

fn log_from_row(row: &SqliteRow) -> Result<PanicLog> {
    let ts: String = row.try_get("ts")?;
    let timestamp = ts
        .parse::<DateTime<Utc>>()
        .map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))?;

    Ok(PanicLog {
        id: row.try_get("id")?,
        user_name: row.try_get("user_name")?,
        user_phone: row.try_get("user_phone")?,
        agent: row.try_get("agent")?,
        timestamp,
        location: row.try_get("location")?,
    })
}
