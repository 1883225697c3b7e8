//! Repository traits.
//!
//! Both the in-memory [`DemoStore`](crate::demo::DemoStore) and the SQLite
//! [`Storage`](crate::storage::Storage) implement these. The HTTP layer depends
//! on the abstraction, never on a concrete backend.
//!
//! Mutations that target a missing identifier are silent no-ops. They report
//! whether anything changed through their `bool` return value and leave it to
//! the caller to decide whether that is an error.

use std::future::Future;

use crate::error::Result;
use crate::model::{MetricsSnapshot, PanicLog, Period, Recipient, RecipientSettings, User};

/// The session user and the user directory.
pub trait UserRepository: Send + Sync {
    /// Replace the session user unconditionally.
    fn set_user(&self, user: User) -> impl Future<Output = Result<()>> + Send;

    fn get_user(&self) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Drop the session user. Idempotent.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;

    /// A copy of the directory, in insertion order.
    fn get_all_users(&self) -> impl Future<Output = Result<Vec<User>>> + Send;

    /// Add a user to the directory, replacing any entry with the same id.
    fn insert_user(&self, user: User) -> impl Future<Output = Result<()>> + Send;

    /// Remove the directory entry with this id.
    ///
    /// The session user is left alone even when the ids match.
    fn delete_user(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Replace the directory entry with the same id, and the session copy too
    /// when the session user has that id.
    ///
    /// Returns whether the directory held the entry.
    fn update_user(&self, user: User) -> impl Future<Output = Result<bool>> + Send;
}

/// Admin SMS configuration.
pub trait ConfigRepository: Send + Sync {
    fn get_recipients(&self) -> impl Future<Output = Result<RecipientSettings>> + Send;

    /// Replace the primary number. No format or membership check.
    fn update_primary_number(&self, phone: String) -> impl Future<Output = Result<()>> + Send;

    /// Append a recipient under a freshly generated id. Duplicate phones are allowed.
    fn add_recipient(
        &self,
        name: String,
        phone: String,
    ) -> impl Future<Output = Result<Recipient>> + Send;

    /// Remove the recipient with this id.
    ///
    /// The primary number is not touched, even if it equals the removed phone.
    fn remove_recipient(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// The admin metrics query.
pub trait MetricsSource: Send + Sync {
    fn fetch_metrics(&self, period: Period)
    -> impl Future<Output = Result<MetricsSnapshot>> + Send;
}

/// The append-only panic log.
pub trait PanicLogRepository: Send + Sync {
    /// Append a log entry for `user` and bump their panic count.
    ///
    /// The count is bumped on the directory entry and on the session copy when
    /// either carries the user's id.
    fn record_panic(
        &self,
        user: &User,
        location: Option<String>,
    ) -> impl Future<Output = Result<PanicLog>> + Send;
}

/// Everything the HTTP layer needs from a backend.
pub trait Backend:
    UserRepository + ConfigRepository + MetricsSource + PanicLogRepository + Clone + 'static
{
}

impl<T> Backend for T where
    T: UserRepository + ConfigRepository + MetricsSource + PanicLogRepository + Clone + 'static
{
}
