//! Data models for Bondguard.
//!
//! These types cross every boundary in the crate: the repositories store them,
//! the panic flow reads them, and the HTTP API serializes them as JSON.
//!
//! # Snapshots
//!
//! A [`PanicLog`] copies the user's name, phone and agent at the moment of the
//! alert. It is not a live reference, so later profile edits do not rewrite
//! history.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A name and phone number the user wants notified in an emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}

/// An app account, or a registrant visible to the admin console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique within the user directory.
    pub id: String,

    pub first_name: String,

    pub last_name: String,

    /// Date of birth exactly as the client formatted it.
    #[serde(default)]
    pub dob: Option<String>,

    /// Phone number with country code prefix (e.g. "+15610000001").
    #[serde(default)]
    pub phone: Option<String>,

    /// Name of the bond agent assigned to this client.
    #[serde(default)]
    pub agent: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Ordered; three entries by convention.
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,

    #[serde(default)]
    pub joined_date: Option<NaiveDate>,

    /// Number of panic alerts this user has sent.
    ///
    /// Only incremented by the panic flow, through
    /// [`PanicLogRepository::record_panic`](crate::store::PanicLogRepository::record_panic).
    #[serde(default)]
    pub panic_count: u32,
}

impl User {
    /// First and last name joined by a space, trimmed.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// An admin-configured SMS broadcast entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub phone: String,
}

/// Snapshot of the admin SMS configuration.
///
/// `primary` is a bare phone number. It is not required to match any entry in
/// `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSettings {
    pub primary: String,
    pub list: Vec<Recipient>,
}

/// One recorded panic alert. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanicLog {
    pub id: String,

    /// Full name at the time of the alert.
    pub user_name: String,

    pub user_phone: String,

    pub agent: String,

    pub timestamp: DateTime<Utc>,

    /// Map link for the reported position, if one was captured.
    #[serde(default)]
    pub location: Option<String>,
}

/// The reporting window for the admin metrics screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "all")]
    All,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "7d",
            Period::Month => "30d",
            Period::All => "all",
        }
    }

    /// Start of the window ending at `now`, or `None` for all time.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Week => Some(now - Duration::days(7)),
            Period::Month => Some(now - Duration::days(30)),
            Period::All => None,
        }
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "all" => Ok(Period::All),
            other => Err(Error::InvalidPeriod(other.to_string())),
        }
    }
}

/// Headline counters for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub new_signups: u64,
    pub active_users: u64,
}

/// Derived view for the admin metrics screen. Never stored.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub period: Period,

    pub new_signups: u64,

    pub active_users: u64,

    /// Users with at least one alert, most alerts first.
    pub top_users: Vec<User>,

    pub recent_logs: Vec<PanicLog>,
}

// ============================================================================
// Request bodies
// ============================================================================

/// Request body for POST /session/login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for POST /session/signup.
///
/// Phone numbers are the ten national digits; the `+1` prefix is added
/// server-side.
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub phone: String,
    pub agent: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,
}

/// Request body for PUT /session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<String>,
    /// National digits, without the `+1` prefix.
    pub phone: Option<String>,
    pub agent: Option<String>,
}

/// Request body for POST /admin/recipients.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipient {
    pub name: String,
    pub phone: String,
}

/// Request body for PUT /admin/recipients/primary.
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryNumber {
    pub phone: String,
}

/// Query parameters for GET /admin/metrics.
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// One of "7d", "30d" or "all" (default: "7d").
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_period() -> String {
    Period::Week.as_str().to_string()
}

/// Request body for POST /panic.
///
/// The device reports its own permission answer and position fix; the server
/// runs the rest of the alert sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct PanicTrigger {
    #[serde(default = "default_permission")]
    pub permission_granted: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Accuracy radius in meters.
    pub accuracy: Option<f64>,
}

fn default_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse() {
        assert_eq!("7d".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("30d".parse::<Period>().unwrap(), Period::Month);
        assert_eq!("all".parse::<Period>().unwrap(), Period::All);
    }

    #[test]
    fn test_period_parse_rejects_unknown() {
        let err = "90d".parse::<Period>().unwrap_err();
        assert!(matches!(err, Error::InvalidPeriod(tag) if tag == "90d"));
    }

    #[test]
    fn test_period_window() {
        let now = Utc::now();
        assert_eq!(Period::Week.since(now), Some(now - Duration::days(7)));
        assert_eq!(Period::Month.since(now), Some(now - Duration::days(30)));
        assert_eq!(Period::All.since(now), None);
    }

    #[test]
    fn test_full_name_trims_missing_parts() {
        let user = User {
            id: "u1".to_string(),
            first_name: "Cher".to_string(),
            last_name: String::new(),
            dob: None,
            phone: None,
            agent: None,
            email: None,
            emergency_contacts: vec![],
            joined_date: None,
            panic_count: 0,
        };
        assert_eq!(user.full_name(), "Cher");
    }

    #[test]
    fn test_panic_trigger_defaults_to_granted() {
        let trigger: PanicTrigger =
            serde_json::from_str(r#"{"latitude": 1.0, "longitude": 2.0}"#).unwrap();
        assert!(trigger.permission_granted);
        assert!(trigger.accuracy.is_none());
    }
}
