//! Sign-up, demo login and profile edits.
//!
//! These build or patch [`User`] values; persisting them is left to the
//! repository the caller holds.

use chrono::Utc;
use uuid::Uuid;

use crate::demo::demo_contacts;
use crate::error::{Error, Result};
use crate::model::{EmergencyContact, ProfileUpdate, SignUpRequest, User};

/// Country code prefixed to the ten national digits clients submit.
const COUNTRY_PREFIX: &str = "+1";

pub const DEMO_EMAIL: &str = "demo@bond.com";
pub const DEMO_PASSWORD: &str = "bond123";

fn with_country_code(digits: &str) -> String {
    let digits = digits.trim();
    if digits.starts_with('+') {
        digits.to_string()
    } else {
        format!("{COUNTRY_PREFIX}{digits}")
    }
}

/// Build a new account from a sign-up form.
pub fn sign_up(form: SignUpRequest) -> User {
    let emergency_contacts = form
        .emergency_contacts
        .into_iter()
        .map(|c| EmergencyContact {
            name: c.name,
            phone: with_country_code(&c.phone),
        })
        .collect();

    User {
        id: Uuid::new_v4().to_string(),
        first_name: form.first_name,
        last_name: form.last_name,
        dob: Some(form.dob),
        phone: Some(with_country_code(&form.phone)),
        agent: Some(form.agent),
        email: form.email,
        emergency_contacts,
        joined_date: Some(Utc::now().date_naive()),
        panic_count: 0,
    }
}

/// Check the demo credentials and return the demo account.
///
/// The email match ignores case; the password does not.
pub fn login(email: &str, password: &str) -> Result<User> {
    if email.trim().eq_ignore_ascii_case(DEMO_EMAIL) && password == DEMO_PASSWORD {
        Ok(demo_user())
    } else {
        Err(Error::InvalidCredentials)
    }
}

/// The account the demo login signs into.
pub fn demo_user() -> User {
    User {
        id: "demo".to_string(),
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        dob: Some("01/15/1990".to_string()),
        phone: Some("+15615550100".to_string()),
        agent: Some("Agent Smith".to_string()),
        email: Some(DEMO_EMAIL.to_string()),
        emergency_contacts: demo_contacts(),
        joined_date: None,
        panic_count: 0,
    }
}

impl ProfileUpdate {
    /// Apply the submitted fields to `user`, keeping everything else.
    pub fn apply(self, mut user: User) -> User {
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(dob) = self.dob {
            user.dob = Some(dob);
        }
        if let Some(phone) = self.phone {
            user.phone = Some(with_country_code(&phone));
        }
        if let Some(agent) = self.agent {
            user.agent = Some(agent);
        }
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> SignUpRequest {
        SignUpRequest {
            first_name: "Ada".to_string(),
            last_name: "Byron".to_string(),
            dob: "12/10/1985".to_string(),
            phone: "5615550111".to_string(),
            agent: "Agent Bond".to_string(),
            email: None,
            emergency_contacts: vec![
                EmergencyContact {
                    name: "One".to_string(),
                    phone: "5615550001".to_string(),
                },
                EmergencyContact {
                    name: "Two".to_string(),
                    phone: "5615550002".to_string(),
                },
                EmergencyContact {
                    name: "Three".to_string(),
                    phone: "+445615550003".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_sign_up_prefixes_numbers() {
        let user = sign_up(form());

        assert_eq!(user.phone.as_deref(), Some("+15615550111"));
        assert_eq!(user.emergency_contacts[0].phone, "+15615550001");
        assert_eq!(user.emergency_contacts[2].phone, "+445615550003");
        assert_eq!(user.panic_count, 0);
        assert_eq!(user.joined_date, Some(Utc::now().date_naive()));
    }

    #[test]
    fn test_sign_up_ids_are_unique() {
        assert_ne!(sign_up(form()).id, sign_up(form()).id);
    }

    #[test]
    fn test_login_accepts_demo_credentials() {
        let user = login("Demo@Bond.com", "bond123").unwrap();
        assert_eq!(user.email.as_deref(), Some(DEMO_EMAIL));
        assert_eq!(user.emergency_contacts.len(), 3);
    }

    #[test]
    fn test_login_rejects_wrong_password() {
        assert!(matches!(
            login(DEMO_EMAIL, "BOND123"),
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            login("someone@bond.com", DEMO_PASSWORD),
            Err(Error::InvalidCredentials)
        ));
    }

    #[test]
    fn test_profile_update_patches_only_given_fields() {
        let update = ProfileUpdate {
            agent: Some("Agent Carter".to_string()),
            phone: Some("5615550999".to_string()),
            ..ProfileUpdate::default()
        };

        let user = update.apply(demo_user());

        assert_eq!(user.agent.as_deref(), Some("Agent Carter"));
        assert_eq!(user.phone.as_deref(), Some("+15615550999"));
        assert_eq!(user.first_name, "John");
        assert_eq!(user.emergency_contacts, demo_contacts());
    }
}
