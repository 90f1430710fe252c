//! Normalization of a decoded [`User`] into storable values.

use super::state::UserState;
use super::user::User;
use crate::error::UserError;
use std::collections::BTreeMap;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A user with every numeric field coerced and defaults applied.
///
/// Absent strings and sequences become empty values; `created` falls back to
/// the supplied clock reading and `modified` to `created`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub login: String,
    pub password: String,
    pub name: String,
    pub birthdate: i64,
    pub avatar_urls: Vec<String>,
    pub social_codes: BTreeMap<String, String>,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub created: i64,
    pub modified: i64,
    pub state: UserState,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl UserRecord {
    /// Normalize `user` using `now_ms` for defaulted timestamps.
    pub fn normalize(user: &User, now_ms: i64) -> Result<Self, UserError> {
        let latitude = user
            .latitude
            .as_ref()
            .map(|v| v.parse_f64("latitude"))
            .transpose()?;
        let longitude = user
            .longitude
            .as_ref()
            .map(|v| v.parse_f64("longitude"))
            .transpose()?;

        let birthdate = match &user.birthdate {
            Some(v) => v.parse_i64("birthdate")?,
            None => 0,
        };

        let created = match &user.created {
            Some(v) => v.parse_i64("created")?,
            None => now_ms,
        };

        let modified = match &user.modified {
            Some(v) => v.parse_i64("modified")?,
            None => created,
        };

        let state = match &user.state {
            Some(v) => UserState::from_bits(v.parse_i32("state")?),
            None => UserState::empty(),
        };

        Ok(Self {
            login: user.login.clone().unwrap_or_default(),
            password: user.password.clone().unwrap_or_default(),
            name: user.name.clone().unwrap_or_default(),
            birthdate,
            avatar_urls: user.avatar_urls.clone().unwrap_or_default(),
            social_codes: user.social_codes.clone().unwrap_or_default(),
            emails: user.emails.clone().unwrap_or_default(),
            phones: user.phones.clone().unwrap_or_default(),
            created,
            modified,
            state,
            latitude,
            longitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NumericText;

    const NOW: i64 = 1_700_000_000_000;

    fn creatable() -> User {
        User {
            login: Some("a".into()),
            password: Some("p".into()),
            name: Some("n".into()),
            birthdate: Some("1000".into()),
            emails: Some(vec!["a@b.c".into()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_created_and_modified() {
        let record = UserRecord::normalize(&creatable(), NOW).unwrap();
        assert_eq!(record.birthdate, 1000);
        assert_eq!(record.created, NOW);
        assert_eq!(record.modified, NOW);
        assert_eq!(record.state, UserState::empty());
        assert!(record.avatar_urls.is_empty());
        assert_eq!(record.latitude, None);
    }

    #[test]
    fn test_modified_defaults_to_created() {
        let mut user = creatable();
        user.created = Some(NumericText::from(5000i64));
        let record = UserRecord::normalize(&user, NOW).unwrap();
        assert_eq!(record.created, 5000);
        assert_eq!(record.modified, 5000);

        user.modified = Some(NumericText::from(6000i64));
        let record = UserRecord::normalize(&user, NOW).unwrap();
        assert_eq!(record.modified, 6000);
    }

    #[test]
    fn test_coerces_state_and_coordinates() {
        let mut user = creatable();
        user.state = Some("3".into());
        user.latitude = Some("55.03".into());
        user.longitude = Some("-82.92".into());

        let record = UserRecord::normalize(&user, NOW).unwrap();
        assert_eq!(record.state, UserState::NEW | UserState::EMAIL_VERIFIED);
        assert_eq!(record.latitude, Some(55.03));
        assert_eq!(record.longitude, Some(-82.92));
    }

    #[test]
    fn test_malformed_numbers() {
        let cases: [(&str, fn(&mut User)); 5] = [
            ("birthdate", |u| u.birthdate = Some("1.5e3".into())),
            ("created", |u| u.created = Some("yesterday".into())),
            ("modified", |u| u.modified = Some("".into())),
            ("state", |u| u.state = Some("99999999999".into())),
            ("latitude", |u| u.latitude = Some("north".into())),
        ];

        for (field, mutate) in cases {
            let mut user = creatable();
            mutate(&mut user);
            match UserRecord::normalize(&user, NOW) {
                Err(UserError::MalformedNumber { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected malformed {}, got {:?}", field, other),
            }
        }
    }
}
