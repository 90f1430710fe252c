//! Wire representation of user lifecycle messages.
//!
//! Every optional field is an explicit `Option`. Strings decode to `None`
//! when missing, `null` or empty. Sequences and maps keep the distinction
//! between missing/`null` (`None`) and an explicit empty value (`Some`).

use super::state::UserState;
use crate::error::UserError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Broker payload: `{ "version": <int>, "data": <User> }`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Envelope {
    /// Schema version. Decoded and logged, not interpreted.
    #[serde(default, deserialize_with = "numeric_text")]
    pub version: Option<NumericText>,

    #[serde(default)]
    pub data: User,
}

impl Envelope {
    /// Decode a broker payload.
    pub fn decode(payload: Option<&[u8]>) -> Result<Self, UserError> {
        let payload = payload.ok_or_else(|| UserError::Decode("empty payload".into()))?;
        serde_json::from_slice(payload).map_err(|e| UserError::Decode(e.to_string()))
    }
}

/// One account record as carried by a message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, deserialize_with = "non_empty")]
    pub login: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub password: Option<String>,

    #[serde(default, deserialize_with = "non_empty")]
    pub name: Option<String>,

    /// Epoch milliseconds
    #[serde(default, deserialize_with = "numeric_text")]
    pub birthdate: Option<NumericText>,

    #[serde(default)]
    pub avatar_urls: Option<Vec<String>>,

    #[serde(default)]
    pub social_codes: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub emails: Option<Vec<String>>,

    #[serde(default)]
    pub phones: Option<Vec<String>>,

    /// Epoch milliseconds
    #[serde(default, deserialize_with = "numeric_text")]
    pub created: Option<NumericText>,

    /// Epoch milliseconds
    #[serde(default, deserialize_with = "numeric_text")]
    pub modified: Option<NumericText>,

    /// [`UserState`] bits
    #[serde(default, deserialize_with = "numeric_text")]
    pub state: Option<NumericText>,

    #[serde(default, deserialize_with = "numeric_text")]
    pub latitude: Option<NumericText>,

    #[serde(default, deserialize_with = "numeric_text")]
    pub longitude: Option<NumericText>,
}

impl User {
    /// Assign a state, replacing any state carried by the message.
    pub fn set_state(&mut self, state: UserState) {
        self.state = Some(NumericText::from(state.bits()));
    }

    /// Assign `state` only when the message carries none.
    pub fn ensure_state(&mut self, state: UserState) {
        if self.state.is_none() {
            self.set_state(state);
        }
    }

    /// Check that the record carries everything needed to create an account.
    pub fn check_creatable(&self) -> Result<(), UserError> {
        let mut missing = Vec::new();
        if self.login.is_none() {
            missing.push("login");
        }
        if self.password.is_none() {
            missing.push("password");
        }
        if self.name.is_none() {
            missing.push("name");
        }
        if self.birthdate.is_none() {
            missing.push("birthdate");
        }
        if self.emails.as_ref().map_or(true, |e| e.is_empty()) {
            missing.push("emails");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(UserError::Validation(format!(
                "login, password, name, birthdate and emails are required; missing: {}",
                missing.join(", ")
            )))
        }
    }

    /// Names of the fields present in this message, in wire order.
    ///
    /// Used for log summaries so that credentials never reach the logs.
    pub fn present_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("login", self.login.is_some()),
            ("password", self.password.is_some()),
            ("name", self.name.is_some()),
            ("birthdate", self.birthdate.is_some()),
            ("avatarUrls", self.avatar_urls.is_some()),
            ("socialCodes", self.social_codes.is_some()),
            ("emails", self.emails.is_some()),
            ("phones", self.phones.is_some()),
            ("created", self.created.is_some()),
            ("modified", self.modified.is_some()),
            ("state", self.state.is_some()),
            ("latitude", self.latitude.is_some()),
            ("longitude", self.longitude.is_some()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

/// Textual form of a numeric field exactly as it arrived.
///
/// Accepts a JSON string or a JSON number on the wire. Parsing is deferred
/// to normalization, which reports [`UserError::MalformedNumber`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NumericText(String);

impl NumericText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse_i64(&self, field: &'static str) -> Result<i64, UserError> {
        self.0.trim().parse().map_err(|_| self.malformed(field))
    }

    pub fn parse_i32(&self, field: &'static str) -> Result<i32, UserError> {
        self.0.trim().parse().map_err(|_| self.malformed(field))
    }

    pub fn parse_f64(&self, field: &'static str) -> Result<f64, UserError> {
        self.0.trim().parse().map_err(|_| self.malformed(field))
    }

    fn malformed(&self, field: &'static str) -> UserError {
        UserError::MalformedNumber {
            field,
            value: self.0.clone(),
        }
    }
}

impl From<i64> for NumericText {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for NumericText {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for NumericText {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn numeric_text<'de, D>(deserializer: D) -> Result<Option<NumericText>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Text(s)) if s.is_empty() => None,
        Some(Raw::Text(s)) => Some(NumericText(s)),
        Some(Raw::Number(n)) => Some(NumericText(n.to_string())),
    })
}
