//! Partial-update write-set builder.
//!
//! A field joins the write-set when it is present in the message: strings
//! when non-empty, sequences and maps when non-nil (an explicit empty list
//! is written), `state` when it was supplied. `modified` is always written.
//! Columns are kept in a `BTreeMap`, so clauses and parameters come out in
//! lexicographic column order.

use super::{column, Statement, Value, COLUMN_PREFIX};
use crate::error::UserError;
use crate::model::{User, UserRecord};
use std::collections::BTreeMap;

/// Columns to write for one partial update, keyed by login.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSet {
    login: String,
    columns: BTreeMap<&'static str, Value>,
}

impl UpdateSet {
    /// Compute the write-set for `user`, stamping `modified` with `now_ms`.
    pub fn build(user: &User, now_ms: i64) -> Result<Self, UserError> {
        let login = user.login.clone().ok_or(UserError::MissingLogin)?;
        let record = UserRecord::normalize(user, now_ms)?;

        let mut columns = BTreeMap::new();

        if let Some(password) = &user.password {
            columns.insert(column::PASSWORD, Value::Text(password.clone()));
        }
        if let Some(name) = &user.name {
            columns.insert(column::NAME, Value::Text(name.clone()));
        }
        if user.birthdate.is_some() {
            columns.insert(column::BIRTHDATE, Value::Timestamp(record.birthdate));
        }
        if user.avatar_urls.is_some() {
            columns.insert(column::AVATAR_URL, Value::TextList(record.avatar_urls));
        }
        if user.social_codes.is_some() {
            columns.insert(column::SOCIAL_CODE, Value::TextMap(record.social_codes));
        }
        if user.emails.is_some() {
            columns.insert(column::EMAIL, Value::TextList(record.emails));
        }
        if user.phones.is_some() {
            columns.insert(column::PHONE, Value::TextList(record.phones));
        }
        if user.state.is_some() {
            columns.insert(column::STATE, Value::Int(record.state.bits()));
        }
        columns.insert(column::MODIFIED, Value::Timestamp(now_ms));

        Ok(Self { login, columns })
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Included column names in statement order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.keys().copied().collect()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Render `UPDATE <table> SET .. WHERE u_login = ?`.
    ///
    /// Only column names from the fixed vocabulary are interpolated; values
    /// are bound, with the login last. Returns `None` for an empty set.
    pub fn to_statement(&self, table: &str) -> Option<Statement> {
        if self.is_empty() {
            return None;
        }

        let assignments = self
            .columns
            .keys()
            .map(|name| format!("{}{} = ?", COLUMN_PREFIX, name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut values: Vec<Value> = self.columns.values().cloned().collect();
        values.push(Value::Text(self.login.clone()));

        Some(Statement {
            cql: format!(
                "UPDATE {} SET {} WHERE {}{} = ?",
                table,
                assignments,
                COLUMN_PREFIX,
                column::LOGIN
            ),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Envelope, UserState};

    const NOW: i64 = 1_700_000_000_000;

    fn login_only(login: &str) -> User {
        User {
            login: Some(login.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_login_only_writes_modified() {
        let set = UpdateSet::build(&login_only("x"), NOW).unwrap();
        assert_eq!(set.column_names(), vec!["modified"]);

        let statement = set.to_statement("user").unwrap();
        assert_eq!(
            statement.cql,
            "UPDATE user SET u_modified = ? WHERE u_login = ?"
        );
        assert_eq!(
            statement.values,
            vec![Value::Timestamp(NOW), Value::Text("x".into())]
        );
    }

    #[test]
    fn test_all_fields_in_lexicographic_order() {
        let user = User {
            login: Some("x".into()),
            password: Some("p".into()),
            name: Some("n".into()),
            birthdate: Some("1000".into()),
            avatar_urls: Some(vec!["a".into()]),
            social_codes: Some([("fb".to_string(), "c".to_string())].into()),
            emails: Some(vec!["e".into()]),
            phones: Some(vec!["1".into()]),
            state: Some("8".into()),
            created: Some("1".into()),
            latitude: Some("1.0".into()),
            ..Default::default()
        };

        let set = UpdateSet::build(&user, NOW).unwrap();
        assert_eq!(
            set.column_names(),
            vec![
                "avatarUrl",
                "birthdate",
                "email",
                "modified",
                "name",
                "password",
                "phone",
                "social_code",
                "state"
            ]
        );

        let statement = set.to_statement("user").unwrap();
        assert_eq!(
            statement.cql,
            "UPDATE user SET u_avatarUrl = ?, u_birthdate = ?, u_email = ?, u_modified = ?, \
             u_name = ?, u_password = ?, u_phone = ?, u_social_code = ?, u_state = ? \
             WHERE u_login = ?"
        );
        assert_eq!(statement.values.len(), 10);
        assert_eq!(statement.values[1], Value::Timestamp(1000));
        assert_eq!(statement.values[8], Value::Int(UserState::BANNED.bits()));
        assert_eq!(statement.values[9], Value::Text("x".into()));
    }

    #[test]
    fn test_empty_sequence_is_written_nil_is_not() {
        let mut user = login_only("x");
        user.emails = Some(vec![]);
        user.phones = None;

        let set = UpdateSet::build(&user, NOW).unwrap();
        assert_eq!(set.get("email"), Some(&Value::TextList(vec![])));
        assert_eq!(set.get("phone"), None);
    }

    #[test]
    fn test_empty_map_is_written_nil_is_not() {
        let empty = Envelope::decode(Some(br#"{"data":{"login":"x","socialCodes":{}}}"#.as_slice()))
            .unwrap()
            .data;
        let set = UpdateSet::build(&empty, NOW).unwrap();
        assert_eq!(set.get("social_code"), Some(&Value::TextMap(BTreeMap::new())));
        assert_eq!(set.column_names(), vec!["modified", "social_code"]);

        let absent = Envelope::decode(Some(br#"{"data":{"login":"x"}}"#.as_slice()))
            .unwrap()
            .data;
        let set = UpdateSet::build(&absent, NOW).unwrap();
        assert_eq!(set.get("social_code"), None);
        assert_eq!(set.column_names(), vec!["modified"]);
    }

    #[test]
    fn test_rendering_is_stable_apart_from_modified() {
        let mut user = login_only("x");
        user.name = Some("n".into());
        user.social_codes = Some(
            [
                ("vk".to_string(), "2".to_string()),
                ("fb".to_string(), "1".to_string()),
            ]
            .into(),
        );

        let first = UpdateSet::build(&user, NOW).unwrap().to_statement("user").unwrap();
        let second = UpdateSet::build(&user, NOW + 5).unwrap().to_statement("user").unwrap();

        assert_eq!(first.cql, second.cql);
        let modified_at = 0;
        for (i, (a, b)) in first.values.iter().zip(&second.values).enumerate() {
            if i == modified_at {
                assert_eq!(a, &Value::Timestamp(NOW));
                assert_eq!(b, &Value::Timestamp(NOW + 5));
            } else {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_missing_login() {
        let user = User {
            name: Some("n".into()),
            ..Default::default()
        };
        assert_eq!(UpdateSet::build(&user, NOW), Err(UserError::MissingLogin));
    }

    #[test]
    fn test_malformed_number_fails_build() {
        let mut user = login_only("x");
        user.birthdate = Some("soon".into());
        assert!(matches!(
            UpdateSet::build(&user, NOW),
            Err(UserError::MalformedNumber {
                field: "birthdate",
                ..
            })
        ));
    }
}
