//! Insert, update and soft-delete of user rows.

use super::{column, Statement, UpdateSet, UserStore, Value, COLUMN_PREFIX};
use crate::error::UserError;
use crate::model::{now_millis, User, UserRecord, UserState};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Columns written by an insert, in bind order.
const INSERT_COLUMNS: [&str; 11] = [
    column::LOGIN,
    column::PASSWORD,
    column::NAME,
    column::BIRTHDATE,
    column::AVATAR_URL,
    column::SOCIAL_CODE,
    column::EMAIL,
    column::PHONE,
    column::CREATED,
    column::MODIFIED,
    column::STATE,
];

/// Result of a partial write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A statement was executed.
    Written,
    /// The write-set was empty; nothing was sent to the store.
    NoOp,
}

/// Render the full-row insert for a normalized record.
pub fn insert_statement(table: &str, record: &UserRecord) -> Statement {
    let columns = INSERT_COLUMNS
        .iter()
        .map(|name| format!("{}{}", COLUMN_PREFIX, name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; INSERT_COLUMNS.len()].join(", ");

    Statement {
        cql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table, columns, placeholders
        ),
        values: vec![
            Value::Text(record.login.clone()),
            Value::Text(record.password.clone()),
            Value::Text(record.name.clone()),
            Value::Timestamp(record.birthdate),
            Value::TextList(record.avatar_urls.clone()),
            Value::TextMap(record.social_codes.clone()),
            Value::TextList(record.emails.clone()),
            Value::TextList(record.phones.clone()),
            Value::Timestamp(record.created),
            Value::Timestamp(record.modified),
            Value::Int(record.state.bits()),
        ],
    }
}

/// Persistence gateway for user rows keyed by login.
///
/// Statements are idempotent: re-executing the same write-set leaves the
/// row in the same state.
pub struct UserGateway {
    store: Arc<dyn UserStore>,
    table: String,
    clock: fn() -> i64,
}

impl UserGateway {
    /// Create a gateway writing to `table`.
    pub fn new(store: Arc<dyn UserStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            clock: now_millis,
        }
    }

    /// Replace the wall clock (epoch milliseconds).
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Write the full normalized row unconditionally.
    pub async fn insert(&self, user: &User) -> Result<()> {
        if user.login.is_none() {
            return Err(UserError::MissingLogin.into());
        }
        let record = UserRecord::normalize(user, (self.clock)())?;
        let statement = insert_statement(&self.table, &record);

        debug!(
            login = %record.login,
            state = %record.state,
            created = record.created,
            modified = record.modified,
            "Inserting user"
        );
        self.store.execute(&statement).await
    }

    /// Write only the columns present in `user`, stamping `modified` now.
    pub async fn update(&self, user: &User) -> Result<WriteOutcome> {
        let set = UpdateSet::build(user, (self.clock)())?;
        let Some(statement) = set.to_statement(&self.table) else {
            debug!(login = %set.login(), "Empty write-set, skipping update");
            return Ok(WriteOutcome::NoOp);
        };

        debug!(
            login = %set.login(),
            columns = ?set.column_names(),
            "Updating user"
        );
        self.store.execute(&statement).await?;
        Ok(WriteOutcome::Written)
    }

    /// Soft-delete: mark `user` as removed, then update.
    ///
    /// Every other field present in `user` is written alongside the flag.
    pub async fn remove(&self, user: &mut User) -> Result<WriteOutcome> {
        user.set_state(UserState::REMOVED);
        self.update(user).await
    }
}
