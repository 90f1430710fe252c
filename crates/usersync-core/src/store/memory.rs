//! In-memory user store.
//!
//! Records every executed statement and applies the `INSERT`/`UPDATE`
//! statements produced by this crate to an in-memory table, so tests and
//! dry runs can inspect the resulting rows.

use super::{column, Statement, UserStore, Value, COLUMN_PREFIX};
use crate::error::StoreError;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A stored row, keyed by unprefixed column name.
pub type Row = BTreeMap<String, Value>;

/// Statement-recording store backed by a map of rows.
#[derive(Default)]
pub struct MemoryUserStore {
    statements: Mutex<Vec<Statement>>,
    rows: Mutex<BTreeMap<String, Row>>,
    pending_failure: Mutex<Option<String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `execute` fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.pending_failure.lock() = Some(message.into());
    }

    /// Statements executed so far, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    /// Current row for `login`.
    pub fn row(&self, login: &str) -> Option<Row> {
        self.rows.lock().get(login).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    fn apply(&self, statement: &Statement) -> Result<()> {
        let columns = assigned_columns(&statement.cql).ok_or_else(|| {
            Error::Store(StoreError::Execution(format!(
                "unsupported statement: {}",
                statement.cql
            )))
        })?;

        let mut values = statement.values.clone();
        let login = if statement.cql.starts_with("UPDATE") {
            values.pop()
        } else {
            values.first().cloned()
        };
        let Some(Value::Text(login)) = login else {
            return Err(Error::Store(StoreError::Execution(
                "login must be bound as text".into(),
            )));
        };
        if columns.len() != values.len() {
            return Err(Error::Store(StoreError::Execution(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            ))));
        }

        let mut rows = self.rows.lock();
        let row = rows.entry(login.clone()).or_default();
        row.insert(column::LOGIN.to_string(), Value::Text(login));
        for (name, value) in columns.into_iter().zip(values) {
            row.insert(name, value);
        }
        Ok(())
    }
}

/// Unprefixed column names written by a statement, in bind order.
fn assigned_columns(cql: &str) -> Option<Vec<String>> {
    let unprefix = |name: &str| name.trim().trim_start_matches(COLUMN_PREFIX).to_string();

    if cql.starts_with("INSERT INTO") {
        let start = cql.find('(')? + 1;
        let end = cql[start..].find(')')? + start;
        Some(cql[start..end].split(',').map(unprefix).collect())
    } else if cql.starts_with("UPDATE") {
        let start = cql.find(" SET ")? + " SET ".len();
        let end = cql.find(" WHERE ")?;
        Some(
            cql[start..end]
                .split(',')
                .map(|clause| unprefix(clause.trim().trim_end_matches("= ?")))
                .collect(),
        )
    } else {
        None
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        if let Some(message) = self.pending_failure.lock().take() {
            return Err(Error::Store(StoreError::Execution(message)));
        }
        self.apply(statement)?;
        self.statements.lock().push(statement.clone());
        Ok(())
    }
}
