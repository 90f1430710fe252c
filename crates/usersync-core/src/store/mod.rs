//! Column store persistence.
//!
//! - [`UpdateSet`]: minimal partial-update write-set for a sparse user
//! - [`UserGateway`]: insert, update and soft-delete operations
//! - [`UserStore`]: the statement execution seam, backed by
//!   [`CassandraUserStore`] in production and [`MemoryUserStore`] in tests

pub mod cassandra;
mod gateway;
pub mod memory;
mod update_set;

pub use cassandra::{check_protocol_version, parse_consistency, CassandraUserStore};
pub use gateway::{insert_statement, UserGateway, WriteOutcome};
pub use memory::MemoryUserStore;
pub use update_set::UpdateSet;

use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Prefix shared by every column of the user table.
pub const COLUMN_PREFIX: &str = "u_";

/// Column names without [`COLUMN_PREFIX`].
pub mod column {
    pub const LOGIN: &str = "login";
    pub const PASSWORD: &str = "password";
    pub const NAME: &str = "name";
    pub const BIRTHDATE: &str = "birthdate";
    pub const AVATAR_URL: &str = "avatarUrl";
    pub const SOCIAL_CODE: &str = "social_code";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
    pub const CREATED: &str = "created";
    pub const MODIFIED: &str = "modified";
    pub const STATE: &str = "state";
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i32),
    /// Epoch milliseconds
    Timestamp(i64),
    TextList(Vec<String>),
    TextMap(BTreeMap<String, String>),
}

/// A parameterized CQL statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cql: String,
    pub values: Vec<Value>,
}

/// Executes statements against the column store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Execute a statement, discarding any rows.
    async fn execute(&self, statement: &Statement) -> Result<()>;
}
