//! Cassandra / ScyllaDB store over the native protocol, via the `scylla` driver.

use super::{Statement, UserStore, Value};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::{Error, Result};
use async_trait::async_trait;
use scylla::execution_profile::ExecutionProfile;
use scylla::frame::response::result::CqlValue;
use scylla::frame::value::CqlTimestamp;
use scylla::statement::Consistency;
use scylla::{Session, SessionBuilder};
use std::time::Duration;
use tracing::info;

/// The only native protocol version the driver speaks.
pub const SUPPORTED_PROTOCOL_VERSION: u8 = 4;

/// Parse a consistency level name such as `ONE` or `local_quorum`.
pub fn parse_consistency(name: &str) -> std::result::Result<Consistency, StoreError> {
    let consistency = match name.trim().to_ascii_uppercase().as_str() {
        "ANY" => Consistency::Any,
        "ONE" => Consistency::One,
        "TWO" => Consistency::Two,
        "THREE" => Consistency::Three,
        "QUORUM" => Consistency::Quorum,
        "ALL" => Consistency::All,
        "LOCAL_QUORUM" => Consistency::LocalQuorum,
        "EACH_QUORUM" => Consistency::EachQuorum,
        "LOCAL_ONE" => Consistency::LocalOne,
        "SERIAL" => Consistency::Serial,
        "LOCAL_SERIAL" => Consistency::LocalSerial,
        _ => return Err(StoreError::InvalidConsistency(name.to_string())),
    };
    Ok(consistency)
}

/// Reject protocol versions the driver cannot negotiate.
pub fn check_protocol_version(version: Option<u8>) -> std::result::Result<(), StoreError> {
    match version {
        Some(v) if v != SUPPORTED_PROTOCOL_VERSION => Err(StoreError::UnsupportedProtocol(v)),
        _ => Ok(()),
    }
}

/// User store backed by a driver session.
pub struct CassandraUserStore {
    session: Session,
}

impl CassandraUserStore {
    /// Open a session against `config.peers` using `config.keyspace`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let consistency = parse_consistency(&config.consistency)?;
        check_protocol_version(config.protocol_version)?;

        let profile = ExecutionProfile::builder()
            .consistency(consistency)
            .build()
            .into_handle();

        let session = SessionBuilder::new()
            .known_nodes(&config.peers)
            .use_keyspace(&config.keyspace, false)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .default_execution_profile_handle(profile)
            .build()
            .await
            .map_err(|e| {
                Error::Store(StoreError::Connection {
                    peers: config.peers.join(","),
                    message: e.to_string(),
                })
            })?;

        info!(
            peers = %config.peers.join(","),
            keyspace = %config.keyspace,
            consistency = ?consistency,
            "Store session established"
        );

        Ok(Self { session })
    }
}

#[async_trait]
impl UserStore for CassandraUserStore {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        let values: Vec<CqlValue> = statement.values.iter().map(to_cql).collect();

        self.session
            .query(statement.cql.as_str(), values)
            .await
            .map_err(|e| Error::Store(StoreError::Execution(e.to_string())))?;

        Ok(())
    }
}

fn to_cql(value: &Value) -> CqlValue {
    match value {
        Value::Text(s) => CqlValue::Text(s.clone()),
        Value::Int(i) => CqlValue::Int(*i),
        Value::Timestamp(ms) => CqlValue::Timestamp(CqlTimestamp(*ms)),
        Value::TextList(items) => {
            CqlValue::List(items.iter().cloned().map(CqlValue::Text).collect())
        }
        Value::TextMap(entries) => CqlValue::Map(
            entries
                .iter()
                .map(|(k, v)| (CqlValue::Text(k.clone()), CqlValue::Text(v.clone())))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_consistency() {
        assert_eq!(parse_consistency("ONE").unwrap(), Consistency::One);
        assert_eq!(parse_consistency("quorum").unwrap(), Consistency::Quorum);
        assert_eq!(
            parse_consistency(" local_quorum ").unwrap(),
            Consistency::LocalQuorum
        );
        assert_eq!(
            parse_consistency("LOCAL_SERIAL").unwrap(),
            Consistency::LocalSerial
        );
        assert!(matches!(
            parse_consistency("MOST"),
            Err(StoreError::InvalidConsistency(name)) if name == "MOST"
        ));
    }

    #[test]
    fn test_check_protocol_version() {
        assert!(check_protocol_version(None).is_ok());
        assert!(check_protocol_version(Some(4)).is_ok());
        assert!(matches!(
            check_protocol_version(Some(3)),
            Err(StoreError::UnsupportedProtocol(3))
        ));
    }

    #[test]
    fn test_to_cql() {
        assert_eq!(
            to_cql(&Value::Timestamp(1000)),
            CqlValue::Timestamp(CqlTimestamp(1000))
        );
        assert_eq!(
            to_cql(&Value::TextList(vec!["a".into()])),
            CqlValue::List(vec![CqlValue::Text("a".into())])
        );
        assert_eq!(
            to_cql(&Value::TextMap([("fb".to_string(), "c".to_string())].into())),
            CqlValue::Map(vec![(
                CqlValue::Text("fb".into()),
                CqlValue::Text("c".into())
            )])
        );
    }
}
