//! Write ingestion for gale
//!
//! The ingestor validates and normalizes an inbound point batch, then
//! forwards it to the replicated write path, which returns the node's new
//! replication index. Validation failures are reported in order of
//! detection; data is never silently dropped.

use crate::query::{Privilege, UserContext};
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use tracing::{error, info};

/// One time-series point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// A batch of points destined for one database and retention policy.
///
/// Every point in the batch shares the batch's database and retention
/// policy once normalized. A batch-level timestamp and tag set act as
/// defaults for points that omit their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub database: String,
    #[serde(default, rename = "retentionPolicy")]
    pub retention_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub points: Vec<Point>,
}

/// Apply batch-level defaults to each point.
///
/// A point missing a timestamp inherits the batch's; batch tags apply
/// under the point's own. A point with no timestamp from either source is
/// rejected: the write path requires every point to carry an explicit
/// instant by the time it is replicated.
pub fn normalize_batch(batch: &Batch) -> Result<Vec<Point>> {
    batch
        .points
        .iter()
        .map(|p| {
            if p.name.is_empty() {
                return Err(Error::Validation("point name is required".to_string()));
            }
            let mut point = p.clone();
            if point.timestamp.is_none() {
                point.timestamp = batch.timestamp;
            }
            if point.timestamp.is_none() {
                return Err(Error::Validation(format!(
                    "timestamp required for point {:?}",
                    point.name
                )));
            }
            for (key, value) in &batch.tags {
                point
                    .tags
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            Ok(point)
        })
        .collect()
}

/// The replicated write path and the database catalog it writes into.
#[async_trait::async_trait]
pub trait WritePath: Send + Sync {
    fn database_exists(&self, database: &str) -> bool;

    /// Apply a normalized batch, returning the node's new replication
    /// index.
    async fn write_series(
        &self,
        database: &str,
        retention_policy: &str,
        points: Vec<Point>,
    ) -> Result<u64>;
}

/// Outcome of one write request.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Batch applied; carries the new replication index.
    Written(u64),
    /// The body was empty: vacuous success, no index advance.
    Empty,
}

/// Where in the validation pipeline a write failed. The HTTP layer maps
/// each stage to the status of the first failing step.
#[derive(Debug)]
pub enum WriteError {
    /// Malformed gzip payload
    BadPayload(Error),
    /// Decode or field validation failure; reported with internal-error
    /// status
    Invalid(Error),
    /// Unknown database
    UnknownDatabase(Error),
    /// Missing or unauthorized principal
    Unauthorized(Error),
    /// Write path failure
    Internal(Error),
}

impl WriteError {
    pub fn into_inner(self) -> Error {
        match self {
            WriteError::BadPayload(e)
            | WriteError::Invalid(e)
            | WriteError::UnknownDatabase(e)
            | WriteError::Unauthorized(e)
            | WriteError::Internal(e) => e,
        }
    }
}

/// Validates, normalizes, and forwards inbound batches.
pub struct WriteIngestor {
    write_path: Arc<dyn WritePath>,
    require_authentication: bool,
    /// Detailed logging of the write path: materialize and log each raw
    /// body before decoding. Trades memory for observability.
    pub write_trace: bool,
}

impl WriteIngestor {
    pub fn new(write_path: Arc<dyn WritePath>, require_authentication: bool) -> Self {
        Self {
            write_path,
            require_authentication,
            write_trace: false,
        }
    }

    /// Ingest one raw request body.
    ///
    /// `gzipped` reflects the request's content-encoding signal. The
    /// validation ladder runs in order: payload decode, non-empty database,
    /// database existence, principal presence, write privilege. An empty
    /// body (zero bytes after decompression) is a vacuous success.
    pub async fn ingest(
        &self,
        body: &[u8],
        gzipped: bool,
        user: Option<&UserContext>,
    ) -> std::result::Result<WriteOutcome, WriteError> {
        let raw = if gzipped {
            let mut decoded = Vec::new();
            GzDecoder::new(body)
                .read_to_end(&mut decoded)
                .map_err(|e| WriteError::BadPayload(Error::Validation(e.to_string())))?;
            decoded
        } else {
            body.to_vec()
        };

        if self.write_trace {
            info!(body = %String::from_utf8_lossy(&raw), "write body received by handler");
        }

        // An immediate end-of-input with no bytes is a no-op, not an error.
        if raw.is_empty() {
            return Ok(WriteOutcome::Empty);
        }

        let batch: Batch = serde_json::from_slice(&raw)
            .map_err(|e| WriteError::Invalid(Error::Serialization(e.to_string())))?;

        if batch.database.is_empty() {
            return Err(WriteError::Invalid(Error::Validation(
                "database is required".to_string(),
            )));
        }

        if !self.write_path.database_exists(&batch.database) {
            return Err(WriteError::UnknownDatabase(Error::DatabaseNotFound(
                batch.database.clone(),
            )));
        }

        if self.require_authentication {
            let user = match user {
                Some(u) => u,
                None => {
                    return Err(WriteError::Unauthorized(Error::Unauthorized(format!(
                        "user is required to write to database {:?}",
                        batch.database
                    ))));
                }
            };
            if !user.authorize(Privilege::Write, &batch.database) {
                return Err(WriteError::Unauthorized(Error::Unauthorized(format!(
                    "{:?} user is not authorized to write to database {:?}",
                    user.name, batch.database
                ))));
            }
        }

        let points = normalize_batch(&batch).map_err(WriteError::Invalid)?;

        match self
            .write_path
            .write_series(&batch.database, &batch.retention_policy, points)
            .await
        {
            Ok(index) => Ok(WriteOutcome::Written(index)),
            Err(e) => {
                error!(database = %batch.database, error = %e, "write failed");
                Err(WriteError::Internal(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct RecordingWritePath {
        index: AtomicU64,
        known_database: &'static str,
    }

    #[async_trait::async_trait]
    impl WritePath for RecordingWritePath {
        fn database_exists(&self, database: &str) -> bool {
            database == self.known_database
        }

        async fn write_series(
            &self,
            _database: &str,
            _retention_policy: &str,
            _points: Vec<Point>,
        ) -> Result<u64> {
            Ok(self.index.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn ingestor(require_auth: bool) -> WriteIngestor {
        WriteIngestor::new(
            Arc::new(RecordingWritePath {
                index: AtomicU64::new(0),
                known_database: "db0",
            }),
            require_auth,
        )
    }

    fn body(database: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "database": database,
            "retentionPolicy": "default",
            "points": [{
                "name": "cpu",
                "timestamp": "2015-01-26T12:00:00Z",
                "tags": {"host": "server01"},
                "fields": {"value": 100}
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn empty_body_is_vacuous_success() {
        let outcome = ingestor(false).ingest(b"", false, None).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Empty);
    }

    #[tokio::test]
    async fn missing_database_is_invalid_not_not_found() {
        let raw = serde_json::to_vec(&serde_json::json!({"points": []})).unwrap();
        let err = ingestor(false).ingest(&raw, false, None).await.unwrap_err();
        assert!(matches!(err, WriteError::Invalid(_)));
    }

    #[tokio::test]
    async fn unknown_database_is_not_found() {
        let err = ingestor(false)
            .ingest(&body("missing"), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::UnknownDatabase(_)));
    }

    #[tokio::test]
    async fn auth_required_without_principal_is_unauthorized() {
        let err = ingestor(true)
            .ingest(&body("db0"), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn read_only_principal_cannot_write() {
        let mut user = UserContext {
            name: "reader".to_string(),
            ..Default::default()
        };
        user.privileges.insert("db0".to_string(), Privilege::Read);

        let err = ingestor(true)
            .ingest(&body("db0"), false, Some(&user))
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn admin_principal_writes_with_auth_enabled() {
        let user = UserContext {
            name: "root".to_string(),
            is_admin: true,
            ..Default::default()
        };

        let outcome = ingestor(true)
            .ingest(&body("db0"), false, Some(&user))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written(1));
    }

    #[tokio::test]
    async fn successful_write_returns_new_index() {
        let outcome = ingestor(false)
            .ingest(&body("db0"), false, None)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written(1));
    }

    #[tokio::test]
    async fn gzip_body_is_decoded_before_validation() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body("db0")).unwrap();
        let compressed = encoder.finish().unwrap();

        let outcome = ingestor(false)
            .ingest(&compressed, true, None)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written(1));
    }

    #[tokio::test]
    async fn bad_gzip_is_a_payload_error() {
        let err = ingestor(false)
            .ingest(b"not gzip", true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::BadPayload(_)));
    }

    #[test]
    fn normalize_rejects_missing_timestamp() {
        let batch = Batch {
            database: "db0".to_string(),
            retention_policy: "default".to_string(),
            points: vec![Point {
                name: "cpu".to_string(),
                timestamp: None,
                tags: BTreeMap::new(),
                fields: BTreeMap::new(),
            }],
            ..Default::default()
        };
        assert!(normalize_batch(&batch).is_err());
    }

    #[test]
    fn normalize_applies_batch_defaults_without_clobbering_points() {
        let batch_ts = "2015-01-26T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let batch = Batch {
            database: "db0".to_string(),
            retention_policy: "default".to_string(),
            timestamp: Some(batch_ts),
            tags: BTreeMap::from([
                ("dc".to_string(), "east".to_string()),
                ("host".to_string(), "batch-host".to_string()),
            ]),
            points: vec![Point {
                name: "cpu".to_string(),
                timestamp: None,
                tags: BTreeMap::from([("host".to_string(), "server01".to_string())]),
                fields: BTreeMap::new(),
            }],
        };

        let points = normalize_batch(&batch).unwrap();
        assert_eq!(points[0].timestamp, Some(batch_ts));
        assert_eq!(points[0].tags.get("dc").map(String::as_str), Some("east"));
        // The point's own tag wins over the batch default.
        assert_eq!(
            points[0].tags.get("host").map(String::as_str),
            Some("server01")
        );
    }
}
