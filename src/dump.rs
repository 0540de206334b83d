//! Database export as newline-delimited JSON
//!
//! The exporter discovers measurements with one query, then runs
//! `select * from <measurement> group by *` per measurement, reshaping
//! columnar rows into point-oriented batches written one JSON object per
//! line. Output is produced incrementally; the whole database is never
//! buffered.

use crate::query::{Chunking, QueryCoordinator, UserContext, DEFAULT_CHUNK_SIZE};
use crate::response::Series;
use crate::write::{Batch, Point};
use crate::Result;

use bytes::Bytes;
use chrono::DateTime;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Literal line written when a failure interrupts an already-started
/// stream. Partial output before it is not retracted.
pub const DUMP_ERROR_SENTINEL: &str = "*** SERVER-SIDE ERROR. MISSING DATA ***";

/// Retention policy label stamped on every exported batch.
const DUMP_RETENTION_POLICY: &str = "default";

/// Streams a database's points as NDJSON batches.
pub struct DumpExporter<'a> {
    coordinator: &'a QueryCoordinator,
}

impl<'a> DumpExporter<'a> {
    pub fn new(coordinator: &'a QueryCoordinator) -> Self {
        Self { coordinator }
    }

    /// All measurement names in `database`, flattened from the discovery
    /// query's result cells.
    pub async fn list_measurements(
        &self,
        database: &str,
        user: Option<&UserContext>,
    ) -> Result<Vec<String>> {
        let mut rx = self
            .coordinator
            .start("show measurements", database, user, Chunking::Buffered)
            .await?;

        let mut measurements = Vec::new();
        while let Some(item) = rx.recv().await {
            let result = match item {
                Some(r) => r,
                None => continue,
            };
            if let Some(err) = result.error {
                return Err(err);
            }
            for series in &result.series {
                for row in &series.values {
                    for cell in row {
                        measurements.push(cell_to_string(cell));
                    }
                }
            }
        }
        Ok(measurements)
    }

    /// Export every point in `database`, writing NDJSON lines to `out`.
    ///
    /// A mid-stream failure writes the sentinel line and stops; output
    /// already sent stands. A discovery failure before any output is
    /// returned to the caller so it can become a proper error response.
    pub async fn dump(
        &self,
        database: &str,
        user: Option<&UserContext>,
        out: mpsc::Sender<Bytes>,
    ) -> Result<()> {
        let measurements = self.list_measurements(database, user).await?;
        self.dump_measurements(database, &measurements, user, out)
            .await
    }

    /// Export the given measurements, one `select * … group by *` each,
    /// in order.
    pub async fn dump_measurements(
        &self,
        database: &str,
        measurements: &[String],
        user: Option<&UserContext>,
        out: mpsc::Sender<Bytes>,
    ) -> Result<()> {
        for measurement in measurements {
            let query = format!("select * from {} group by *", measurement);
            let mut rx = match self
                .coordinator
                .start(&query, database, user, Chunking::Chunked(DEFAULT_CHUNK_SIZE))
                .await
            {
                Ok(rx) => rx,
                Err(e) => {
                    warn!(measurement = %measurement, error = %e, "dump query failed");
                    send_sentinel(&out).await;
                    return Ok(());
                }
            };

            while let Some(item) = rx.recv().await {
                let result = match item {
                    Some(r) => r,
                    None => continue,
                };
                if let Some(err) = result.error {
                    warn!(measurement = %measurement, error = %err, "dump stream failed");
                    send_sentinel(&out).await;
                    return Ok(());
                }
                for series in &result.series {
                    for row in &series.values {
                        let point = row_to_point(series, row);
                        let batch = Batch {
                            database: database.to_string(),
                            retention_policy: DUMP_RETENTION_POLICY.to_string(),
                            points: vec![point],
                            ..Default::default()
                        };
                        let mut line = match serde_json::to_vec(&batch) {
                            Ok(b) => b,
                            Err(e) => {
                                warn!(error = %e, "dump encode failed");
                                send_sentinel(&out).await;
                                return Ok(());
                            }
                        };
                        line.push(b'\n');
                        if out.send(Bytes::from(line)).await.is_err() {
                            // Client went away; nothing more to write.
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

async fn send_sentinel(out: &mpsc::Sender<Bytes>) {
    let mut line = DUMP_ERROR_SENTINEL.as_bytes().to_vec();
    line.push(b'\n');
    let _ = out.send(Bytes::from(line)).await;
}

/// Reshape one value row into a point, using the series' columns to name
/// fields and pulling the time column out into the timestamp.
fn row_to_point(series: &Series, row: &[serde_json::Value]) -> Point {
    let mut point = Point {
        name: series.name.clone(),
        timestamp: None,
        tags: series.tags.clone(),
        fields: BTreeMap::new(),
    };

    for (subscript, cell) in row.iter().enumerate() {
        let column = match series.columns.get(subscript) {
            Some(c) => c,
            None => continue,
        };
        // The time column becomes the point's timestamp; it is never
        // duplicated into the fields.
        if column == "time" {
            point.timestamp = cell.as_i64().map(DateTime::from_timestamp_nanos);
            continue;
        }
        point.fields.insert(column.clone(), cell.clone());
    }

    point
}

/// Stringify a discovery cell the way the exporter names measurements:
/// strings verbatim, everything else via its JSON rendering, nulls empty.
fn cell_to_string(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
