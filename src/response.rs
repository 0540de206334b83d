//! Wire model for query responses
//!
//! A query produces a sequence of per-statement results; the response
//! envelope carries them in first-seen order. Partial results for the same
//! statement are concatenated, never reordered.

use crate::Error;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One series of rows within a statement result.
///
/// Row tuples in `values` correspond position-for-position to `columns`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Result of a single parsed statement, possibly partial.
///
/// `statement_id` is the statement's zero-based position in the query text
/// and is the identity results are merged by. The engine may emit several
/// results with the same id; they arrive in order and their `series` are
/// concatenated by the buffered merge.
#[derive(Debug, Default, Serialize)]
pub struct StatementResult {
    #[serde(skip)]
    pub statement_id: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Series>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "error_string")]
    pub error: Option<Error>,
}

impl StatementResult {
    /// A result carrying only an error, attributed to statement 0.
    pub fn from_error(err: Error) -> Self {
        StatementResult {
            statement_id: 0,
            series: Vec::new(),
            error: Some(err),
        }
    }
}

/// Response envelope: one entry per statement in first-seen order.
///
/// Once flushed in buffered mode, `results` holds at most one entry per
/// distinct statement id.
#[derive(Debug, Default, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<StatementResult>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "error_string")]
    pub error: Option<Error>,
}

impl Response {
    /// An envelope carrying a single top-level error.
    pub fn from_error(err: Error) -> Self {
        Response {
            results: Vec::new(),
            error: Some(err),
        }
    }
}

fn error_string<S>(err: &Option<Error>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match err {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Marshal `value` to JSON, pretty-printed when requested.
///
/// Clients must always receive a parseable body, so a marshal failure falls
/// back to marshaling an error result, and if even that fails the raw error
/// text is returned verbatim.
pub fn marshal_pretty<T: Serialize>(value: &T, pretty: bool) -> Vec<u8> {
    let attempt = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };

    let err = match attempt {
        Ok(b) => return b,
        Err(e) => e,
    };

    let fallback = StatementResult::from_error(Error::Serialization(err.to_string()));
    let attempt = if pretty {
        serde_json::to_vec_pretty(&fallback)
    } else {
        serde_json::to_vec(&fallback)
    };

    match attempt {
        Ok(b) => b,
        Err(e) => e.to_string().into_bytes(),
    }
}
