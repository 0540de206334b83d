//! Buffered-mode result accumulation
//!
//! Buffered output combines partial results that share a statement id. The
//! engine chunks internally even when the client did not ask for chunking,
//! so consecutive results with the same id are fragments of one statement
//! and their series concatenate in arrival order.

use crate::query::{ResultItem, ResultStream};
use crate::response::{Response, StatementResult};

/// Fold one result into the accumulating envelope.
///
/// A result whose id matches the last accumulated entry extends that
/// entry's series; anything else starts a new entry. Matching is against
/// the trailing entry only: the engine emits statements in order, so a
/// repeated id can only be a continuation.
pub fn append_result(response: &mut Response, result: StatementResult) {
    match response.results.last_mut() {
        Some(last) if last.statement_id == result.statement_id => {
            last.series.extend(result.series);
        }
        _ => response.results.push(result),
    }
}

/// Drain the engine's result channel into a single buffered envelope.
///
/// `None` placeholders are skipped; they carry no output. The first item
/// (placeholder included) has already been consumed by the caller for
/// status classification and is passed back in via `first`.
pub async fn merge_buffered(first: ResultItem, rx: &mut ResultStream) -> Response {
    let mut response = Response::default();

    if let Some(result) = first {
        append_result(&mut response, result);
    }
    while let Some(item) = rx.recv().await {
        if let Some(result) = item {
            append_result(&mut response, result);
        }
    }

    response
}
