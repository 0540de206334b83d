//! Query coordination for gale
//!
//! The coordinator is the entry point for query requests. It validates the
//! raw query text, hands it to the external query engine, and drives the
//! engine's per-statement result channel into one of two output protocols:
//! - chunked: every result is flushed to the client as its own envelope
//! - buffered: results accumulate in memory, concatenating partials that
//!   share a statement id, and are written once at end of stream

mod classify;
mod merge;

pub use classify::{classify_first_result, StatusClass};
pub use merge::{append_result, merge_buffered};

use crate::response::StatementResult;
use crate::{Error, Result};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default number of values a mapper reads per chunk before handing results
/// back to the engine. Also the buffered-mode combine granularity.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// A single item on the engine's result channel.
///
/// `None` is a legitimate placeholder meaning "no error, no data yet": it
/// classifies the response status when it arrives first, and is otherwise
/// skipped for output purposes.
pub type ResultItem = Option<StatementResult>;

/// Receiving half of the engine's per-statement result channel.
///
/// Results for one statement arrive in emission order, possibly split
/// across several items, and must never be reordered.
pub type ResultStream = mpsc::Receiver<ResultItem>;

/// Principal attached to an authenticated request.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub name: String,
    pub is_admin: bool,
    /// Per-database grants resolved by the credential store.
    pub privileges: std::collections::BTreeMap<String, Privilege>,
}

impl UserContext {
    /// Whether this principal holds `privilege` on `database`. Admins hold
    /// every privilege everywhere; `All` subsumes read and write.
    pub fn authorize(&self, privilege: Privilege, database: &str) -> bool {
        if self.is_admin {
            return true;
        }
        match self.privileges.get(database) {
            Some(Privilege::All) => true,
            Some(granted) => *granted == privilege,
            None => false,
        }
    }
}

/// Privileges a principal can hold on a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Read,
    Write,
    All,
}

/// The external query engine: parses query text into statements and
/// executes them, streaming per-statement results back.
///
/// Parse failures surface as [`Error::Parse`] from `execute`, before any
/// stream item is produced.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        database: &str,
        user: Option<&UserContext>,
        chunk_size: usize,
    ) -> Result<ResultStream>;
}

/// Chunking settings requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunking {
    /// Buffer all results and write a single envelope.
    Buffered,
    /// Flush each result as its own envelope, with the given engine chunk
    /// granularity.
    Chunked(usize),
}

impl Chunking {
    /// Engine chunk size for this mode. Buffered mode still chunks inside
    /// the engine at the default size; the merge recombines afterwards.
    pub fn chunk_size(&self) -> usize {
        match self {
            Chunking::Buffered => DEFAULT_CHUNK_SIZE,
            Chunking::Chunked(size) => *size,
        }
    }
}

/// Entry point for query execution.
pub struct QueryCoordinator {
    engine: Arc<dyn QueryEngine>,
}

impl QueryCoordinator {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Validate the query text and start execution.
    ///
    /// Fails fast with [`Error::Validation`] on missing/empty text, before
    /// the engine is invoked. Engine-level failures (parse errors,
    /// authorization) surface as the corresponding typed error.
    pub async fn start(
        &self,
        query: &str,
        database: &str,
        user: Option<&UserContext>,
        chunking: Chunking,
    ) -> Result<ResultStream> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation(
                r#"missing required parameter "q""#.to_string(),
            ));
        }

        self.engine
            .execute(query, database, user, chunking.chunk_size())
            .await
    }
}
