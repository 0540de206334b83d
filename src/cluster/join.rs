//! Client side of the cluster join protocol
//!
//! A joining node asks an existing member for admission by posting its own
//! URL to the member's data-node collection. Candidates are tried strictly
//! in order; the first success wins and exhaustion is an error, which the
//! bootstrap orchestrator treats as fatal.

use super::DataNodeInfo;
use crate::{Error, Result};

use std::future::Future;
use tracing::{info, warn};
use url::Url;

/// HTTP client for requesting admission from an existing cluster member.
pub struct JoinClient {
    http: reqwest::Client,
}

impl JoinClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Register `node_url` with the member at `peer`, returning the
    /// assigned node identity.
    pub async fn register(&self, peer: &Url, node_url: &Url) -> Result<DataNodeInfo> {
        let endpoint = peer
            .join("/data/data_nodes")
            .map_err(|e| Error::Validation(format!("invalid join url: {}", e)))?;

        let response = self
            .http
            .post(endpoint)
            .json(&serde_json::json!({ "url": node_url }))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("join request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "join rejected by {}: {} {}",
                peer, status, body
            )));
        }

        response
            .json::<DataNodeInfo>()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Default for JoinClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Try `attempt` against each candidate URL in listed order, stopping at
/// the first success. Attempts are intentionally serialized; there is
/// never more than one join in flight.
pub async fn join_first<T, F, Fut>(what: &str, candidates: &[Url], mut attempt: F) -> Result<T>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for candidate in candidates {
        match attempt(candidate.clone()).await {
            Ok(value) => {
                info!(peer = %candidate, "join: connected {} to cluster", what);
                return Ok(value);
            }
            Err(e) => {
                warn!(peer = %candidate, error = %e, "join: failed to connect {}", what);
            }
        }
    }
    Err(Error::Internal(format!(
        "join: failed to connect {} to any specified server",
        what
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn urls(n: usize) -> Vec<Url> {
        (0..n)
            .map(|i| Url::parse(&format!("http://10.0.0.{}:8086", i + 1)).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn first_success_short_circuits_remaining_candidates() {
        let candidates = urls(3);
        let attempts = AtomicUsize::new(0);

        let joined = join_first("data node", &candidates, |url| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Internal("connection refused".into()))
                } else {
                    Ok(url)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(joined, candidates[2]);
    }

    #[tokio::test]
    async fn exhausting_all_candidates_is_an_error() {
        let candidates = urls(3);
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = join_first("broker", &candidates, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Internal("connection refused".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn candidates_are_tried_in_listed_order() {
        let candidates = urls(3);
        let seen = parking_lot::Mutex::new(Vec::new());

        let _: Result<()> = join_first("broker", &candidates, |url| {
            seen.lock().push(url);
            async { Err(Error::Internal("down".into())) }
        })
        .await;

        assert_eq!(*seen.lock(), candidates);
    }
}
