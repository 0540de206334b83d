//! Request authentication
//!
//! Credentials arrive as `u`/`p` query parameters or as HTTP Basic auth.
//! When authentication is disabled, or the cluster has no registered users
//! yet, requests pass through without a principal: a freshly bootstrapped
//! cluster must be reachable before its first user exists.

use super::{ApiError, ApiState};
use crate::query::UserContext;
use crate::{Error, Result};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::Engine;

/// The credential store.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Number of registered users in the cluster.
    fn user_count(&self) -> usize;

    /// Verify a username/password pair, returning the principal.
    async fn authenticate(&self, username: &str, password: &str) -> Result<UserContext>;
}

/// Authenticated principal for a request; `None` when authentication is
/// bypassed.
pub struct Principal(pub Option<UserContext>);

#[async_trait::async_trait]
impl FromRequestParts<ApiState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> std::result::Result<Self, Self::Rejection> {
        if !state.require_authentication || state.users.user_count() == 0 {
            return Ok(Principal(None));
        }

        let (username, password) = parse_credentials(parts)
            .ok_or_else(|| {
                ApiError::unauthorized(Error::Unauthorized(
                    "unable to parse Basic Auth credentials".to_string(),
                ))
            })?;

        if username.is_empty() {
            return Err(ApiError::unauthorized(Error::Unauthorized(
                "username required".to_string(),
            )));
        }

        let user = state
            .users
            .authenticate(&username, &password)
            .await
            .map_err(ApiError::unauthorized)?;
        Ok(Principal(Some(user)))
    }
}

/// Username and password from query params (`u`, `p`) or Basic auth.
fn parse_credentials(parts: &Parts) -> Option<(String, String)> {
    if let Some(query) = parts.uri.query() {
        let mut u = None;
        let mut p = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "u" => u = Some(value.into_owned()),
                "p" => p = Some(value.into_owned()),
                _ => {}
            }
        }
        if let (Some(u), Some(p)) = (u, p) {
            if !u.is_empty() && !p.is_empty() {
                return Some((u, p));
            }
        }
    }

    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
