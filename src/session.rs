//! Per-request authentication state.
//!
//! A [`Session`] is built once per request from a user's JWT and then passed
//! by reference to every platform call, so concurrent requests never share a
//! "current user".

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

use crate::error::EcoError;
use crate::model::{ClubScope, PlatformUser};

const PREVIEW_CHARS: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: PlatformUser,
    pub scope: ClubScope,
}

/// Claims read from a JWT payload without verifying its signature. The
/// platform verifies the token; this only rejects obvious garbage early.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    pub sub: Option<String>,
    pub exp: Option<i64>,
}

impl TokenClaims {
    pub fn peek(token: &str) -> Result<Self, EcoError> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => p,
            _ => return Err(EcoError::InvalidToken("expected three dot-separated segments".into())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| EcoError::InvalidToken(format!("payload is not base64url ({e})")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| EcoError::InvalidToken(format!("payload is not JSON claims ({e})")))
    }

    pub fn is_expired_at(&self, unix_secs: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= unix_secs)
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Local sanity check run before the token is sent to the platform.
pub fn check_token(token: &str) -> Result<TokenClaims, EcoError> {
    let claims = TokenClaims::peek(token)?;
    if claims.is_expired_at(now_unix()) {
        return Err(EcoError::InvalidToken("token has expired".into()));
    }
    Ok(claims)
}

/// Strips an optional `Bearer ` prefix from an Authorization header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .unwrap_or(header)
        .trim();
    (!token.is_empty()).then_some(token)
}

/// First characters of a token, safe to log.
pub fn preview(token: &str) -> String {
    let head: String = token.chars().take(PREVIEW_CHARS).collect();
    format!("{head}…")
}
