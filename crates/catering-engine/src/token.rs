//! # Customer Access Tokens
//!
//! Opaque bearer tokens that let a customer open their estimate in the
//! portal without an account.
//!
//! ```text
//!   generate_access_token(now, ttl)
//!        │
//!        ├── token: 64 lowercase hex chars (two v4 UUIDs, 244 random bits)
//!        └── expires_at: now + ttl days
//!
//!   portal_link(base_url, token) = "{base_url}/estimate?token={token}"
//! ```
//!
//! A token is rotated on every approved change request, so a link sent
//! before the change stops working once the new estimate exists.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Longest lifetime a portal token may be issued with (about ten years).
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// A freshly issued token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues a new unguessable token valid for `ttl_days`.
///
/// ## Errors
/// `InvalidConfig` when `ttl_days` is outside `1..=MAX_TOKEN_TTL_DAYS` or the
/// expiry does not fit in a timestamp.
pub fn generate_access_token(now: DateTime<Utc>, ttl_days: i64) -> EngineResult<AccessToken> {
    if !(1..=MAX_TOKEN_TTL_DAYS).contains(&ttl_days) {
        return Err(invalid_ttl(ttl_days));
    }
    let expires_at = Duration::try_days(ttl_days)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| invalid_ttl(ttl_days))?;

    let token = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    Ok(AccessToken { token, expires_at })
}

fn invalid_ttl(ttl_days: i64) -> EngineError {
    EngineError::InvalidConfig(format!(
        "portal.token_ttl_days must be between 1 and {}, got: {}",
        MAX_TOKEN_TTL_DAYS, ttl_days
    ))
}

/// Customer-facing estimate link.
pub fn portal_link(base_url: &str, token: &str) -> String {
    format!("{}/estimate?token={}", base_url.trim_end_matches('/'), token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catering_core::test_fixtures::fixed_now;

    #[test]
    fn test_tokens_are_unique_hex() {
        let a = generate_access_token(fixed_now(), 90).unwrap();
        let b = generate_access_token(fixed_now(), 90).unwrap();

        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
        assert!(a.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.expires_at, fixed_now() + Duration::days(90));
    }

    #[test]
    fn test_out_of_range_ttl_is_an_error() {
        for ttl in [0, -1, MAX_TOKEN_TTL_DAYS + 1, 1_000_000_000, i64::MAX] {
            let err = generate_access_token(fixed_now(), ttl).unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
        }

        let longest = generate_access_token(fixed_now(), MAX_TOKEN_TTL_DAYS).unwrap();
        assert_eq!(longest.expires_at, fixed_now() + Duration::days(MAX_TOKEN_TTL_DAYS));
    }

    #[test]
    fn test_portal_link_ignores_trailing_slash() {
        assert_eq!(
            portal_link("https://portal.example.com/", "abc"),
            "https://portal.example.com/estimate?token=abc"
        );
        assert_eq!(
            portal_link("http://localhost:3000", "abc"),
            "http://localhost:3000/estimate?token=abc"
        );
    }
}
