//! Exposure rules for `docqa serve`.
//!
//! The API listens on loopback only unless `--public` is passed, and a
//! public server must carry a bearer token. Both are decided once, before
//! the service is opened, by [`ServeSecurity`].

use anyhow::{Context as AnyhowContext, Result};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::fmt;
use std::net::SocketAddr;

pub const AUTH_TOKEN_ENV: &str = "DOCQA_AUTH_TOKEN";

/// Shared secret checked against `Authorization: Bearer <token>`
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    /// Surrounding whitespace is ignored; a blank token is an error.
    pub fn new(raw: &str) -> Result<Self> {
        let token = raw.trim();
        if token.is_empty() {
            anyhow::bail!("auth token must be non-empty");
        }
        Ok(Self(token.to_string()))
    }

    /// Whether `headers` carry this token.
    pub fn authorizes(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().strip_prefix("Bearer "))
            .is_some_and(|presented| same_bytes(presented.trim().as_bytes(), self.0.as_bytes()))
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Compares every byte regardless of where the first difference is.
fn same_bytes(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// How `serve` may expose the API
#[derive(Debug, Clone)]
pub struct ServeSecurity {
    pub public: bool,
    pub token: Option<BearerToken>,
}

impl ServeSecurity {
    /// `flag_token` wins over `env_token`; an empty environment value
    /// counts as unset.
    pub fn new(public: bool, flag_token: Option<&str>, env_token: Option<&str>) -> Result<Self> {
        let raw = flag_token.or(env_token.filter(|value| !value.trim().is_empty()));
        let token = raw.map(BearerToken::new).transpose()?;
        if public && token.is_none() {
            anyhow::bail!(
                "--public requires an auth token: set --auth-token or export {AUTH_TOKEN_ENV}"
            );
        }
        Ok(Self { public, token })
    }

    /// Read the fallback token from `DOCQA_AUTH_TOKEN`.
    pub fn from_env(public: bool, flag_token: Option<&str>) -> Result<Self> {
        let env_token = std::env::var(AUTH_TOKEN_ENV).ok();
        Self::new(public, flag_token, env_token.as_deref())
    }

    /// Resolve `bind` and refuse non-loopback addresses unless public.
    pub async fn listen_addrs(&self, bind: &str) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
            .await
            .with_context(|| format!("Failed to resolve bind address: {bind}"))?
            .collect();
        if addrs.is_empty() {
            anyhow::bail!("Bind address {bind} resolved to nothing");
        }
        if !self.public {
            if let Some(exposed) = addrs.iter().find(|addr| !addr.ip().is_loopback()) {
                anyhow::bail!(
                    "Refusing to bind {bind} ({exposed} is not loopback) without --public; \
                     pass --public together with --auth-token or {AUTH_TOKEN_ENV}"
                );
            }
        }
        Ok(addrs)
    }
}
