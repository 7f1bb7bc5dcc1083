// Copyright 2024, The Kaspa AIO Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # Handoff tokens
//!
//! Short-lived, single-use tokens that carry a launch context (install,
//! reconfigure, update) between the dashboard and the wizard. Tokens live only
//! in memory for the lifetime of the process.

use chrono::{DateTime, Duration, Utc};
use kaspa_aio_shutdown::ShutdownSignal;
use log::*;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use strum_macros::{Display, EnumString};
use tokio::sync::RwLock;

const LOG_TARGET: &str = "aio::tokens";

pub const DEFAULT_TTL_SECS: i64 = 15 * 60;
pub const SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HandoffMode {
    Install,
    Reconfigure,
    Update,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token not found")]
    NotFound,
    #[error("Token has expired")]
    Expired,
    #[error("Token has already been consumed")]
    AlreadyConsumed,
}

impl crate::error::BoundaryError for TokenError {
    fn kind(&self) -> crate::error::ErrorKind {
        match self {
            TokenError::NotFound => crate::error::ErrorKind::TokenNotFound,
            TokenError::Expired => crate::error::ErrorKind::TokenExpired,
            TokenError::AlreadyConsumed => crate::error::ErrorKind::TokenAlreadyConsumed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub mode: HandoffMode,
    pub payload: serde_json::Value,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TokenEntry {
    data: TokenData,
    consumed: bool,
}

#[derive(Clone)]
pub struct TokenStore {
    tokens: Arc<RwLock<HashMap<String, TokenEntry>>>,
    ttl: Duration,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// 256 bits from the OS CSPRNG, hex encoded (URL safe as-is).
    pub async fn issue(&self, mode: HandoffMode, payload: serde_json::Value) -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let issued_at = Utc::now();
        let entry = TokenEntry {
            data: TokenData {
                mode,
                payload,
                issued_at,
                expires_at: issued_at + self.ttl,
            },
            consumed: false,
        };
        self.tokens.write().await.insert(token.clone(), entry);
        debug!(target: LOG_TARGET, "issued {} token", mode);
        token
    }

    /// Reads the payload without consuming. No side effects.
    pub async fn peek(&self, token: &str) -> Result<TokenData, TokenError> {
        let tokens = self.tokens.read().await;
        let entry = tokens.get(token).ok_or(TokenError::NotFound)?;
        if entry.consumed {
            return Err(TokenError::AlreadyConsumed);
        }
        if entry.data.expires_at < Utc::now() {
            return Err(TokenError::Expired);
        }
        Ok(entry.data.clone())
    }

    /// Single use: the first successful call marks the token consumed.
    pub async fn consume(&self, token: &str) -> Result<TokenData, TokenError> {
        let mut tokens = self.tokens.write().await;
        let entry = tokens.get_mut(token).ok_or(TokenError::NotFound)?;
        if entry.consumed {
            return Err(TokenError::AlreadyConsumed);
        }
        if entry.data.expires_at < Utc::now() {
            return Err(TokenError::Expired);
        }
        entry.consumed = true;
        Ok(entry.data.clone())
    }

    /// Explicit teardown; returns whether the token existed.
    pub async fn invalidate(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }

    /// Drops expired and consumed tokens; returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, entry| !entry.consumed && entry.data.expires_at >= now);
        before - tokens.len()
    }

    pub fn spawn_sweeper(&self, mut shutdown: ShutdownSignal) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = store.sweep().await;
                        if removed > 0 {
                            debug!(target: LOG_TARGET, "swept {} token(s)", removed);
                        }
                    },
                    _ = &mut shutdown => {
                        debug!(target: LOG_TARGET, "token sweeper shut down");
                        break;
                    },
                }
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn issued_tokens_are_long_and_unique() {
        let store = TokenStore::new();
        let a = store.issue(HandoffMode::Install, json!({})).await;
        let b = store.issue(HandoffMode::Install, json!({})).await;
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let store = TokenStore::new();
        let token = store.issue(HandoffMode::Reconfigure, json!({"step": 2})).await;
        for _ in 0..3 {
            let data = store.peek(&token).await.unwrap();
            assert_eq!(data.mode, HandoffMode::Reconfigure);
            assert_eq!(data.payload["step"], 2);
        }
        assert!(store.consume(&token).await.is_ok());
    }

    #[tokio::test]
    async fn consume_succeeds_at_most_once() {
        let store = TokenStore::new();
        let token = store.issue(HandoffMode::Update, json!({})).await;
        assert!(store.consume(&token).await.is_ok());
        assert_eq!(store.consume(&token).await.unwrap_err(), TokenError::AlreadyConsumed);
        assert_eq!(store.peek(&token).await.unwrap_err(), TokenError::AlreadyConsumed);
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected_then_swept() {
        let store = TokenStore::with_ttl(Duration::seconds(-1));
        let token = store.issue(HandoffMode::Install, json!({})).await;
        assert_eq!(store.peek(&token).await.unwrap_err(), TokenError::Expired);
        assert_eq!(store.consume(&token).await.unwrap_err(), TokenError::Expired);
        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.consume(&token).await.unwrap_err(), TokenError::NotFound);
    }

    #[tokio::test]
    async fn invalidate_removes_the_token() {
        let store = TokenStore::new();
        let token = store.issue(HandoffMode::Install, json!({})).await;
        assert!(store.invalidate(&token).await);
        assert!(!store.invalidate(&token).await);
        assert_eq!(store.peek(&token).await.unwrap_err(), TokenError::NotFound);
    }

    #[tokio::test]
    async fn unknown_tokens_are_not_found() {
        let store = TokenStore::new();
        assert_eq!(store.peek("feed").await.unwrap_err(), TokenError::NotFound);
    }
}
