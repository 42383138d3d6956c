//! In-process denylist of logged-out tokens.
//!
//! Entries are kept only until the token would have expired anyway.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

#[derive(Debug, Default)]
pub struct RevokedTokens {
    /// jti -> `exp` of the revoked token.
    entries: Mutex<HashMap<String, i64>>,
}

impl RevokedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if the token was already revoked.
    pub fn revoke(&self, jti: &str, expires_at: i64) -> bool {
        let now = Utc::now().timestamp();
        let mut entries = self.entries();
        entries.retain(|_, exp| *exp > now);
        entries.insert(jti.to_owned(), expires_at).is_none()
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.entries().contains_key(jti)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
