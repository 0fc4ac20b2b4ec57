//! Counter-based pull-token cache.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct CachedToken {
    token: String,
    uses: u64,
}

/// Cache for anonymous registry pull tokens.
///
/// Instead of tracking token expiry, a token is reused for a bounded
/// number of requests and then replaced.  The cache is deliberately not
/// keyed by scope: all requests share one token regardless of channel,
/// subdir, or package, and a token issued for one repository may be
/// presented for another while it is within its use budget.  Registries
/// that enforce scope-bound tokens strictly would reject such reuse.
#[derive(Debug)]
pub struct PullTokenCache {
    max_uses: u64,
    slot: Mutex<Option<CachedToken>>,
}

impl PullTokenCache {
    /// Create a cache whose tokens are reused at most `max_uses` times
    /// after the issuing request.
    pub fn new(max_uses: u64) -> Self {
        Self {
            max_uses,
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CachedToken>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached token and bump its use counter, or `None` when
    /// the cache is empty or the token's use budget is exhausted.
    pub fn checkout(&self) -> Option<String> {
        let mut slot = self.slot();
        let cached = slot.as_mut()?;
        if cached.uses > self.max_uses {
            return None;
        }
        cached.uses += 1;
        Some(cached.token.clone())
    }

    /// Cache a freshly fetched token.  The issuing request counts as the
    /// first use.
    pub fn store(&self, token: &str) {
        *self.slot() = Some(CachedToken {
            token: token.to_string(),
            uses: 1,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
