//! Access tokens, their acquisition and their per-client cache.
//!
//! - [`TokenAcquirer`] performs the grant exchange against a token endpoint,
//!   retrying transient network failures with exponential backoff.
//! - [`TokenCache`] keeps the latest token of every named client and makes
//!   concurrent callers for the same name share a single acquisition.

use std::fmt;
use std::time::Duration;

use jiff::Timestamp;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clock::unshift;
use crate::secret::SecureString;

mod acquire;
pub use self::acquire::{Grant, RetryPolicy, TokenAcquirer};

mod cache;
pub use self::cache::{DEFAULT_EXPIRY_SKEW, TokenCache};

/// An access token together with its lifetime.
///
/// Replaced as a whole on refresh, never mutated in place.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CachedToken {
    access_token: String,
    #[zeroize(skip)]
    issued_at: Timestamp,
    #[zeroize(skip)]
    expires_at: Timestamp,
}

impl CachedToken {
    /// Creates a token valid from `issued_at` until `expires_at`.
    pub fn new(access_token: impl Into<String>, issued_at: Timestamp, expires_at: Timestamp) -> Self {
        Self {
            access_token: access_token.into(),
            issued_at,
            expires_at,
        }
    }

    /// Returns the access token value.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the access token value as a [`SecureString`].
    pub fn secret(&self) -> SecureString {
        SecureString::new(self.access_token.clone())
    }

    /// When the token was obtained.
    pub fn issued_at(&self) -> Timestamp {
        self.issued_at
    }

    /// When the token stops being valid.
    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Returns `true` if the token may still be served at `now`, keeping `skew`
    /// as a safety margin before the expiry.
    pub fn is_fresh(&self, now: Timestamp, skew: Duration) -> bool {
        now < unshift(self.expires_at, skew)
    }

    /// Returns `true` if both tokens carry the same access token value.
    pub(crate) fn same_value(&self, other: &Self) -> bool {
        self.access_token == other.access_token
    }
}

impl PartialEq for CachedToken {
    fn eq(&self, other: &Self) -> bool {
        self.access_token == other.access_token
            && self.issued_at == other.issued_at
            && self.expires_at == other.expires_at
    }
}

impl Eq for CachedToken {}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
