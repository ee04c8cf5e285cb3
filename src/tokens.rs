//! Token generation and keyed hashing.
//!
//! Raw deletion tokens leave the server exactly once, inside the confirmation
//! email. Only their keyed digest is ever stored.

use hmac::{Hmac, Mac};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of a raw deletion token (40 alphanumeric chars, ~238 bits).
pub const RAW_TOKEN_LEN: usize = 40;

/// Length of a flash key (32 alphanumeric chars, ~190 bits).
pub const FLASH_KEY_LEN: usize = 32;

/// Minimum accepted length of the server secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// A raw deletion token. Never persisted; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken(String);

impl RawToken {
    /// Generates a fresh token from the thread-local CSPRNG.
    pub fn generate() -> Self {
        RawToken(random_alphanumeric(RAW_TOKEN_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawToken(<redacted>)")
    }
}

/// Opaque key correlating a one-time success flag across a redirect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlashKey(String);

impl FlashKey {
    pub fn generate() -> Self {
        FlashKey(random_alphanumeric(FLASH_KEY_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FlashKey {
    fn from(key: String) -> Self {
        FlashKey(key)
    }
}

impl fmt::Display for FlashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when the server secret is too short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeakSecret {
    pub len: usize,
}

impl fmt::Display for WeakSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "secret key is {} bytes, at least {} are required",
            self.len, MIN_SECRET_LEN
        )
    }
}

impl std::error::Error for WeakSecret {}

/// HMAC-SHA256 keyed with the server secret.
///
/// Digests are hex encoded so they can be stored as text.
#[derive(Clone)]
pub struct KeyedHasher {
    mac: HmacSha256,
}

impl KeyedHasher {
    pub fn new(secret: &[u8]) -> Result<Self, WeakSecret> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(WeakSecret { len: secret.len() });
        }
        // HMAC accepts keys of any length.
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| WeakSecret {
            len: secret.len(),
        })?;
        Ok(Self { mac })
    }

    /// Returns the hex digest of `input`.
    pub fn digest(&self, input: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(input.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Hashes a raw token and compares it to `stored` in constant time.
    pub fn matches(&self, raw: &str, stored: &str) -> bool {
        digests_equal(&self.digest(raw), stored)
    }
}

impl fmt::Debug for KeyedHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyedHasher(<secret>)")
    }
}

/// Constant-time equality for digests.
///
/// Only the length is allowed to short-circuit; all digests we compare have
/// the same length.
pub fn digests_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
