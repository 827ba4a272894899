//! Token issuance and validation primitives.
//!
//! Uses:
//! - BLAKE3 keyed hashing to bind a token to an action and a time tick
//! - URL-safe base64 so tokens survive form and query encoding

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain separation context for deriving the token key from a configured secret
const KEY_CONTEXT: &str = "plugin-options 2024-01-01 request token key";

/// Issues and validates action-scoped tokens.
pub trait TokenAuthority: Send + Sync {
    /// Create a token bound to `action`.
    fn create_token(&self, action: &str) -> String;

    /// Check that `token` was issued for `action` and has not expired.
    fn validate_token(&self, token: &str, action: &str) -> bool;

    /// Validity window new tokens are issued in. A token cached from an
    /// older epoch should be replaced. Authorities whose tokens never
    /// expire keep the default.
    fn token_epoch(&self) -> i64 {
        0
    }
}

/// Time-ticked keyed-hash token authority.
///
/// A token is valid during the tick it was issued in and the one after,
/// so its effective lifetime is between half and the full configured lifetime.
/// The key is held only in memory and zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyedTokenAuthority {
    key: [u8; 32],
    lifetime_secs: u64,
}

impl KeyedTokenAuthority {
    /// Derive the token key from a configured secret.
    pub fn new(secret: &str, lifetime_secs: u64) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            lifetime_secs,
        }
    }

    /// Use a random key. Tokens do not survive a restart.
    pub fn generate(lifetime_secs: u64) -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key, lifetime_secs }
    }

    fn tick_at(&self, now_secs: i64) -> i64 {
        let half = (self.lifetime_secs / 2).max(1) as i64;
        now_secs.div_euclid(half) + 1
    }

    fn digest(&self, action: &str, tick: i64) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(&tick.to_le_bytes());
        hasher.update(action.as_bytes());
        hasher.finalize()
    }

    pub fn token_epoch_at(&self, now_secs: i64) -> i64 {
        self.tick_at(now_secs)
    }

    pub fn create_token_at(&self, action: &str, now_secs: i64) -> String {
        BASE64.encode(self.digest(action, self.tick_at(now_secs)).as_bytes())
    }

    pub fn validate_token_at(&self, token: &str, action: &str, now_secs: i64) -> bool {
        let bytes = match BASE64.decode(token) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let presented: [u8; 32] = match bytes.try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        };
        // blake3::Hash equality is constant time
        let presented = blake3::Hash::from(presented);

        let tick = self.tick_at(now_secs);
        presented == self.digest(action, tick) || presented == self.digest(action, tick - 1)
    }
}

impl TokenAuthority for KeyedTokenAuthority {
    fn create_token(&self, action: &str) -> String {
        self.create_token_at(action, Utc::now().timestamp())
    }

    fn validate_token(&self, token: &str, action: &str) -> bool {
        self.validate_token_at(token, action, Utc::now().timestamp())
    }

    fn token_epoch(&self) -> i64 {
        self.token_epoch_at(Utc::now().timestamp())
    }
}

impl std::fmt::Debug for KeyedTokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedTokenAuthority")
            .field("key", &"<redacted>")
            .field("lifetime_secs", &self.lifetime_secs)
            .finish()
    }
}
