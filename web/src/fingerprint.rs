//! Keyed request fingerprints.
//!
//! The fingerprint must be stable across restarts and identical on every
//! gateway replica, so it is an HMAC-SHA-256 over the canonical byte
//! sequence `method \n path \n user_id \n body`, hex-encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes request fingerprints with a fixed key.
#[derive(Clone)]
pub struct Fingerprinter {
    key: Vec<u8>,
}

impl Fingerprinter {
    /// Build a fingerprinter over the configured key.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    /// Fingerprint one request.
    #[must_use]
    pub fn fingerprint(&self, method: &str, path: &str, user_id: &str, body: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(method.as_bytes());
        mac.update(b"\n");
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(user_id.as_bytes());
        mac.update(b"\n");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}
