use std::fmt;

use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Length in bytes of an HMAC-SHA1 checksum.
pub const CHECKSUM_LENGTH: usize = 20;

/// Server-side key material used to checksum issued tokens.
///
/// The secret never leaves the server. Tokens carry `HMAC-SHA1(secret, key)` so the
/// layer can recognise values it issued independently of the cookie comparison.
#[derive(Clone)]
pub struct Secret {
    mac: HmacSha1,
}

impl Secret {
    /// Build a secret from raw key material.
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        // HMAC hashes keys longer than the block size and pads shorter ones.
        let mac = HmacSha1::new_from_slice(key.as_ref()).expect("HMAC accepts keys of any length");
        Self { mac }
    }

    /// Generate a random 32-byte secret.
    ///
    /// Tokens issued under a generated secret stop verifying once the process restarts, so
    /// production deployments should load a persistent secret with [`Secret::new`].
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    pub(crate) fn checksum(&self, data: &[u8]) -> [u8; CHECKSUM_LENGTH] {
        let mut mac = self.mac.clone();
        mac.update(data);

        let mut out = [0u8; CHECKSUM_LENGTH];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&"***").finish()
    }
}
