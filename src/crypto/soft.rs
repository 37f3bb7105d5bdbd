//! Software signature backend: HMAC-SHA256 over a configured key.

use std::fmt;
use std::sync::Mutex;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use ring::hmac;
use zeroize::Zeroize;

use crate::error::{SigningError, SigningResult};

use super::{salted_message, Salt, SignerBackend, NONCE_LEN, SERIAL_LEN, SOFT_KEY_LEN, SOFT_TAG_LEN};

/// The soft HMAC key. Zeroed on drop and never printed.
#[derive(Clone)]
pub struct SoftHmacKey(pub(crate) [u8; SOFT_KEY_LEN]);

impl From<[u8; SOFT_KEY_LEN]> for SoftHmacKey {
    fn from(bytes: [u8; SOFT_KEY_LEN]) -> Self {
        SoftHmacKey(bytes)
    }
}

impl fmt::Debug for SoftHmacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SoftHmacKey(<redacted>)")
    }
}

impl Drop for SoftHmacKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Software signer backed by HMAC-SHA256.
///
/// Nonce entropy comes from a PRNG seeded exactly once at construction from
/// the host entropy source; the stream is continued across sessions, never
/// re-seeded, so nonces cannot collide within a short window.
pub struct SoftSigner {
    key: hmac::Key,
    serial: [u8; SERIAL_LEN],
    rng: Mutex<StdRng>,
}

impl SoftSigner {
    /// Create a software signer, seeding the nonce PRNG from the host
    /// entropy source.
    ///
    /// Failure to acquire entropy is a startup error; the subsystem must
    /// not run with degraded randomness.
    pub fn new(secret: &SoftHmacKey, serial: [u8; SERIAL_LEN]) -> SigningResult<Self> {
        let rng = StdRng::from_rng(OsRng).map_err(|e| SigningError::Config {
            message: format!("Failed to acquire entropy for nonce generation: {}", e),
        })?;
        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, &secret.0),
            serial,
            rng: Mutex::new(rng),
        })
    }

    /// Create a software signer with a deterministic nonce stream.
    ///
    /// For tests and simulations only; production construction goes through
    /// [`SoftSigner::new`].
    pub fn with_seed(secret: &SoftHmacKey, serial: [u8; SERIAL_LEN], seed: u64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, &secret.0),
            serial,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SignerBackend for SoftSigner {
    fn sign(&self, buffer: &[u8], salt: Option<&Salt>) -> SigningResult<Vec<u8>> {
        let message = salted_message(buffer, salt);
        Ok(hmac::sign(&self.key, &message).as_ref().to_vec())
    }

    fn verify(&self, buffer: &[u8], tag: &[u8], salt: Option<&Salt>) -> bool {
        if tag.len() != SOFT_TAG_LEN {
            return false;
        }
        let message = salted_message(buffer, salt);
        hmac::verify(&self.key, &message, tag).is_ok()
    }

    fn generate_nonce(&self) -> SigningResult<[u8; NONCE_LEN]> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);
        Ok(nonce)
    }

    fn tag_len(&self) -> usize {
        SOFT_TAG_LEN
    }

    fn serial(&self) -> &[u8; SERIAL_LEN] {
        &self.serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NodeId;

    const TEST_SERIAL: [u8; SERIAL_LEN] = [1, 2, 3, 4, 5, 6, 7, 8, 9];

    fn test_signer() -> SoftSigner {
        SoftSigner::with_seed(&SoftHmacKey::from([0u8; SOFT_KEY_LEN]), TEST_SERIAL, 1)
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = test_signer();
        let tag = signer.sign(b"TEMP=21.5", None).unwrap();
        assert_eq!(tag.len(), SOFT_TAG_LEN);
        assert!(signer.verify(b"TEMP=21.5", &tag, None));
    }

    #[test]
    fn test_verify_rejects_altered_key() {
        // Same serial and message, key differing in a single byte.
        let signer = test_signer();
        let mut key = [0u8; SOFT_KEY_LEN];
        key[0] = 1;
        let other = SoftSigner::with_seed(&SoftHmacKey::from(key), TEST_SERIAL, 1);

        let tag = signer.sign(b"TEMP=21.5", None).unwrap();
        assert!(!other.verify(b"TEMP=21.5", &tag, None));
    }

    #[test]
    fn test_any_bit_flip_fails_verification() {
        let signer = test_signer();
        let buffer = b"TEMP=21.5".to_vec();
        let tag = signer.sign(&buffer, None).unwrap();

        for i in 0..buffer.len() * 8 {
            let mut tampered = buffer.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            assert!(!signer.verify(&tampered, &tag, None), "bit {} of buffer", i);
        }
        for i in 0..tag.len() * 8 {
            let mut tampered = tag.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            assert!(!signer.verify(&buffer, &tampered, None), "bit {} of tag", i);
        }
    }

    #[test]
    fn test_malformed_tag_is_false_not_fault() {
        let signer = test_signer();
        assert!(!signer.verify(b"TEMP=21.5", &[], None));
        assert!(!signer.verify(b"TEMP=21.5", &[0xAB; 5], None));
        assert!(!signer.verify(b"TEMP=21.5", &[0xAB; 64], None));
    }

    #[test]
    fn test_salt_binds_tag_to_peer() {
        let signer = test_signer();
        let salt_a = Salt::new([0x11; SERIAL_LEN], NodeId(1));
        let salt_b = Salt::new([0x11; SERIAL_LEN], NodeId(2));

        let tag = signer.sign(b"TEMP=21.5", Some(&salt_a)).unwrap();
        assert!(signer.verify(b"TEMP=21.5", &tag, Some(&salt_a)));
        assert!(!signer.verify(b"TEMP=21.5", &tag, Some(&salt_b)));
        assert!(!signer.verify(b"TEMP=21.5", &tag, None));
    }

    #[test]
    fn test_nonce_stream_continues_without_reseeding() {
        let signer = test_signer();
        let first = signer.generate_nonce().unwrap();
        let second = signer.generate_nonce().unwrap();
        assert_ne!(first, second);

        // Identical seed reproduces the same stream from the start.
        let replay = test_signer();
        assert_eq!(replay.generate_nonce().unwrap(), first);
        assert_eq!(replay.generate_nonce().unwrap(), second);
    }

    #[test]
    fn test_entropy_seeded_constructor() {
        let signer = SoftSigner::new(&SoftHmacKey::from([0u8; SOFT_KEY_LEN]), TEST_SERIAL)
            .expect("host entropy should be available");
        let a = signer.generate_nonce().unwrap();
        let b = signer.generate_nonce().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SoftHmacKey::from([0x42; SOFT_KEY_LEN]);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("42"));
        assert!(printed.contains("redacted"));
    }
}
