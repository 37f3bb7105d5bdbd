//! Hardware signature backend: fixed-function secure element.
//!
//! The element holds the key material and performs MAC computation and
//! random generation on-chip; the key never crosses the bus. The element is
//! a single shared physical resource, so every operation is bracketed by a
//! scoped lock acquisition. The lock is released on every exit path,
//! including error returns.

use std::sync::Mutex;

use ring::constant_time;
use tracing::warn;

use crate::error::SigningResult;

use super::{salted_message, Salt, SignerBackend, NONCE_LEN, SERIAL_LEN};

/// Bus-level interface to the secure element.
///
/// Implemented by the embedder's bus driver. Methods take `&mut self`
/// because a bus transaction must run to completion before another begins;
/// [`AtshaSigner`] enforces that with an internal lock.
pub trait SecureElement: Send {
    /// Read the element's 9-byte device serial.
    fn read_serial(&mut self) -> SigningResult<[u8; SERIAL_LEN]>;

    /// Fill `out` with bytes from the element's random generator.
    fn random(&mut self, out: &mut [u8]) -> SigningResult<()>;

    /// Compute a MAC over `message` with the key stored in `slot`.
    fn mac(&mut self, slot: u8, message: &[u8]) -> SigningResult<Vec<u8>>;

    /// Length of the MAC produced by [`SecureElement::mac`].
    fn mac_len(&self) -> usize;
}

/// Signer delegating to a secure element.
pub struct AtshaSigner {
    element: Mutex<Box<dyn SecureElement>>,
    key_slot: u8,
    serial: [u8; SERIAL_LEN],
    tag_len: usize,
}

impl AtshaSigner {
    /// Wrap a secure element, reading and caching its serial.
    ///
    /// The serial read doubles as a liveness probe: an element that cannot
    /// report its serial fails construction instead of failing later on the
    /// first signed message.
    pub fn new(mut element: Box<dyn SecureElement>, key_slot: u8) -> SigningResult<Self> {
        let serial = element.read_serial()?;
        let tag_len = element.mac_len();
        Ok(Self {
            element: Mutex::new(element),
            key_slot,
            serial,
            tag_len,
        })
    }
}

impl SignerBackend for AtshaSigner {
    fn sign(&self, buffer: &[u8], salt: Option<&Salt>) -> SigningResult<Vec<u8>> {
        let message = salted_message(buffer, salt);
        let mut element = self.element.lock().unwrap_or_else(|e| e.into_inner());
        element.mac(self.key_slot, &message)
    }

    fn verify(&self, buffer: &[u8], tag: &[u8], salt: Option<&Salt>) -> bool {
        if tag.len() != self.tag_len {
            return false;
        }
        let message = salted_message(buffer, salt);
        let expected = {
            let mut element = self.element.lock().unwrap_or_else(|e| e.into_inner());
            match element.mac(self.key_slot, &message) {
                Ok(mac) => mac,
                Err(e) => {
                    // A dead bus means nothing can verify; the failure is
                    // reported as a mismatch, not a fault.
                    warn!(error = %e, "Secure element MAC failed during verification");
                    return false;
                }
            }
        };
        constant_time::verify_slices_are_equal(&expected, tag).is_ok()
    }

    fn generate_nonce(&self) -> SigningResult<[u8; NONCE_LEN]> {
        let mut nonce = [0u8; NONCE_LEN];
        let mut element = self.element.lock().unwrap_or_else(|e| e.into_inner());
        element.random(&mut nonce)?;
        Ok(nonce)
    }

    fn tag_len(&self) -> usize {
        self.tag_len
    }

    fn serial(&self) -> &[u8; SERIAL_LEN] {
        &self.serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SecureElementErrorKind, SigningError};
    use crate::protocol::NodeId;
    use ring::hmac;

    /// In-memory element emulating the on-chip MAC with HMAC-SHA256.
    struct MockElement {
        secret: [u8; 32],
        serial: [u8; SERIAL_LEN],
        counter: u64,
    }

    impl MockElement {
        fn new(secret: [u8; 32], serial: [u8; SERIAL_LEN]) -> Self {
            Self {
                secret,
                serial,
                counter: 0,
            }
        }
    }

    impl SecureElement for MockElement {
        fn read_serial(&mut self) -> SigningResult<[u8; SERIAL_LEN]> {
            Ok(self.serial)
        }

        fn random(&mut self, out: &mut [u8]) -> SigningResult<()> {
            self.counter += 1;
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = (self.counter as u8).wrapping_add(i as u8);
            }
            Ok(())
        }

        fn mac(&mut self, slot: u8, message: &[u8]) -> SigningResult<Vec<u8>> {
            let mut keyed = self.secret.to_vec();
            keyed.push(slot);
            let key = hmac::Key::new(hmac::HMAC_SHA256, &keyed);
            Ok(hmac::sign(&key, message).as_ref().to_vec())
        }

        fn mac_len(&self) -> usize {
            32
        }
    }

    /// Element whose bus is dead.
    struct DeadElement;

    impl SecureElement for DeadElement {
        fn read_serial(&mut self) -> SigningResult<[u8; SERIAL_LEN]> {
            Ok([0xEE; SERIAL_LEN])
        }

        fn random(&mut self, _out: &mut [u8]) -> SigningResult<()> {
            Err(SigningError::SecureElement {
                kind: SecureElementErrorKind::WakeFailed,
            })
        }

        fn mac(&mut self, _slot: u8, _message: &[u8]) -> SigningResult<Vec<u8>> {
            Err(SigningError::SecureElement {
                kind: SecureElementErrorKind::Bus {
                    message: "no response".to_string(),
                },
            })
        }

        fn mac_len(&self) -> usize {
            32
        }
    }

    const SERIAL: [u8; SERIAL_LEN] = [0xA0, 1, 2, 3, 4, 5, 6, 7, 8];

    fn test_signer() -> AtshaSigner {
        AtshaSigner::new(Box::new(MockElement::new([7u8; 32], SERIAL)), 0).unwrap()
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = test_signer();
        let tag = signer.sign(b"TEMP=21.5", None).unwrap();
        assert_eq!(tag.len(), signer.tag_len());
        assert!(signer.verify(b"TEMP=21.5", &tag, None));
    }

    #[test]
    fn test_verify_rejects_tamper() {
        let signer = test_signer();
        let mut tag = signer.sign(b"TEMP=21.5", None).unwrap();
        tag[0] ^= 0x01;
        assert!(!signer.verify(b"TEMP=21.5", &tag, None));
    }

    #[test]
    fn test_interop_between_elements_sharing_key() {
        // Two nodes with distinct elements provisioned with the same key.
        let a = test_signer();
        let b = AtshaSigner::new(
            Box::new(MockElement::new([7u8; 32], [0xB0, 1, 2, 3, 4, 5, 6, 7, 8])),
            0,
        )
        .unwrap();

        let tag = a.sign(b"hello", None).unwrap();
        assert!(b.verify(b"hello", &tag, None));
    }

    #[test]
    fn test_different_key_slot_fails() {
        let a = test_signer();
        let b = AtshaSigner::new(Box::new(MockElement::new([7u8; 32], SERIAL)), 1).unwrap();
        let tag = a.sign(b"hello", None).unwrap();
        assert!(!b.verify(b"hello", &tag, None));
    }

    #[test]
    fn test_salt_changes_tag() {
        let signer = test_signer();
        let salt = Salt::new([0x11; SERIAL_LEN], NodeId(3));
        let tag = signer.sign(b"x", Some(&salt)).unwrap();
        assert!(signer.verify(b"x", &tag, Some(&salt)));
        assert!(!signer.verify(b"x", &tag, None));
    }

    #[test]
    fn test_serial_cached_from_element() {
        let signer = test_signer();
        assert_eq!(signer.serial(), &SERIAL);
    }

    #[test]
    fn test_nonce_draws_differ() {
        let signer = test_signer();
        let a = signer.generate_nonce().unwrap();
        let b = signer.generate_nonce().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dead_bus_sign_errors_verify_false() {
        let signer = AtshaSigner::new(Box::new(DeadElement), 0).unwrap();

        let result = signer.sign(b"x", None);
        assert!(matches!(
            result,
            Err(SigningError::SecureElement {
                kind: SecureElementErrorKind::Bus { .. }
            })
        ));

        assert!(!signer.verify(b"x", &[0u8; 32], None));

        let result = signer.generate_nonce();
        assert!(matches!(
            result,
            Err(SigningError::SecureElement {
                kind: SecureElementErrorKind::WakeFailed
            })
        ));
    }
}
