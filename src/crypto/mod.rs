//! Signature backends.
//!
//! A backend produces and checks authentication tags over a byte buffer and
//! supplies the entropy for session nonces. Two interchangeable
//! implementations exist: [`SoftSigner`] (HMAC-SHA256 over a configured key)
//! and [`AtshaSigner`] (delegates to a fixed-function secure element). The
//! active backend is selected from configuration at startup; signing disabled
//! is represented by the absence of a backend.

mod atsha;
mod soft;

use std::sync::Arc;

pub use atsha::{AtshaSigner, SecureElement};
pub use soft::{SoftHmacKey, SoftSigner};

use crate::config::{BackendSelection, Settings};
use crate::error::{SigningError, SigningResult};
use crate::protocol::NodeId;

/// Length of a session nonce in bytes.
pub const NONCE_LEN: usize = 32;

/// Tag length produced by the software backend (HMAC-SHA256).
pub const SOFT_TAG_LEN: usize = 32;

/// Length of the soft HMAC key in bytes.
pub const SOFT_KEY_LEN: usize = 32;

/// Length of a device serial number in bytes.
pub const SERIAL_LEN: usize = 9;

/// Per-peer salt mixed into the authenticated buffer.
///
/// Binds a tag to a specific peer identity so a tag valid from peer A
/// cannot be replayed as if it came from peer B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt {
    serial: [u8; SERIAL_LEN],
    node: NodeId,
}

impl Salt {
    pub fn new(serial: [u8; SERIAL_LEN], node: NodeId) -> Self {
        Self { serial, node }
    }
}

/// Append `salt` to `buffer`, producing the byte sequence that is actually
/// authenticated. Salt layout is the peer serial followed by the peer id.
pub(crate) fn salted_message(buffer: &[u8], salt: Option<&Salt>) -> Vec<u8> {
    match salt {
        None => buffer.to_vec(),
        Some(salt) => {
            let mut out = Vec::with_capacity(buffer.len() + SERIAL_LEN + 1);
            out.extend_from_slice(buffer);
            out.extend_from_slice(&salt.serial);
            out.push(salt.node.0);
            out
        }
    }
}

/// A signature backend: tag production, tag checking, and nonce entropy.
pub trait SignerBackend: Send + Sync {
    /// Compute the authentication tag over `buffer`, optionally salted.
    ///
    /// Fails only on secure element bus faults; the software variant never
    /// fails.
    fn sign(&self, buffer: &[u8], salt: Option<&Salt>) -> SigningResult<Vec<u8>>;

    /// Check `tag` against `buffer`.
    ///
    /// Any mismatch, including a malformed or short tag, is reported as
    /// `false`, never as an error: a receiver must tolerate adversarial or
    /// corrupted input without faulting.
    fn verify(&self, buffer: &[u8], tag: &[u8], salt: Option<&Salt>) -> bool;

    /// Draw a fresh session nonce from the backend's entropy source.
    fn generate_nonce(&self) -> SigningResult<[u8; NONCE_LEN]>;

    /// Fixed tag length this backend produces and expects.
    fn tag_len(&self) -> usize;

    /// This node's device serial, used to salt its own outbound tags.
    fn serial(&self) -> &[u8; SERIAL_LEN];
}

/// Build the configured backend.
///
/// Returns `None` when signing is disabled. The hardware backend needs a
/// bus driver for the secure element, supplied by the embedder via
/// `element`.
pub fn build_backend(
    settings: &Settings,
    element: Option<Box<dyn SecureElement>>,
) -> SigningResult<Option<Arc<dyn SignerBackend>>> {
    match settings.backend {
        BackendSelection::None => Ok(None),
        BackendSelection::Software => {
            let (key, serial) = settings.software_identity()?;
            Ok(Some(Arc::new(SoftSigner::new(&key, serial)?)))
        }
        BackendSelection::Hardware => {
            let hardware = settings
                .hardware
                .as_ref()
                .ok_or_else(|| SigningError::Config {
                    message: "Hardware backend selected but [hardware] section is missing"
                        .to_string(),
                })?;
            let element = element.ok_or_else(|| SigningError::Config {
                message: "Hardware backend selected but no secure element was provided"
                    .to_string(),
            })?;
            Ok(Some(Arc::new(AtshaSigner::new(element, hardware.key_slot)?)))
        }
    }
}
