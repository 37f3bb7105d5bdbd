//! Error types for the signing subsystem.

use thiserror::Error;

use crate::protocol::NodeId;

/// Main error type for the signing subsystem.
#[derive(Error, Debug)]
pub enum SigningError {
    /// Configuration-related errors, including failure to acquire an
    /// entropy source at startup.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Transport failures reported by the link layer.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Secure element bus errors.
    #[error("Secure element error: {kind}")]
    SecureElement { kind: SecureElementErrorKind },

    /// Wire protocol errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },
}

/// Errors surfaced by the transport boundary.
///
/// The signing subsystem propagates these to the caller; retry policy
/// belongs to the transport, not here.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Send to node {dest} failed: {message}")]
    SendFailed { dest: NodeId, message: String },

    #[error("Transport unavailable: {message}")]
    Unavailable { message: String },
}

/// Secure element error kinds.
#[derive(Error, Debug)]
pub enum SecureElementErrorKind {
    #[error("Bus transaction failed: {message}")]
    Bus { message: String },

    #[error("Element did not wake")]
    WakeFailed,

    #[error("Key slot {slot} is not usable for signing")]
    InvalidKeySlot { slot: u8 },
}

/// Wire protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Frame too short: {len} bytes")]
    TruncatedFrame { len: usize },

    #[error("Unknown message kind: {kind:#04x}")]
    UnknownKind { kind: u8 },

    #[error("Nonce length {len} does not match expected {expected}")]
    BadNonceLength { len: usize, expected: usize },
}

/// Result type alias for signing operations.
pub type SigningResult<T> = Result<T, SigningError>;
