//! Message signing and verification for a wireless sensor-mesh stack.
//!
//! This crate authenticates application messages exchanged over an
//! unreliable, low-bandwidth radio link so a receiver can reject forged or
//! replayed traffic. It provides the signature backends (hardware secure
//! element or software HMAC), the nonce challenge/reply handshake with
//! bounded verification sessions, per-peer whitelisting, and the policy
//! gate the mesh stack drives from its main loop.

pub mod config;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod protocol;
pub mod session;
pub mod stats;
pub mod transport;
pub mod whitelist;
