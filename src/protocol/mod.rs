//! Wire protocol module.
//!
//! Defines node addressing and the binary envelope exchanged during the
//! challenge/reply handshake.
//!
//! ## Wire Format
//!
//! Frames are a one-byte kind, a one-byte flag field, and a kind-specific
//! body:
//! ```text
//! [kind][flags][body]
//! ```

mod envelope;

pub use envelope::{Envelope, NodeId, FLAG_SALTED, FLAG_SIGNING_REQUIRED};
