//! Error types for the signing subsystem.
//!
//! Provides a unified error handling system using thiserror.
//!
//! Verification failures are deliberately not errors here: a tag mismatch or
//! a timed-out session is ordinary data on a lossy, untrusted mesh and is
//! reported through [`crate::session::SessionResolution`] instead.

mod types;

pub use types::*;
