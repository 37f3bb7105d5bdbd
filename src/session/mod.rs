//! Verification session management.
//!
//! Owns the per-peer challenge/reply state machine and its timeout
//! enforcement. The mesh transport gives no delivery guarantee and
//! multi-hop relay adds variable latency, so every session carries a
//! bounded lifetime; an unbounded wait would leak state under packet loss.

mod manager;

pub use manager::{SessionManager, SessionResolution, VerifyFailure};
