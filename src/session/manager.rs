//! Per-peer verification session tracking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::crypto::{SignerBackend, NONCE_LEN};
use crate::error::SigningResult;
use crate::protocol::NodeId;
use crate::stats::SigningStats;
use crate::whitelist::Whitelist;

/// How a verification session ended.
///
/// A live session is always awaiting a reply; these are the terminal
/// outcomes, produced when the session is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResolution {
    /// The reply's tag checked out; the payload may be accepted.
    Verified,
    /// The reply was rejected.
    Failed(VerifyFailure),
    /// The reply arrived after the session's timeout window.
    TimedOut,
    /// No session was awaiting a reply from this peer.
    Unexpected,
}

/// Why a reply was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    /// Cryptographic check failed.
    TagMismatch,
    /// Tag length differs from the active backend's fixed length; rejected
    /// before any verification is attempted.
    TagLength { got: usize, expected: usize },
    /// Whitelisting is enabled here and the peer has no entry.
    NotWhitelisted,
}

/// One outstanding challenge toward a peer.
struct VerificationSession {
    peer: NodeId,
    nonce: [u8; NONCE_LEN],
    created_at: Instant,
}

/// Orchestrates the nonce challenge/reply handshake.
///
/// Holds at most one live session per peer (a new challenge supersedes the
/// old one, since a stale nonce must never validate a newer reply) and at
/// most `max_sessions` sessions in total, evicting the oldest when an
/// adversary floods challenges. Callers drive time explicitly; the manager
/// never blocks.
pub struct SessionManager {
    sessions: Vec<VerificationSession>,
    backend: Arc<dyn SignerBackend>,
    whitelist: Whitelist,
    timeout: Duration,
    max_sessions: usize,
    stats: Arc<SigningStats>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SignerBackend>,
        whitelist: Whitelist,
        timeout: Duration,
        max_sessions: usize,
        stats: Arc<SigningStats>,
    ) -> Self {
        Self {
            sessions: Vec::with_capacity(max_sessions),
            backend,
            whitelist,
            timeout,
            max_sessions,
            stats,
        }
    }

    /// Open a session toward `peer` and return the challenge nonce to send.
    ///
    /// Any prior session for the same peer is discarded, not resolved.
    /// Expired sessions are swept lazily first, so a peer whose previous
    /// session timed out is counted as a timeout rather than a supersession.
    pub fn request_challenge(
        &mut self,
        peer: NodeId,
        now: Instant,
    ) -> SigningResult<[u8; NONCE_LEN]> {
        self.sweep_timeouts(now);

        if let Some(pos) = self.sessions.iter().position(|s| s.peer == peer) {
            self.sessions.remove(pos);
            self.stats.record_superseded();
            debug!(peer = %peer, "Superseding verification session");
        }

        if self.sessions.len() >= self.max_sessions {
            // Append order is age order, so the front is the oldest.
            let evicted = self.sessions.remove(0);
            self.stats.record_evicted();
            warn!(
                peer = %evicted.peer,
                capacity = self.max_sessions,
                "Session table full, evicting oldest session"
            );
        }

        let nonce = self.backend.generate_nonce()?;
        self.sessions.push(VerificationSession {
            peer,
            nonce,
            created_at: now,
        });
        debug!(peer = %peer, live = self.sessions.len(), "Verification session opened");
        Ok(nonce)
    }

    /// Resolve the session for `peer` against a signed reply.
    ///
    /// The verified buffer is the session's nonce followed by the reply
    /// payload. The session is destroyed whatever the outcome.
    pub fn on_reply(
        &mut self,
        peer: NodeId,
        payload: &[u8],
        tag: &[u8],
        salted: bool,
        now: Instant,
    ) -> SessionResolution {
        let Some(pos) = self.sessions.iter().position(|s| s.peer == peer) else {
            self.stats.record_unexpected_reply();
            debug!(peer = %peer, "Signed reply with no session awaiting it");
            return SessionResolution::Unexpected;
        };
        let session = self.sessions.remove(pos);

        if now.duration_since(session.created_at) > self.timeout {
            self.stats.record_timed_out();
            debug!(peer = %peer, "Signed reply arrived after session timeout");
            return SessionResolution::TimedOut;
        }

        let expected_len = self.backend.tag_len();
        if tag.len() != expected_len {
            self.stats.record_tag_length_rejected();
            warn!(
                peer = %peer,
                got = tag.len(),
                expected = expected_len,
                "Rejecting reply with wrong tag length"
            );
            return SessionResolution::Failed(VerifyFailure::TagLength {
                got: tag.len(),
                expected: expected_len,
            });
        }

        let salt = if self.whitelist.is_enabled() {
            match self.whitelist.salt_for(peer) {
                Some(salt) => Some(salt),
                None => {
                    self.stats.record_whitelist_miss();
                    warn!(peer = %peer, "Peer not whitelisted, rejecting reply");
                    return SessionResolution::Failed(VerifyFailure::NotWhitelisted);
                }
            }
        } else {
            if salted {
                debug!(peer = %peer, "Peer salted its tag but whitelisting is disabled here");
            }
            None
        };

        let mut buffer = Vec::with_capacity(NONCE_LEN + payload.len());
        buffer.extend_from_slice(&session.nonce);
        buffer.extend_from_slice(payload);

        if self.backend.verify(&buffer, tag, salt.as_ref()) {
            self.stats.record_verified();
            debug!(peer = %peer, "Signed reply verified");
            SessionResolution::Verified
        } else {
            self.stats.record_tag_mismatch();
            warn!(peer = %peer, "Tag mismatch on signed reply");
            SessionResolution::Failed(VerifyFailure::TagMismatch)
        }
    }

    /// Expire sessions older than the timeout window and return their peers.
    ///
    /// Invoked periodically by the embedding loop, and lazily before a new
    /// session is created.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<NodeId> {
        let timeout = self.timeout;
        let mut expired = Vec::new();
        self.sessions.retain(|s| {
            if now.duration_since(s.created_at) >= timeout {
                expired.push(s.peer);
                false
            } else {
                true
            }
        });
        for peer in &expired {
            self.stats.record_timed_out();
            debug!(peer = %peer, "Verification session timed out");
        }
        expired
    }

    /// Number of sessions currently awaiting a reply.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Whether a session is awaiting a reply from `peer`.
    pub fn has_session(&self, peer: NodeId) -> bool {
        self.sessions.iter().any(|s| s.peer == peer)
    }
}
