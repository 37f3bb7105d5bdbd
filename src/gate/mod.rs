//! Signing gate: per-message signing policy.
//!
//! The gate decides whether an outbound message must be signed and whether
//! an inbound message is routed through the challenge/reply handshake or
//! delivered directly. It owns the session manager, the sender-side pending
//! payload slots, and the shared counters.
//!
//! Sender flow: a message that must be signed goes out flagged, its payload
//! parked per destination. The receiver answers with a nonce challenge; the
//! gate then signs `nonce ‖ payload` synchronously and emits the signed
//! reply. Receiver flow is the mirror image, ending in
//! [`InboundAction::Deliver`] only after the tag checks out.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::Settings;
use crate::crypto::{build_backend, Salt, SecureElement, SignerBackend, NONCE_LEN};
use crate::error::SigningResult;
use crate::protocol::{Envelope, NodeId};
use crate::session::{SessionManager, SessionResolution, VerifyFailure};
use crate::stats::SigningStats;
use crate::transport::Transport;

/// What the embedding stack should do with an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAction {
    /// Payload accepted for application delivery.
    Deliver(Vec<u8>),
    /// Control traffic consumed by the handshake; nothing to deliver.
    Handled,
    /// Frame discarded; the reason is recorded in the counters too.
    Dropped(DropReason),
}

/// Why an inbound frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Unsigned data while this node requires signatures.
    UnsignedRequired,
    /// The signed reply failed verification.
    VerificationFailed(VerifyFailure),
    /// The signed reply arrived after the session timeout.
    TimedOut,
    /// A signed reply with no session awaiting it.
    UnexpectedReply,
    /// A nonce challenge with no outbound payload pending.
    NoPendingPayload,
    /// Handshake traffic while signing is disabled locally.
    SigningDisabled,
}

/// Policy layer in front of the signature backend and session manager.
pub struct SigningGate {
    local_id: NodeId,
    backend: Option<Arc<dyn SignerBackend>>,
    sessions: Option<SessionManager>,
    /// Outbound payloads parked per destination until the challenge lands.
    /// Last write wins, mirroring session supersession.
    pending: Vec<(NodeId, Vec<u8>)>,
    max_pending: usize,
    sign_outbound: bool,
    request_signatures: bool,
    whitelisting: bool,
    peers_requiring: Vec<NodeId>,
    stats: Arc<SigningStats>,
}

impl SigningGate {
    /// Build the gate from validated settings.
    ///
    /// The hardware backend needs the embedder's secure element driver via
    /// `element`; pass `None` for the software backend or disabled signing.
    pub fn new(
        settings: &Settings,
        element: Option<Box<dyn SecureElement>>,
    ) -> SigningResult<Self> {
        let stats = Arc::new(SigningStats::default());
        let whitelist = settings.whitelist_table()?;
        let whitelisting = whitelist.is_enabled();
        let backend = build_backend(settings, element)?;
        let sessions = backend.as_ref().map(|backend| {
            SessionManager::new(
                Arc::clone(backend),
                whitelist,
                settings.timeout(),
                settings.max_sessions,
                Arc::clone(&stats),
            )
        });

        Ok(Self {
            local_id: settings.node_id,
            backend,
            sessions,
            pending: Vec::new(),
            max_pending: settings.max_sessions,
            sign_outbound: settings.sign_outbound,
            request_signatures: settings.request_signatures,
            whitelisting,
            peers_requiring: Vec::new(),
            stats,
        })
    }

    /// Hand an outbound payload to the transport, signed if policy says so.
    ///
    /// Broadcast destinations are never signed; the handshake needs a
    /// single replying peer.
    pub fn send<T: Transport>(
        &mut self,
        transport: &mut T,
        dest: NodeId,
        payload: &[u8],
    ) -> SigningResult<()> {
        let signing_required = self.should_sign_to(dest);
        if signing_required {
            self.stash_pending(dest, payload);
            debug!(dest = %dest, "Outbound payload parked for signature handshake");
        }
        let frame = Envelope::Data {
            signing_required,
            payload: payload.to_vec(),
        }
        .encode();
        transport.send_to_peer(dest, &frame)?;
        Ok(())
    }

    /// Process one inbound frame from `from`.
    pub fn on_message<T: Transport>(
        &mut self,
        transport: &mut T,
        from: NodeId,
        bytes: &[u8],
        now: Instant,
    ) -> SigningResult<InboundAction> {
        match Envelope::decode(bytes)? {
            Envelope::Data {
                signing_required,
                payload,
            } => self.on_data(transport, from, signing_required, payload, now),
            Envelope::NonceChallenge { nonce } => self.answer_challenge(transport, from, nonce),
            Envelope::SignedReply {
                salted,
                tag,
                payload,
            } => self.on_signed_reply(from, salted, tag, payload, now),
        }
    }

    /// Expire overdue verification sessions; returns the peers affected.
    pub fn sweep_timeouts(&mut self, now: Instant) -> Vec<NodeId> {
        match self.sessions.as_mut() {
            Some(sessions) => sessions.sweep_timeouts(now),
            None => Vec::new(),
        }
    }

    /// Record that `peer` asked for its inbound traffic to be signed, so
    /// this node signs toward it even when global outbound signing is off.
    pub fn note_peer_requires_signatures(&mut self, peer: NodeId) {
        if !self.peers_requiring.contains(&peer) {
            self.peers_requiring.push(peer);
        }
    }

    /// Whether a signature backend is configured.
    pub fn signing_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether a verification session is awaiting a reply from `peer`.
    pub fn has_session(&self, peer: NodeId) -> bool {
        self.sessions
            .as_ref()
            .is_some_and(|sessions| sessions.has_session(peer))
    }

    /// Shared verification counters.
    pub fn stats(&self) -> &SigningStats {
        &self.stats
    }

    fn on_data<T: Transport>(
        &mut self,
        transport: &mut T,
        from: NodeId,
        signing_required: bool,
        payload: Vec<u8>,
        now: Instant,
    ) -> SigningResult<InboundAction> {
        if signing_required {
            let Some(sessions) = self.sessions.as_mut() else {
                debug!(peer = %from, "Signing requested but no backend configured, accepting");
                return Ok(InboundAction::Deliver(payload));
            };
            let nonce = sessions.request_challenge(from, now)?;
            transport.send_to_peer(from, &Envelope::NonceChallenge { nonce }.encode())?;
            debug!(peer = %from, "Issued nonce challenge");
            return Ok(InboundAction::Handled);
        }

        if self.request_signatures && self.backend.is_some() {
            self.stats.record_dropped_unsigned();
            warn!(peer = %from, "Dropping unsigned message, signatures are required");
            return Ok(InboundAction::Dropped(DropReason::UnsignedRequired));
        }

        Ok(InboundAction::Deliver(payload))
    }

    fn answer_challenge<T: Transport>(
        &mut self,
        transport: &mut T,
        from: NodeId,
        nonce: [u8; NONCE_LEN],
    ) -> SigningResult<InboundAction> {
        let Some(backend) = self.backend.clone() else {
            debug!(peer = %from, "Nonce challenge but signing is disabled");
            return Ok(InboundAction::Dropped(DropReason::SigningDisabled));
        };
        let Some(payload) = self.take_pending(from) else {
            debug!(peer = %from, "Nonce challenge with no pending payload");
            return Ok(InboundAction::Dropped(DropReason::NoPendingPayload));
        };

        let mut buffer = Vec::with_capacity(NONCE_LEN + payload.len());
        buffer.extend_from_slice(&nonce);
        buffer.extend_from_slice(&payload);

        let salt = if self.whitelisting {
            Some(Salt::new(*backend.serial(), self.local_id))
        } else {
            None
        };
        let tag = backend.sign(&buffer, salt.as_ref())?;

        let frame = Envelope::SignedReply {
            salted: salt.is_some(),
            tag,
            payload,
        }
        .encode();
        transport.send_to_peer(from, &frame)?;
        debug!(peer = %from, "Answered nonce challenge with signed reply");
        Ok(InboundAction::Handled)
    }

    fn on_signed_reply(
        &mut self,
        from: NodeId,
        salted: bool,
        tag: Vec<u8>,
        payload: Vec<u8>,
        now: Instant,
    ) -> SigningResult<InboundAction> {
        let Some(sessions) = self.sessions.as_mut() else {
            debug!(peer = %from, "Signed reply but signing is disabled");
            return Ok(InboundAction::Dropped(DropReason::SigningDisabled));
        };
        let action = match sessions.on_reply(from, &payload, &tag, salted, now) {
            SessionResolution::Verified => InboundAction::Deliver(payload),
            SessionResolution::Failed(failure) => {
                InboundAction::Dropped(DropReason::VerificationFailed(failure))
            }
            SessionResolution::TimedOut => InboundAction::Dropped(DropReason::TimedOut),
            SessionResolution::Unexpected => InboundAction::Dropped(DropReason::UnexpectedReply),
        };
        Ok(action)
    }

    fn should_sign_to(&self, dest: NodeId) -> bool {
        self.backend.is_some()
            && !dest.is_broadcast()
            && (self.sign_outbound || self.peers_requiring.contains(&dest))
    }

    fn stash_pending(&mut self, dest: NodeId, payload: &[u8]) {
        if let Some(slot) = self.pending.iter_mut().find(|(peer, _)| *peer == dest) {
            slot.1 = payload.to_vec();
            return;
        }
        if self.pending.len() >= self.max_pending {
            let (evicted, _) = self.pending.remove(0);
            debug!(dest = %evicted, "Pending payload slot evicted");
        }
        self.pending.push((dest, payload.to_vec()));
    }

    fn take_pending(&mut self, dest: NodeId) -> Option<Vec<u8>> {
        let pos = self.pending.iter().position(|(peer, _)| *peer == dest)?;
        Some(self.pending.remove(pos).1)
    }
}
