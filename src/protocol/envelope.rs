//! Wire envelope for signing protocol traffic.
//!
//! Frames are compact binary, sized for a low-bandwidth radio link:
//! ```text
//! [1 byte: kind][1 byte: flags][kind-specific body]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::NONCE_LEN;
use crate::error::{ProtocolErrorKind, SigningError};

/// Identifier of a mesh participant.
///
/// `0` is the gateway, `255` is broadcast/unassigned. Immutable once a node
/// has joined the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u8);

impl NodeId {
    /// The mesh-to-controller bridge.
    pub const GATEWAY: NodeId = NodeId(0);
    /// Broadcast destination, also used for not-yet-assigned nodes.
    pub const BROADCAST: NodeId = NodeId(255);

    pub fn is_gateway(self) -> bool {
        self == Self::GATEWAY
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for NodeId {
    fn from(id: u8) -> Self {
        NodeId(id)
    }
}

/// Sender requests that the receiver verify this message.
pub const FLAG_SIGNING_REQUIRED: u8 = 0x01;
/// The tag on this message is salted with the sender's serial and node id.
pub const FLAG_SALTED: u8 = 0x02;

const KIND_DATA: u8 = 0x00;
const KIND_NONCE_CHALLENGE: u8 = 0x01;
const KIND_SIGNED_REPLY: u8 = 0x02;

/// Frame header length: kind byte plus flags byte.
const HEADER_LEN: usize = 2;

/// A decoded wire frame.
///
/// `Data` carries an application payload. `NonceChallenge` and `SignedReply`
/// are the signing protocol's control subtypes: the challenge carries a
/// fixed-length random value, the reply carries the original application
/// payload plus its authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Data {
        signing_required: bool,
        payload: Vec<u8>,
    },
    NonceChallenge {
        nonce: [u8; NONCE_LEN],
    },
    SignedReply {
        salted: bool,
        tag: Vec<u8>,
        payload: Vec<u8>,
    },
}

impl Envelope {
    /// Serialize the envelope to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Envelope::Data {
                signing_required,
                payload,
            } => {
                let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
                out.push(KIND_DATA);
                out.push(if *signing_required {
                    FLAG_SIGNING_REQUIRED
                } else {
                    0
                });
                out.extend_from_slice(payload);
                out
            }
            Envelope::NonceChallenge { nonce } => {
                let mut out = Vec::with_capacity(HEADER_LEN + NONCE_LEN);
                out.push(KIND_NONCE_CHALLENGE);
                out.push(0);
                out.extend_from_slice(nonce);
                out
            }
            Envelope::SignedReply {
                salted,
                tag,
                payload,
            } => {
                let mut out = Vec::with_capacity(HEADER_LEN + 1 + tag.len() + payload.len());
                out.push(KIND_SIGNED_REPLY);
                out.push(if *salted { FLAG_SALTED } else { 0 });
                out.push(tag.len() as u8);
                out.extend_from_slice(tag);
                out.extend_from_slice(payload);
                out
            }
        }
    }

    /// Parse an envelope from wire bytes.
    ///
    /// Structural checks only; whether a reply's tag length matches the
    /// active backend is a policy decision made before verification, not
    /// here.
    pub fn decode(bytes: &[u8]) -> Result<Self, SigningError> {
        if bytes.len() < HEADER_LEN {
            return Err(SigningError::Protocol {
                kind: ProtocolErrorKind::TruncatedFrame { len: bytes.len() },
            });
        }

        let kind = bytes[0];
        let flags = bytes[1];
        let body = &bytes[HEADER_LEN..];

        match kind {
            KIND_DATA => Ok(Envelope::Data {
                signing_required: flags & FLAG_SIGNING_REQUIRED != 0,
                payload: body.to_vec(),
            }),
            KIND_NONCE_CHALLENGE => {
                if body.len() != NONCE_LEN {
                    return Err(SigningError::Protocol {
                        kind: ProtocolErrorKind::BadNonceLength {
                            len: body.len(),
                            expected: NONCE_LEN,
                        },
                    });
                }
                let mut nonce = [0u8; NONCE_LEN];
                nonce.copy_from_slice(body);
                Ok(Envelope::NonceChallenge { nonce })
            }
            KIND_SIGNED_REPLY => {
                if body.is_empty() {
                    return Err(SigningError::Protocol {
                        kind: ProtocolErrorKind::TruncatedFrame { len: bytes.len() },
                    });
                }
                let tag_len = body[0] as usize;
                if body.len() < 1 + tag_len {
                    return Err(SigningError::Protocol {
                        kind: ProtocolErrorKind::TruncatedFrame { len: bytes.len() },
                    });
                }
                Ok(Envelope::SignedReply {
                    salted: flags & FLAG_SALTED != 0,
                    tag: body[1..1 + tag_len].to_vec(),
                    payload: body[1 + tag_len..].to_vec(),
                })
            }
            other => Err(SigningError::Protocol {
                kind: ProtocolErrorKind::UnknownKind { kind: other },
            }),
        }
    }
}
