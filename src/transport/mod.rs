//! Transport boundary.
//!
//! The signing subsystem does not originate or interpret routing; it hands
//! opaque frames to the link layer and is fed inbound frames via
//! [`crate::gate::SigningGate::on_message`].

use crate::error::TransportError;
use crate::protocol::NodeId;

/// Outbound side of the link/routing layer.
///
/// Implementations deliver `bytes` to `dest` with whatever framing and
/// retransmission policy the link uses; none of that is visible here.
pub trait Transport {
    fn send_to_peer(&mut self, dest: NodeId, bytes: &[u8]) -> Result<(), TransportError>;
}
