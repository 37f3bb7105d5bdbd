//! Per-peer whitelist used to salt authentication tags.
//!
//! When whitelisting is active, a verifier only accepts peers it holds an
//! expected serial for, and the expected tag is salted with that serial and
//! the peer id. Enforcement is one-sided: a verifier without a whitelist
//! accepts unsalted tags from any peer, which allows rolling whitelisting
//! out across a mesh one node at a time.

use crate::crypto::{Salt, SERIAL_LEN};
use crate::error::{SigningError, SigningResult};
use crate::protocol::NodeId;

/// Upper bound on whitelist entries; the table is populated once at startup
/// and sized for a small mesh.
pub const MAX_WHITELIST_ENTRIES: usize = 32;

/// Expected identity of a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhitelistEntry {
    pub node_id: NodeId,
    pub serial: [u8; SERIAL_LEN],
}

/// Fixed-capacity table mapping peer id to expected serial.
///
/// Read-only after construction. An empty table means whitelisting is
/// disabled on this node.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    /// Build a whitelist from configured entries.
    ///
    /// Rejects duplicate node ids and tables over capacity; both are
    /// configuration errors, not runtime conditions.
    pub fn new(entries: Vec<WhitelistEntry>) -> SigningResult<Self> {
        if entries.len() > MAX_WHITELIST_ENTRIES {
            return Err(SigningError::Config {
                message: format!(
                    "Whitelist has {} entries, maximum is {}",
                    entries.len(),
                    MAX_WHITELIST_ENTRIES
                ),
            });
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.node_id == entry.node_id) {
                return Err(SigningError::Config {
                    message: format!("Duplicate whitelist entry for node {}", entry.node_id),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Whether whitelisting is active on this node.
    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Expected serial for `node`, if present.
    pub fn lookup(&self, node: NodeId) -> Option<&[u8; SERIAL_LEN]> {
        self.entries
            .iter()
            .find(|e| e.node_id == node)
            .map(|e| &e.serial)
    }

    /// Salt to apply when verifying traffic from `node`.
    pub fn salt_for(&self, node: NodeId) -> Option<Salt> {
        self.lookup(node).map(|serial| Salt::new(*serial, node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
