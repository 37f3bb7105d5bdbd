//! Configuration settings for the signing subsystem.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::crypto::{SoftHmacKey, SERIAL_LEN, SOFT_KEY_LEN};
use crate::error::{SigningError, SigningResult};
use crate::protocol::NodeId;
use crate::whitelist::{Whitelist, WhitelistEntry};

/// Main configuration structure for the signing subsystem.
///
/// Built once at startup and passed in by value; nothing here is mutated at
/// runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// This node's address on the mesh.
    pub node_id: NodeId,
    /// Which signature backend to use.
    #[serde(default)]
    pub backend: BackendSelection,
    /// Maximum lifetime of a verification session in milliseconds.
    #[serde(default = "default_verification_timeout_ms")]
    pub verification_timeout_ms: u64,
    /// Whether this node asks peers to sign traffic addressed to it.
    #[serde(default)]
    pub request_signatures: bool,
    /// Whether outbound traffic is signed regardless of per-peer requests.
    #[serde(default)]
    pub sign_outbound: bool,
    /// Capacity of the verification session table.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Software backend identity.
    #[serde(default)]
    pub software: Option<SoftwareConfig>,
    /// Hardware backend addressing.
    #[serde(default)]
    pub hardware: Option<HardwareConfig>,
    /// Per-peer whitelist; a non-empty list enables whitelisting.
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntryConfig>,
}

/// Signature backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    Hardware,
    Software,
    #[default]
    None,
}

/// Software backend identity: HMAC key and device serial, hex-encoded.
#[derive(Clone, Deserialize)]
pub struct SoftwareConfig {
    /// 32-byte HMAC key, hex-encoded. Never logged.
    #[serde(default = "default_soft_hmac_key")]
    pub hmac_key: String,
    /// 9-byte device serial, hex-encoded.
    #[serde(default = "default_soft_serial")]
    pub serial: String,
}

impl fmt::Debug for SoftwareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareConfig")
            .field("hmac_key", &"<redacted>")
            .field("serial", &self.serial)
            .finish()
    }
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self {
            hmac_key: default_soft_hmac_key(),
            serial: default_soft_serial(),
        }
    }
}

/// Hardware backend addressing.
#[derive(Debug, Clone, Deserialize)]
pub struct HardwareConfig {
    /// Secure element key slot holding the signing key.
    #[serde(default)]
    pub key_slot: u8,
}

/// One configured whitelist entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistEntryConfig {
    pub node_id: NodeId,
    /// Expected 9-byte peer serial, hex-encoded.
    pub serial: String,
}

// Default value functions

fn default_verification_timeout_ms() -> u64 {
    5000
}

fn default_max_sessions() -> usize {
    8
}

fn default_soft_hmac_key() -> String {
    "0".repeat(SOFT_KEY_LEN * 2)
}

fn default_soft_serial() -> String {
    "010203040506070809".to_string()
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> SigningResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SigningError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml(content: &str) -> SigningResult<Self> {
        let settings: Settings = toml::from_str(content).map_err(|e| SigningError::Config {
            message: format!("Failed to parse configuration: {}", e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// Key material and whitelist serials are parsed here so a bad value
    /// fails startup instead of the first signed exchange.
    pub fn validate(&self) -> SigningResult<()> {
        if self.node_id == NodeId::BROADCAST {
            return Err(SigningError::Config {
                message: format!("node_id {} is reserved for broadcast", NodeId::BROADCAST),
            });
        }

        if self.verification_timeout_ms == 0 {
            return Err(SigningError::Config {
                message: "verification_timeout_ms must be greater than zero".to_string(),
            });
        }

        if self.max_sessions == 0 {
            return Err(SigningError::Config {
                message: "max_sessions must be at least 1".to_string(),
            });
        }

        if self.backend == BackendSelection::Software {
            let (key, _) = self.software_identity()?;
            if key.0 == [0u8; SOFT_KEY_LEN] {
                warn!("Soft HMAC key is the all-zero default; set a real key for production");
            }
        }

        self.whitelist_table()?;

        Ok(())
    }

    /// Session timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    /// Parsed software identity, falling back to the stock defaults when the
    /// `[software]` section is omitted.
    pub fn software_identity(&self) -> SigningResult<(SoftHmacKey, [u8; SERIAL_LEN])> {
        let software = self.software.clone().unwrap_or_default();
        let key: [u8; SOFT_KEY_LEN] = parse_hex_array("software.hmac_key", &software.hmac_key)?;
        let serial: [u8; SERIAL_LEN] = parse_hex_array("software.serial", &software.serial)?;
        Ok((SoftHmacKey::from(key), serial))
    }

    /// Parsed whitelist table.
    pub fn whitelist_table(&self) -> SigningResult<Whitelist> {
        let mut entries = Vec::with_capacity(self.whitelist.len());
        for entry in &self.whitelist {
            entries.push(WhitelistEntry {
                node_id: entry.node_id,
                serial: parse_hex_array("whitelist.serial", &entry.serial)?,
            });
        }
        Whitelist::new(entries)
    }
}

/// Decode a hex string into a fixed-length byte array.
fn parse_hex_array<const N: usize>(field: &str, value: &str) -> SigningResult<[u8; N]> {
    let bytes = hex::decode(value).map_err(|e| SigningError::Config {
        message: format!("Invalid hex in {}: {}", field, e),
    })?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| SigningError::Config {
        message: format!("{} must be {} bytes, got {}", field, N, len),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let settings = Settings::from_toml("node_id = 1").unwrap();
        assert_eq!(settings.node_id, NodeId(1));
        assert_eq!(settings.backend, BackendSelection::None);
        assert_eq!(settings.verification_timeout_ms, 5000);
        assert_eq!(settings.max_sessions, 8);
        assert!(!settings.request_signatures);
        assert!(!settings.sign_outbound);
        assert!(settings.whitelist.is_empty());
    }

    #[test]
    fn test_full_software_config() {
        let settings = Settings::from_toml(
            r#"
            node_id = 1
            backend = "software"
            verification_timeout_ms = 2500
            request_signatures = true
            sign_outbound = true

            [software]
            hmac_key = "aa00000000000000000000000000000000000000000000000000000000000000"
            serial = "010203040506070809"

            [[whitelist]]
            node_id = 0
            serial = "090807060504030201"
            "#,
        )
        .unwrap();

        assert_eq!(settings.backend, BackendSelection::Software);
        assert_eq!(settings.timeout(), Duration::from_millis(2500));

        let (key, serial) = settings.software_identity().unwrap();
        assert_eq!(key.0[0], 0xAA);
        assert_eq!(serial, [1, 2, 3, 4, 5, 6, 7, 8, 9]);

        let whitelist = settings.whitelist_table().unwrap();
        assert_eq!(
            whitelist.lookup(NodeId::GATEWAY),
            Some(&[9, 8, 7, 6, 5, 4, 3, 2, 1])
        );
    }

    #[test]
    fn test_software_defaults_when_section_omitted() {
        let settings = Settings::from_toml("node_id = 1\nbackend = \"software\"").unwrap();
        let (key, serial) = settings.software_identity().unwrap();
        assert_eq!(key.0, [0u8; SOFT_KEY_LEN]);
        assert_eq!(serial, [1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_bad_key_length_rejected() {
        let result = Settings::from_toml(
            "node_id = 1\nbackend = \"software\"\n[software]\nhmac_key = \"aabb\"",
        );
        assert!(matches!(result, Err(SigningError::Config { .. })));
    }

    #[test]
    fn test_bad_hex_rejected() {
        let result = Settings::from_toml(
            "node_id = 1\nbackend = \"software\"\n[software]\nserial = \"not hex!\"",
        );
        assert!(matches!(result, Err(SigningError::Config { .. })));
    }

    #[test]
    fn test_broadcast_node_id_rejected() {
        let result = Settings::from_toml("node_id = 255");
        assert!(matches!(result, Err(SigningError::Config { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Settings::from_toml("node_id = 1\nverification_timeout_ms = 0");
        assert!(matches!(result, Err(SigningError::Config { .. })));
    }

    #[test]
    fn test_duplicate_whitelist_entry_rejected() {
        let result = Settings::from_toml(
            r#"
            node_id = 1

            [[whitelist]]
            node_id = 2
            serial = "010203040506070809"

            [[whitelist]]
            node_id = 2
            serial = "090807060504030201"
            "#,
        );
        assert!(matches!(result, Err(SigningError::Config { .. })));
    }

    #[test]
    fn test_software_config_debug_redacts_key() {
        let settings = Settings::from_toml(
            "node_id = 1\n[software]\nhmac_key = \"ff00000000000000000000000000000000000000000000000000000000000000\"",
        )
        .unwrap();
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("ff00"));
        assert!(printed.contains("<redacted>"));
    }
}
