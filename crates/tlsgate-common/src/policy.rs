//! TLS enforcement policy model
//!
//! A [`PolicyConfig`] is parsed from a flat TOML document, normalized and
//! validated before it is ever handed to the enforcement engine. Every field
//! that is missing from the document takes its secure-by-default value.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Protocol versions the policy model understands
pub const KNOWN_PROTOCOLS: &[&str] = &["SSLv3", "TLSv1", "TLSv1.1", "TLSv1.2", "TLSv1.3"];

/// Protocol versions allowed by the fail-closed default policy
pub const MODERN_PROTOCOLS: &[&str] = &["TLSv1.2", "TLSv1.3"];

/// Smallest key size accepted by the fail-closed default policy
pub const SECURE_MINIMUM_KEY_SIZE_BITS: u32 = 2048;

/// TLS enforcement policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Offer STARTTLS at all
    #[serde(default = "default_true")]
    pub tls_enabled: bool,

    /// STARTTLS is advertised as mandatory
    #[serde(default = "default_true")]
    pub tls_required: bool,

    /// Accepted protocol versions, e.g. `TLSv1.2`
    #[serde(default = "default_allowed_protocols")]
    pub allowed_protocols: BTreeSet<String>,

    /// Cipher suites in preference order
    #[serde(default = "default_cipher_suites")]
    pub cipher_suites: Vec<String>,

    /// Prefer the server's cipher order over the client's
    #[serde(default = "default_true")]
    pub honor_cipher_order: bool,

    /// Validate the peer certificate on protected commands
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    #[serde(default = "default_minimum_key_size_bits")]
    pub minimum_key_size_bits: u32,

    /// Refuse MAIL/RCPT/DATA over plaintext from public remotes
    #[serde(default = "default_true")]
    pub reject_unencrypted: bool,

    /// Exempt private/internal remotes from enforcement
    #[serde(default)]
    pub bypass_for_private_networks: bool,

    /// Additional networks classified as private
    #[serde(default)]
    pub private_networks: Vec<IpNet>,

    /// Extra headers attached to accepted messages
    #[serde(default)]
    pub security_headers: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_allowed_protocols() -> BTreeSet<String> {
    MODERN_PROTOCOLS.iter().map(|p| p.to_string()).collect()
}

fn default_cipher_suites() -> Vec<String> {
    [
        "TLS13_AES_256_GCM_SHA384",
        "TLS13_AES_128_GCM_SHA256",
        "TLS13_CHACHA20_POLY1305_SHA256",
        "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_minimum_key_size_bits() -> u32 {
    SECURE_MINIMUM_KEY_SIZE_BITS
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::secure_default()
    }
}

impl PolicyConfig {
    /// The fail-closed policy used whenever no valid policy can be loaded
    pub fn secure_default() -> Self {
        Self {
            tls_enabled: true,
            tls_required: true,
            allowed_protocols: default_allowed_protocols(),
            cipher_suites: default_cipher_suites(),
            honor_cipher_order: true,
            verify_certificate: true,
            minimum_key_size_bits: SECURE_MINIMUM_KEY_SIZE_BITS,
            reject_unencrypted: true,
            bypass_for_private_networks: false,
            private_networks: Vec::new(),
            security_headers: BTreeMap::new(),
        }
    }

    /// Parse, normalize and validate a policy document
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let policy: PolicyConfig = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse policy: {}", e)))?;

        let policy = policy.normalize();
        policy.validate()?;
        Ok(policy)
    }

    /// Resolve contradictory flags toward the stricter reading.
    ///
    /// Requiring TLS (or rejecting plaintext) while not offering it cannot be
    /// enforced, so TLS is switched on rather than silently dropped.
    pub fn normalize(mut self) -> Self {
        if self.tls_required && !self.tls_enabled {
            warn!("Policy sets tls_required without tls_enabled; enabling TLS");
            self.tls_enabled = true;
        }

        if self.reject_unencrypted && !self.tls_enabled {
            warn!("Policy sets reject_unencrypted without tls_enabled; enabling TLS");
            self.tls_enabled = true;
        }

        let mut protocols = BTreeSet::new();
        for protocol in &self.allowed_protocols {
            match canonical_protocol(protocol) {
                Some(canonical) => {
                    protocols.insert(canonical.to_string());
                }
                // Left as-is so validate() reports it
                None => {
                    protocols.insert(protocol.clone());
                }
            }
        }
        self.allowed_protocols = protocols;

        self
    }

    /// Check invariants that normalization cannot repair
    pub fn validate(&self) -> crate::Result<()> {
        if self.tls_required && !self.tls_enabled {
            return Err(crate::Error::Config(
                "tls_required is set but tls_enabled is not".to_string(),
            ));
        }

        for protocol in &self.allowed_protocols {
            if !KNOWN_PROTOCOLS.contains(&protocol.as_str()) {
                return Err(crate::Error::Config(format!(
                    "Unknown protocol version in allowed_protocols: {}",
                    protocol
                )));
            }
        }

        if self.verify_certificate && self.allowed_protocols.is_empty() {
            return Err(crate::Error::Config(
                "allowed_protocols is empty while verify_certificate is set".to_string(),
            ));
        }

        for name in self.security_headers.keys() {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
                return Err(crate::Error::Config(format!(
                    "Invalid security header name: {:?}",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Whether a negotiated protocol version is on the allow-list
    pub fn allows_protocol(&self, negotiated: &str) -> bool {
        canonical_protocol(negotiated)
            .map(|p| self.allowed_protocols.contains(p))
            .unwrap_or(false)
    }

    /// Whether STARTTLS is advertised as mandatory
    pub fn starttls_mandatory(&self) -> bool {
        self.tls_enabled && self.tls_required
    }
}

/// Map a protocol name to its canonical spelling.
///
/// Accepts the OpenSSL style (`TLSv1.2`), the rustls debug style (`TLSv1_2`)
/// and any letter case.
pub fn canonical_protocol(name: &str) -> Option<&'static str> {
    let normalized = name.trim().replace('_', ".").to_ascii_lowercase();
    KNOWN_PROTOCOLS
        .iter()
        .find(|known| known.to_ascii_lowercase() == normalized)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_secure_default() {
        let policy = PolicyConfig::secure_default();
        assert!(policy.tls_enabled);
        assert!(policy.tls_required);
        assert!(policy.verify_certificate);
        assert!(policy.reject_unencrypted);
        assert!(!policy.bypass_for_private_networks);
        assert!(policy.minimum_key_size_bits >= 2048);
        assert_eq!(
            policy.allowed_protocols.iter().cloned().collect::<Vec<_>>(),
            vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()]
        );
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_starttls_mandatory_follows_tls_required() {
        let mut policy = PolicyConfig::secure_default();
        assert!(policy.starttls_mandatory());

        // reject_unencrypted enforces through tls_required_flag, not the advertisement
        policy.tls_required = false;
        assert!(policy.reject_unencrypted);
        assert!(!policy.starttls_mandatory());

        policy.tls_required = true;
        policy.tls_enabled = false;
        assert!(!policy.starttls_mandatory());
    }

    #[test]
    fn test_missing_fields_take_secure_defaults() {
        let policy = PolicyConfig::from_toml_str("bypass_for_private_networks = true\n").unwrap();
        assert!(policy.bypass_for_private_networks);
        assert!(policy.tls_required);
        assert_eq!(policy.minimum_key_size_bits, 2048);
        assert_eq!(policy.cipher_suites.len(), 9);
    }

    #[test]
    fn test_parse_policy() {
        let toml = r#"
tls_enabled = true
tls_required = false
allowed_protocols = ["tlsv1.3", "TLSv1_2"]
cipher_suites = ["TLS13_AES_128_GCM_SHA256"]
honor_cipher_order = false
verify_certificate = true
minimum_key_size_bits = 3072
reject_unencrypted = true
bypass_for_private_networks = true
private_networks = ["203.0.113.0/24"]

[security_headers]
X-TLS-Policy = "enforced"
"#;

        let policy = PolicyConfig::from_toml_str(toml).unwrap();
        assert!(!policy.tls_required);
        assert!(policy.allows_protocol("TLSv1.2"));
        assert!(policy.allows_protocol("TLSv1_3"));
        assert!(!policy.allows_protocol("TLSv1.1"));
        assert_eq!(policy.minimum_key_size_bits, 3072);
        assert_eq!(policy.private_networks.len(), 1);
        assert_eq!(
            policy.security_headers.get("X-TLS-Policy").map(String::as_str),
            Some("enforced")
        );
    }

    #[test]
    fn test_tls_required_without_enabled_is_normalized() {
        let policy =
            PolicyConfig::from_toml_str("tls_enabled = false\ntls_required = true\n").unwrap();
        assert!(policy.tls_enabled);
        assert!(policy.tls_required);
    }

    #[test]
    fn test_reject_unencrypted_without_enabled_is_normalized() {
        let toml = "tls_enabled = false\ntls_required = false\nreject_unencrypted = true\n";
        let policy = PolicyConfig::from_toml_str(toml).unwrap();
        assert!(policy.tls_enabled);
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let err = PolicyConfig::from_toml_str("allowed_protocols = [\"TLSv9\"]\n").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_empty_protocols_with_verification_rejected() {
        let err = PolicyConfig::from_toml_str("allowed_protocols = []\n").unwrap_err();
        assert!(err.to_string().contains("allowed_protocols is empty"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(PolicyConfig::from_toml_str("tls_requird = false\n").is_err());
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let toml = "[security_headers]\n\"Bad Header\" = \"x\"\n";
        assert!(PolicyConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_canonical_protocol() {
        assert_eq!(canonical_protocol("TLSv1.3"), Some("TLSv1.3"));
        assert_eq!(canonical_protocol("tlsv1_1"), Some("TLSv1.1"));
        assert_eq!(canonical_protocol("TLSv1"), Some("TLSv1"));
        assert_eq!(canonical_protocol("QUIC"), None);
    }
}
