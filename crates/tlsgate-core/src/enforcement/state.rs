//! Connection State Tracker - Per-session enforcement state
//!
//! Every flag here only ever moves from unset to set. Nothing in the public
//! API can clear `using_tls` or an enforcement flag once it is raised.

use serde::Serialize;
use std::collections::BTreeMap;
use tlsgate_common::{CertificateDescriptor, Error, PolicyConfig, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::{advertise, Advertisement};

/// Parameters negotiated by the host's TLS handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegotiatedTls {
    pub protocol: String,
    pub cipher: String,
}

/// Enforcement state owned by a single SMTP session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    session_id: Uuid,
    is_private_remote: bool,
    using_tls: bool,
    tls_required_flag: bool,
    starttls_required_flag: bool,
    tls_established_verified: bool,
    negotiated: Option<NegotiatedTls>,
    peer_certificate: Option<CertificateDescriptor>,
    security_headers: BTreeMap<String, String>,
}

impl ConnectionState {
    /// Create the state for a new connection.
    ///
    /// `remote_is_private` is the final exemption decision for this remote;
    /// see [`crate::network::is_private_remote`].
    pub fn on_connect(remote_is_private: bool, policy: &PolicyConfig) -> Self {
        let tls_required_flag = !remote_is_private && policy.reject_unencrypted;
        let session_id = Uuid::now_v7();

        debug!(
            %session_id,
            remote_is_private,
            tls_required_flag,
            "Connection state created"
        );

        Self {
            session_id,
            is_private_remote: remote_is_private,
            using_tls: false,
            tls_required_flag,
            starttls_required_flag: false,
            tls_established_verified: false,
            negotiated: None,
            peer_certificate: None,
            security_headers: security_headers(policy, remote_is_private, tls_required_flag),
        }
    }

    /// Record an EHLO/HELO capability advertisement
    pub fn on_capability_advertisement(&mut self, policy: &PolicyConfig) -> Advertisement {
        let advertisement = advertise(self, policy);

        if advertisement.mandatory && !self.starttls_required_flag {
            self.starttls_required_flag = true;
            debug!(session_id = %self.session_id, "STARTTLS advertised as mandatory");
        }

        advertisement
    }

    /// Record the completed handshake. Can happen once per session.
    ///
    /// The protocol reported with the handshake is authoritative: the
    /// recorded certificate carries it even if the descriptor said otherwise.
    pub fn on_tls_established(
        &mut self,
        protocol: &str,
        cipher: &str,
        certificate: Option<CertificateDescriptor>,
    ) -> Result<()> {
        if self.using_tls {
            return Err(Error::Sequence(format!(
                "TLS already established for session {}",
                self.session_id
            )));
        }

        let certificate = certificate.map(|mut cert| {
            if cert.negotiated_protocol != protocol {
                warn!(
                    session_id = %self.session_id,
                    handshake = protocol,
                    descriptor = %cert.negotiated_protocol,
                    "Certificate descriptor disagrees with negotiated protocol"
                );
                cert.negotiated_protocol = protocol.to_string();
            }
            cert
        });

        self.using_tls = true;
        self.negotiated = Some(NegotiatedTls {
            protocol: protocol.to_string(),
            cipher: cipher.to_string(),
        });
        self.peer_certificate = certificate;

        info!(
            session_id = %self.session_id,
            protocol,
            cipher,
            peer_cn = self
                .peer_certificate
                .as_ref()
                .and_then(|c| c.subject_common_name.as_deref())
                .unwrap_or("-"),
            "TLS established"
        );

        Ok(())
    }

    /// Record that the peer certificate passed validation after the handshake
    pub fn mark_certificate_verified(&mut self) -> Result<()> {
        if !self.using_tls {
            return Err(Error::Sequence(format!(
                "Certificate verified before TLS for session {}",
                self.session_id
            )));
        }

        self.tls_established_verified = true;
        Ok(())
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Exempt from enforcement for the whole session
    pub fn is_private_remote(&self) -> bool {
        self.is_private_remote
    }

    pub fn using_tls(&self) -> bool {
        self.using_tls
    }

    pub fn tls_required_flag(&self) -> bool {
        self.tls_required_flag
    }

    pub fn starttls_required_flag(&self) -> bool {
        self.starttls_required_flag
    }

    pub fn tls_established_verified(&self) -> bool {
        self.tls_established_verified
    }

    pub fn negotiated(&self) -> Option<&NegotiatedTls> {
        self.negotiated.as_ref()
    }

    pub fn peer_certificate(&self) -> Option<&CertificateDescriptor> {
        self.peer_certificate.as_ref()
    }

    pub fn security_headers(&self) -> &BTreeMap<String, String> {
        &self.security_headers
    }
}

/// Headers describing the enforcement applied to this connection.
///
/// Operator headers from the policy override the built-in ones.
fn security_headers(
    policy: &PolicyConfig,
    is_private_remote: bool,
    tls_required_flag: bool,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    let policy_mode = if policy.reject_unencrypted || policy.tls_required {
        "required"
    } else if policy.tls_enabled {
        "opportunistic"
    } else {
        "disabled"
    };
    headers.insert("X-TLS-Policy".to_string(), policy_mode.to_string());

    let enforcement = if is_private_remote {
        "bypass-private-network"
    } else if tls_required_flag {
        "enforced"
    } else {
        "advisory"
    };
    headers.insert("X-TLS-Enforcement".to_string(), enforcement.to_string());

    headers.extend(
        policy
            .security_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    headers
}
