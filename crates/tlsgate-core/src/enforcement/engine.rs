//! Enforcement Decision Engine
//!
//! Pure functions of (phase, connection state, policy). The engine reads the
//! state it is given and never changes it; the host informs the state of
//! transitions through the tracker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tlsgate_common::{CertificateDescriptor, EnforcementDecision, Phase, PolicyConfig};
use tracing::{debug, warn};

use super::certificate::{validate, ValidationResult};
use super::state::ConnectionState;

/// What the host should advertise in its EHLO response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Advertisement {
    /// Include STARTTLS in the capability list
    pub starttls: bool,
    /// STARTTLS must be issued before MAIL
    pub mandatory: bool,
}

/// Result of evaluating one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: EnforcementDecision,
    /// The host should attach the connection's security headers to the message
    pub attach_security_headers: bool,
}

impl Evaluation {
    fn allow() -> Self {
        Self {
            decision: EnforcementDecision::Allow,
            attach_security_headers: false,
        }
    }
}

/// Capability advertisement rule for EHLO/HELO
pub fn advertise(state: &ConnectionState, policy: &PolicyConfig) -> Advertisement {
    let starttls = policy.tls_enabled && !state.using_tls();
    let mandatory = starttls && policy.starttls_mandatory() && !state.is_private_remote();

    Advertisement {
        starttls,
        mandatory,
    }
}

/// Whether any enforcement signal asks for TLS on this connection
pub fn enforcement_required(state: &ConnectionState, policy: &PolicyConfig) -> bool {
    policy.reject_unencrypted || state.tls_required_flag() || state.starttls_required_flag()
}

/// Decide using the certificate recorded at handshake time
pub fn decide(
    phase: Phase,
    state: &ConnectionState,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Evaluation {
    decide_with_certificate(phase, state, policy, state.peer_certificate(), now)
}

/// Decide using an explicitly supplied certificate.
///
/// Once TLS is up, the protocol checked is the one reported with the
/// handshake, not the one the descriptor claims.
pub fn decide_with_certificate(
    phase: Phase,
    state: &ConnectionState,
    policy: &PolicyConfig,
    cert: Option<&CertificateDescriptor>,
    now: DateTime<Utc>,
) -> Evaluation {
    if !phase.is_protected() {
        return Evaluation::allow();
    }

    let decision = protected_decision(phase, state, policy, cert, now);
    let attach_security_headers = phase == Phase::Data && decision.is_allow();

    Evaluation {
        decision,
        attach_security_headers,
    }
}

/// The single rule shared by MAIL, RCPT and DATA
fn protected_decision(
    phase: Phase,
    state: &ConnectionState,
    policy: &PolicyConfig,
    cert: Option<&CertificateDescriptor>,
    now: DateTime<Utc>,
) -> EnforcementDecision {
    if state.is_private_remote() {
        debug!(session_id = %state.session_id(), %phase, "Private remote exempt from TLS enforcement");
        return EnforcementDecision::Allow;
    }

    if enforcement_required(state, policy) && !state.using_tls() {
        debug!(session_id = %state.session_id(), %phase, "Protected command without STARTTLS");
        return EnforcementDecision::require_starttls();
    }

    if state.using_tls() && policy.verify_certificate {
        let cert = cert.cloned().map(|mut cert| {
            if let Some(negotiated) = state.negotiated() {
                cert.negotiated_protocol = negotiated.protocol.clone();
            }
            cert
        });

        return match validate(cert.as_ref(), policy, now) {
            ValidationResult::Valid => EnforcementDecision::Allow,
            ValidationResult::Invalid(failure) => {
                warn!(
                    session_id = %state.session_id(),
                    %phase,
                    reason = failure.reason_code(),
                    "Peer certificate rejected: {}",
                    failure
                );
                EnforcementDecision::deny(failure.reason_code())
            }
        };
    }

    EnforcementDecision::Allow
}
