//! Protocol hook boundary
//!
//! [`EnforcementSession`] is what a mail-transport host embeds per
//! connection. The host reports each SMTP phase as a [`PhaseEvent`] and turns
//! the returned [`HookOutcome`] into its protocol response.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tlsgate_common::{CertificateDescriptor, EnforcementDecision, Phase, Result, SmtpReply};
use tracing::{debug, error, warn};

use super::certificate::{validate, ValidationResult};
use super::engine::decide;
use super::state::ConnectionState;
use crate::metrics::EnforcementMetrics;
use crate::network::is_private_remote;
use crate::policy::PolicyStore;

/// Reason reported when the engine itself fails
pub const INTERNAL_ERROR_REASON: &str = "internal-error";

/// Phase event reported by the host after `Connect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    Ehlo {
        helo: String,
    },
    Helo {
        helo: String,
    },
    TlsEstablished {
        protocol: String,
        cipher: String,
        certificate: Option<CertificateDescriptor>,
    },
    Mail,
    Rcpt,
    Data,
}

impl PhaseEvent {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseEvent::Ehlo { .. } => Phase::Ehlo,
            PhaseEvent::Helo { .. } => Phase::Helo,
            PhaseEvent::TlsEstablished { .. } => Phase::TlsEstablished,
            PhaseEvent::Mail => Phase::Mail,
            PhaseEvent::Rcpt => Phase::Rcpt,
            PhaseEvent::Data => Phase::Data,
        }
    }
}

/// Everything the host needs to answer a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookOutcome {
    pub decision: EnforcementDecision,
    /// Include STARTTLS in the EHLO capability list
    pub advertise_starttls: bool,
    /// Headers to attach to the accepted message (DATA only)
    pub security_headers: Option<BTreeMap<String, String>>,
}

impl HookOutcome {
    fn allow() -> Self {
        Self {
            decision: EnforcementDecision::Allow,
            advertise_starttls: false,
            security_headers: None,
        }
    }

    fn decision(decision: EnforcementDecision) -> Self {
        Self {
            decision,
            advertise_starttls: false,
            security_headers: None,
        }
    }

    /// SMTP reply replacing the host's normal answer, if any
    pub fn reply(&self) -> Option<SmtpReply> {
        self.decision.smtp_reply()
    }
}

/// Enforcement driver for one SMTP connection
pub struct EnforcementSession {
    store: Arc<PolicyStore>,
    state: ConnectionState,
    metrics: Option<Arc<EnforcementMetrics>>,
}

impl EnforcementSession {
    /// Start a session for a remote the host has already classified.
    ///
    /// A private remote is exempt from enforcement for the whole session.
    pub fn connect(store: Arc<PolicyStore>, remote_is_private: bool) -> Self {
        let snapshot = store.current();
        let state = ConnectionState::on_connect(remote_is_private, &snapshot.policy);

        debug!(
            session_id = %state.session_id(),
            policy_version = snapshot.version,
            "Enforcement session started"
        );

        Self {
            store,
            state,
            metrics: None,
        }
    }

    /// Start a session classifying the remote address against the policy.
    ///
    /// Private ranges only count when `bypass_for_private_networks` is set.
    pub fn connect_addr(store: Arc<PolicyStore>, remote: IpAddr) -> Self {
        let remote_is_private = is_private_remote(remote, &store.current().policy);
        Self::connect(store, remote_is_private)
    }

    pub fn with_metrics(mut self, metrics: Arc<EnforcementMetrics>) -> Self {
        metrics.record_decision(Phase::Connect, &EnforcementDecision::Allow);
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Apply a phase event and return the host-facing outcome.
    ///
    /// Each call evaluates against the policy snapshot current at that moment.
    pub fn handle(&mut self, event: PhaseEvent, now: DateTime<Utc>) -> Result<HookOutcome> {
        let snapshot = self.store.current();
        let policy = &snapshot.policy;
        let phase = event.phase();

        let outcome = match event {
            PhaseEvent::Ehlo { helo } | PhaseEvent::Helo { helo } => {
                let advertisement = self.state.on_capability_advertisement(policy);
                debug!(
                    session_id = %self.state.session_id(),
                    %helo,
                    starttls = advertisement.starttls,
                    mandatory = advertisement.mandatory,
                    "Capabilities advertised"
                );
                HookOutcome {
                    advertise_starttls: advertisement.starttls,
                    ..HookOutcome::allow()
                }
            }

            PhaseEvent::TlsEstablished {
                protocol,
                cipher,
                certificate,
            } => {
                self.state
                    .on_tls_established(&protocol, &cipher, certificate)?;

                if policy.verify_certificate {
                    match validate(self.state.peer_certificate(), policy, now) {
                        ValidationResult::Valid => self.state.mark_certificate_verified()?,
                        // Enforced on the next protected command
                        ValidationResult::Invalid(failure) => {
                            warn!(
                                session_id = %self.state.session_id(),
                                reason = failure.reason_code(),
                                "Peer certificate failed validation after handshake: {}",
                                failure
                            );
                            if let Some(ref metrics) = self.metrics {
                                metrics.record_certificate_failure(failure.reason_code());
                            }
                        }
                    }
                }

                HookOutcome::allow()
            }

            PhaseEvent::Mail | PhaseEvent::Rcpt | PhaseEvent::Data => {
                let evaluation = decide(phase, &self.state, policy, now);
                let security_headers = evaluation
                    .attach_security_headers
                    .then(|| self.state.security_headers().clone());

                HookOutcome {
                    security_headers,
                    ..HookOutcome::decision(evaluation.decision)
                }
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_decision(phase, &outcome.decision);
        }

        Ok(outcome)
    }

    /// Like [`handle`](Self::handle), but any error or panic becomes a denial
    pub fn handle_fail_closed(&mut self, event: PhaseEvent, now: DateTime<Utc>) -> HookOutcome {
        let phase = event.phase();

        match catch_unwind(AssertUnwindSafe(|| self.handle(event, now))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(
                    session_id = %self.state.session_id(),
                    %phase,
                    code = e.code(),
                    "Enforcement failed, denying: {}",
                    e
                );
                self.internal_denial(phase)
            }
            Err(_) => {
                error!(
                    session_id = %self.state.session_id(),
                    %phase,
                    "Enforcement panicked, denying"
                );
                self.internal_denial(phase)
            }
        }
    }

    fn internal_denial(&self, phase: Phase) -> HookOutcome {
        let decision = EnforcementDecision::deny(INTERNAL_ERROR_REASON);
        if let Some(ref metrics) = self.metrics {
            metrics.record_decision(phase, &decision);
        }
        HookOutcome::decision(decision)
    }
}
