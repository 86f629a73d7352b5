//! Common types for tlsgate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reply code for a protected command issued before STARTTLS
pub const STARTTLS_REQUIRED_CODE: u16 = 530;

/// Reply code for a certificate that fails the trust policy
pub const CERTIFICATE_REJECTED_CODE: u16 = 550;

/// Reply text accompanying [`STARTTLS_REQUIRED_CODE`]
pub const STARTTLS_REQUIRED_MESSAGE: &str = "Must issue STARTTLS command first";

/// SMTP conversation phase reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connect,
    Ehlo,
    Helo,
    TlsEstablished,
    Mail,
    Rcpt,
    Data,
}

impl Phase {
    /// MAIL, RCPT and DATA are subject to enforcement
    pub fn is_protected(&self) -> bool {
        matches!(self, Phase::Mail | Phase::Rcpt | Phase::Data)
    }

    /// EHLO and HELO are where capabilities are advertised
    pub fn is_greeting(&self) -> bool {
        matches!(self, Phase::Ehlo | Phase::Helo)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Connect => "connect",
            Phase::Ehlo => "ehlo",
            Phase::Helo => "helo",
            Phase::TlsEstablished => "tls_established",
            Phase::Mail => "mail",
            Phase::Rcpt => "rcpt",
            Phase::Data => "data",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Peer certificate facts supplied by the host after the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDescriptor {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub key_size_bits: u32,
    /// Protocol version negotiated for the session, e.g. `TLSv1.3`
    pub negotiated_protocol: String,
    pub subject_common_name: Option<String>,
}

/// Outcome of an enforcement evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EnforcementDecision {
    Allow,
    Deny { code: u16, reason: String },
    RequireStartTls { code: u16, message: String },
}

impl EnforcementDecision {
    /// The standard 530 decision for a protected command without TLS
    pub fn require_starttls() -> Self {
        EnforcementDecision::RequireStartTls {
            code: STARTTLS_REQUIRED_CODE,
            message: STARTTLS_REQUIRED_MESSAGE.to_string(),
        }
    }

    /// A 550 denial carrying a reason code
    pub fn deny(reason: impl Into<String>) -> Self {
        EnforcementDecision::Deny {
            code: CERTIFICATE_REJECTED_CODE,
            reason: reason.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, EnforcementDecision::Allow)
    }

    /// Short label used for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            EnforcementDecision::Allow => "allow",
            EnforcementDecision::Deny { .. } => "deny",
            EnforcementDecision::RequireStartTls { .. } => "require_starttls",
        }
    }

    /// Translate into the SMTP reply the host should send, if any.
    ///
    /// `Allow` yields `None` because the host answers the command normally.
    /// A missing STARTTLS keeps the session open so the client can upgrade;
    /// a denial ends it since the peer certificate cannot change mid-session.
    pub fn smtp_reply(&self) -> Option<SmtpReply> {
        match self {
            EnforcementDecision::Allow => None,
            EnforcementDecision::RequireStartTls { code, message } => Some(SmtpReply {
                code: *code,
                enhanced: "5.7.0".to_string(),
                text: message.clone(),
                disposition: Disposition::Continue,
            }),
            EnforcementDecision::Deny { code, reason } => Some(SmtpReply {
                code: *code,
                enhanced: "5.7.1".to_string(),
                text: format!("TLS policy violation: {}", reason),
                disposition: Disposition::Terminate,
            }),
        }
    }
}

/// What the host does with the connection after replying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Keep the session open; the client may retry
    Continue,
    /// Close the session after the reply
    Terminate,
}

/// Protocol-level reply derived from a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpReply {
    pub code: u16,
    /// RFC 3463 enhanced status code
    pub enhanced: String,
    pub text: String,
    pub disposition: Disposition,
}

impl std::fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.code, self.enhanced, self.text)
    }
}
