//! Certificate Validator - Checks a peer certificate against the policy
//!
//! Checks run in a fixed order and stop at the first failure:
//! presence, temporal validity, key strength, protocol allow-list.
//! Validation is pure CPU work; it never touches the network or disk.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tlsgate_common::{CertificateDescriptor, PolicyConfig};

/// Why a certificate was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("no peer certificate presented")]
    MissingCertificate,

    #[error("certificate not valid until {valid_from}")]
    NotYetValid { valid_from: DateTime<Utc> },

    #[error("certificate expired at {valid_to}")]
    Expired { valid_to: DateTime<Utc> },

    #[error("key size {actual} bits is below the required {required} bits")]
    WeakKey { actual: u32, required: u32 },

    #[error("protocol {0} is not allowed")]
    DisallowedProtocol(String),
}

impl ValidationFailure {
    /// Stable reason code reported to the host and in logs
    pub fn reason_code(&self) -> &'static str {
        match self {
            ValidationFailure::MissingCertificate => "missing-certificate",
            ValidationFailure::NotYetValid { .. } => "not-yet-valid",
            ValidationFailure::Expired { .. } => "expired",
            ValidationFailure::WeakKey { .. } => "weak-key",
            ValidationFailure::DisallowedProtocol(_) => "disallowed-protocol",
        }
    }
}

/// Verdict of [`validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationFailure),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(failure) => Some(failure),
        }
    }
}

/// Validate a peer certificate against `policy` at instant `now`
pub fn validate(
    cert: Option<&CertificateDescriptor>,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> ValidationResult {
    match check(cert, policy, now) {
        Ok(()) => ValidationResult::Valid,
        Err(failure) => ValidationResult::Invalid(failure),
    }
}

fn check(
    cert: Option<&CertificateDescriptor>,
    policy: &PolicyConfig,
    now: DateTime<Utc>,
) -> Result<(), ValidationFailure> {
    let cert = match cert {
        Some(cert) => cert,
        None if policy.verify_certificate => return Err(ValidationFailure::MissingCertificate),
        None => return Ok(()),
    };

    if now < cert.valid_from {
        return Err(ValidationFailure::NotYetValid {
            valid_from: cert.valid_from,
        });
    }

    if now > cert.valid_to {
        return Err(ValidationFailure::Expired {
            valid_to: cert.valid_to,
        });
    }

    if cert.key_size_bits < policy.minimum_key_size_bits {
        return Err(ValidationFailure::WeakKey {
            actual: cert.key_size_bits,
            required: policy.minimum_key_size_bits,
        });
    }

    if !policy.allows_protocol(&cert.negotiated_protocol) {
        return Err(ValidationFailure::DisallowedProtocol(
            cert.negotiated_protocol.clone(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn cert() -> CertificateDescriptor {
        CertificateDescriptor {
            valid_from: now() - Duration::days(30),
            valid_to: now() + Duration::days(60),
            key_size_bits: 4096,
            negotiated_protocol: "TLSv1.3".to_string(),
            subject_common_name: Some("mx.example.net".to_string()),
        }
    }

    fn reason(result: &ValidationResult) -> Option<&'static str> {
        result.failure().map(|f| f.reason_code())
    }

    #[test]
    fn test_valid_certificate() {
        let policy = PolicyConfig::secure_default();
        assert_eq!(validate(Some(&cert()), &policy, now()), ValidationResult::Valid);
    }

    #[test]
    fn test_missing_certificate_depends_on_verification() {
        let mut policy = PolicyConfig::secure_default();
        assert_eq!(reason(&validate(None, &policy, now())), Some("missing-certificate"));

        policy.verify_certificate = false;
        assert!(validate(None, &policy, now()).is_valid());
    }

    #[test]
    fn test_not_yet_valid() {
        let policy = PolicyConfig::secure_default();
        let mut c = cert();
        c.valid_from = now() + Duration::seconds(1);
        assert_eq!(reason(&validate(Some(&c), &policy, now())), Some("not-yet-valid"));
    }

    #[test]
    fn test_expired() {
        let policy = PolicyConfig::secure_default();
        let mut c = cert();
        c.valid_to = now() - Duration::seconds(1);
        assert_eq!(reason(&validate(Some(&c), &policy, now())), Some("expired"));
    }

    #[test]
    fn test_validity_window_is_inclusive() {
        let policy = PolicyConfig::secure_default();
        let mut c = cert();
        c.valid_from = now();
        assert!(validate(Some(&c), &policy, now()).is_valid());

        let mut c = cert();
        c.valid_to = now();
        assert!(validate(Some(&c), &policy, now()).is_valid());
    }

    #[test]
    fn test_weak_key() {
        let policy = PolicyConfig::secure_default();
        let mut c = cert();
        c.key_size_bits = 1024;
        assert_eq!(
            validate(Some(&c), &policy, now()),
            ValidationResult::Invalid(ValidationFailure::WeakKey {
                actual: 1024,
                required: 2048
            })
        );

        c.key_size_bits = 2048;
        assert!(validate(Some(&c), &policy, now()).is_valid());
    }

    #[test]
    fn test_disallowed_protocol() {
        let policy = PolicyConfig::secure_default();
        let mut c = cert();
        c.negotiated_protocol = "TLSv1.1".to_string();
        assert_eq!(
            reason(&validate(Some(&c), &policy, now())),
            Some("disallowed-protocol")
        );
    }

    #[test]
    fn test_first_failing_check_is_reported() {
        let policy = PolicyConfig::secure_default();

        // Expired, weak and on a disallowed protocol: temporal wins
        let mut c = cert();
        c.valid_to = now() - Duration::days(1);
        c.key_size_bits = 512;
        c.negotiated_protocol = "TLSv1".to_string();
        assert_eq!(reason(&validate(Some(&c), &policy, now())), Some("expired"));

        // Weak and on a disallowed protocol: key size wins
        c.valid_to = now() + Duration::days(1);
        assert_eq!(reason(&validate(Some(&c), &policy, now())), Some("weak-key"));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let policy = PolicyConfig::secure_default();
        let mut c = cert();
        c.key_size_bits = 1024;
        let first = validate(Some(&c), &policy, now());
        for _ in 0..10 {
            assert_eq!(validate(Some(&c), &policy, now()), first);
        }
    }

    #[test]
    fn test_failure_messages() {
        let failure = ValidationFailure::WeakKey {
            actual: 1024,
            required: 2048,
        };
        assert_eq!(
            failure.to_string(),
            "key size 1024 bits is below the required 2048 bits"
        );
        assert_eq!(
            ValidationFailure::DisallowedProtocol("TLSv1.1".to_string()).to_string(),
            "protocol TLSv1.1 is not allowed"
        );
    }
}
