//! tlsgate Common - Shared types and configuration
//!
//! This crate provides the policy model, configuration loading, error types
//! and the value types exchanged between the enforcement engine and its host.

pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use policy::PolicyConfig;
pub use types::{CertificateDescriptor, Disposition, EnforcementDecision, Phase, SmtpReply};
