//! tlsgate Core - TLS policy enforcement for SMTP sessions
//!
//! This crate provides the policy store, per-connection state tracking,
//! certificate validation and the decision engine a host MTA consults at
//! each SMTP phase, plus a rustls acceptor builder driven by the same policy.

pub mod enforcement;
pub mod metrics;
pub mod network;
pub mod policy;
pub mod tls;

pub use enforcement::{
    decide, validate, ConnectionState, EnforcementSession, HookOutcome, PhaseEvent,
    ValidationFailure, ValidationResult,
};
pub use metrics::EnforcementMetrics;
pub use network::{is_private_address, is_private_remote};
pub use policy::{PolicyOrigin, PolicySnapshot, PolicyStore};
pub use tls::create_tls_acceptor;
