//! TLS enforcement
//!
//! Connection state, certificate validation, the decision engine and the
//! session type hosts drive at each SMTP phase.

mod certificate;
mod engine;
mod session;
mod state;

pub use certificate::{validate, ValidationFailure, ValidationResult};
pub use engine::{
    advertise, decide, decide_with_certificate, enforcement_required, Advertisement, Evaluation,
};
pub use session::{EnforcementSession, HookOutcome, PhaseEvent, INTERNAL_ERROR_REASON};
pub use state::{ConnectionState, NegotiatedTls};
