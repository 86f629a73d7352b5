//! Policy Store Module
//!
//! Loads the TLS enforcement policy and publishes it as atomically swapped,
//! versioned snapshots.

mod store;

pub use store::{load, PolicyOrigin, PolicySnapshot, PolicyStore};
