//! Application Layer - Use cases and port definitions.
//!
//! This layer turns upstream feed events into viewer envelopes without
//! knowing how either side is transported.

/// Port interfaces for outbound delivery.
pub mod ports;

/// Application services.
pub mod services;
