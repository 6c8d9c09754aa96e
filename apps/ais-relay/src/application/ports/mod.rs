//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `EnvelopeSink`: fan-out of relay envelopes to connected viewers

use crate::domain::envelope::RelayEnvelope;

/// Destination for envelopes produced by the relay service.
#[cfg_attr(test, mockall::automock)]
pub trait EnvelopeSink {
    /// Deliver an envelope to every open viewer.
    ///
    /// Returns the number of viewers the envelope was handed to. Delivery
    /// failures are absorbed by the implementation.
    fn publish(&self, envelope: &RelayEnvelope) -> usize;
}
