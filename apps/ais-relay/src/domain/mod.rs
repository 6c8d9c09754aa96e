//! Domain Layer - Core relay types and business rules.
//!
//! This layer contains the vessel, geography and feed lifecycle types
//! shared by the upstream client, the relay service and the downstream
//! server. Nothing here performs I/O.

/// Relay envelope sent to viewers.
pub mod envelope;

/// Upstream feed lifecycle: connection state, events and counters.
pub mod feed;

/// Coordinates and bounding boxes.
pub mod geo;

/// Vessel position reports and decoded upstream frames.
pub mod vessel;
