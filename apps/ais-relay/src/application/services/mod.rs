//! Application Services
//!
//! - `RelayService`: maps upstream feed events to viewer envelopes

mod relay;

pub use relay::RelayService;
