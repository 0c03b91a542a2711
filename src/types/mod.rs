//! Core domain types for the relay.
//!
//! The event envelope travels over the wire; destination identifiers are the
//! opaque list keys that subscriptions resolve to.

pub mod envelope;
pub mod ids;

pub use envelope::{Envelope, EnvelopeError};
pub use ids::{DestinationId, subscriptions_key};
