//! The Broker: moves events from the inbox to every subscribed destination.
//!
//! - [`BrokerConfig`]: inbox name, poll interval and the keys derived from them.
//! - [`Broker`]: the forwarding loop with crash recovery.
//! - [`wait_for_shutdown_signal`]: termination signals for the binary.

pub mod config;
pub mod forward;
pub mod shutdown;

pub use config::BrokerConfig;
pub use forward::{Broker, BrokerError, Forwarded};
pub use shutdown::wait_for_shutdown_signal;
