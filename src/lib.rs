//! Inbox Relay - reliable publish/subscribe over a shared list store.
//!
//! Publishers push event envelopes onto one inbox list. A single [`Broker`]
//! drains the inbox and fans each event out to the destination list of every
//! subscriber registered for its channel. Worker pools elsewhere pop their own
//! lists.
//!
//! ```text
//! Publisher ──lpush──▶ inbox ──move──▶ inbox:in_progress ──exec──▶ destination lists
//!                                                     ▲
//!                      subscriptions:<channel> ───────┘  (written by QueueAdapter)
//! ```
//!
//! [`Broker`]: broker::Broker

pub mod broker;
pub mod config;
pub mod publish;
pub mod store;
pub mod subscriptions;
pub mod types;

#[cfg(test)]
pub mod test_utils;
