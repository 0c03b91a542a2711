//! The reliable forwarding loop.
//!
//! # Iteration
//!
//! ```text
//! marker = <inbox>:in_progress
//!
//! 1. payload = last(marker)                  recovery after a crash (warn)
//!    else blocking_move(inbox -> marker)     waits up to poll_interval
//!    else idle                               (debug)
//! 2. envelope = parse(payload)
//! 3. destinations = smembers(subscriptions:<channel>)
//! 4. exec [rpush(d, payload) for d in destinations] + rpop(marker)
//! ```
//!
//! Step 4 is all-or-nothing: on failure the marker still holds the payload, and
//! the next run starts at step 1 with it. Delivery is therefore at-least-once;
//! a crash between commit and the next iteration cannot lose an event, but one
//! between the blocking move and the commit repeats it on restart.
//!
//! Payloads that don't parse are moved, in one transaction, from the marker to
//! `<inbox>:malformed` and logged; the loop keeps going.
//!
//! # Shutdown
//!
//! [`Broker::run`] checks its `CancellationToken` at the start of every
//! iteration, inside the iteration's deadline. An in-flight iteration is never
//! interrupted by shutdown.

use std::ops::ControlFlow;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::BrokerConfig;
use crate::store::{Store, StoreError, Transaction};
use crate::types::{DestinationId, Envelope, subscriptions_key};

/// Errors that stop the Broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The backing store failed during dequeue or fan-out.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Outcome of one [`Broker::forward_event`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarded {
    /// Nothing arrived within the poll interval.
    Idle,

    /// The event was pushed to every destination (possibly none) and the
    /// marker cleared.
    Delivered {
        channel: String,
        event: String,
        destinations: Vec<DestinationId>,
        /// Taken from the marker left by an earlier run.
        recovered: bool,
    },

    /// The payload was not an envelope and went to the dead-letter list.
    Malformed { recovered: bool },
}

/// Drains one inbox into subscriber queues.
///
/// Exactly one Broker may poll a given inbox at a time.
pub struct Broker {
    config: BrokerConfig,
    store: Arc<dyn Store>,
}

impl Broker {
    /// Creates a Broker on its own connection to `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if a dedicated connection can't be opened.
    pub fn new(config: BrokerConfig, store: &dyn Store) -> Result<Self> {
        let store = store.dedicated()?;
        info!(inbox = %config.inbox(), "Broker configured to fetch events from inbox");
        Ok(Broker { config, store })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Runs iterations until `shutdown` is cancelled.
    ///
    /// An iteration that overruns [`BrokerConfig::iteration_deadline`] is
    /// abandoned with a warning and the loop continues; the marker makes the
    /// abandoned work resumable.
    ///
    /// # Errors
    ///
    /// Returns the first store error. The caller is expected to exit; a
    /// restarted Broker recovers from the marker.
    #[instrument(skip_all, fields(inbox = %self.config.inbox()))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Broker started");
        let deadline = self.config.iteration_deadline();

        loop {
            let iteration = tokio::time::timeout(deadline, async {
                if shutdown.is_cancelled() {
                    return Ok(ControlFlow::Break(()));
                }
                self.forward_event().await.map(ControlFlow::Continue)
            })
            .await;

            match iteration {
                Ok(Ok(ControlFlow::Break(()))) => break,
                Ok(Ok(ControlFlow::Continue(_))) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Broker stopping");
                    return Err(e);
                }
                Err(_) => {
                    warn!(?deadline, "Broker iteration exceeded its deadline, retrying");
                }
            }
        }

        info!("Broker shut down");
        Ok(())
    }

    /// Runs a single iteration.
    ///
    /// # Errors
    ///
    /// Returns a store error from the dequeue, the lookup or the fan-out. The
    /// marker is left as it was before the failing step.
    pub async fn forward_event(&self) -> Result<Forwarded> {
        let marker = self.config.in_progress_queue();

        let (payload, recovered) = match self.store.last(&marker).await? {
            Some(payload) => {
                warn!(
                    inbox = %self.config.inbox(),
                    "Detected failed event delivery, attempting recovery"
                );
                (payload, true)
            }
            None => {
                let moved = self
                    .store
                    .blocking_move(self.config.inbox(), &marker, self.config.poll_interval())
                    .await?;
                match moved {
                    Some(payload) => (payload, false),
                    None => {
                        debug!(
                            poll_interval = ?self.config.poll_interval(),
                            "Reached timeout for broker poll interval"
                        );
                        return Ok(Forwarded::Idle);
                    }
                }
            }
        };

        let envelope = match Envelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                let dead_letter = self.config.malformed_queue();
                error!(
                    error = %e,
                    %payload,
                    dead_letter = %dead_letter,
                    "Dropping malformed event"
                );
                let tx = Transaction::new().rpush(dead_letter, &payload).rpop(&marker);
                self.store.exec(tx).await?;
                return Ok(Forwarded::Malformed { recovered });
            }
        };

        let name = envelope.qualified_name();
        debug!(event = %name, %payload, "Received event");

        let destinations: Vec<DestinationId> = self
            .store
            .smembers(&subscriptions_key(&envelope.channel))
            .await?
            .into_iter()
            .map(DestinationId::from)
            .collect();
        debug!(event = %name, destinations = ?destinations, "Subscriber queues");

        let tx = destinations
            .iter()
            .fold(Transaction::new(), |tx, d| tx.rpush(d.as_str(), &payload))
            .rpop(&marker);
        self.store.exec(tx).await?;

        debug!(event = %name, fanout = destinations.len(), "Processed event");
        Ok(Forwarded::Delivered {
            channel: envelope.channel,
            event: envelope.event,
            destinations,
            recovered,
        })
    }
}
