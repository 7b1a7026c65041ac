//! Single-flight coordination for variant generation.
//!
//! When several requests miss the cache for the same [`VariantKey`] at once,
//! exactly one of them (the leader) generates the variant. The others join the
//! leader's flight and wait for its outcome instead of rendering it again.
//!
//! # Protocol
//!
//! ```text
//! acquire_or_join(key)
//!   ├── variant already published ─────────────► Flight::Published
//!   ├── key in flight ──────────────────────────► Flight::Follower ──wait()──► leader's outcome
//!   └── otherwise: register key, re-check store
//!         ├── published meanwhile ──────────────► Flight::Published
//!         └────────────────────────────────────► Flight::Leader ──complete(outcome)
//! ```
//!
//! The in-flight map is only touched under one short, synchronous lock, so
//! "look up, else insert" is a single atomic step. Outcomes travel on a
//! `watch` channel: a follower that subscribes after the leader settled still
//! observes the settled value, so no wakeup can be lost.
//!
//! A leader that is dropped without completing (panic, cancelled task)
//! settles its flight as [`VariantError::GenerationAborted`], so followers
//! never wait forever and the key becomes available for a fresh attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::error::VariantError;
use crate::storage::VariantStore;

use super::key::VariantKey;

/// `None` while generating, `Some(outcome)` once the leader settled.
type Outcome = Option<Result<(), VariantError>>;

type InFlightMap = HashMap<VariantKey, watch::Receiver<Outcome>>;

/// Tracks which variants are currently being generated.
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: Arc<Mutex<InFlightMap>>,
}

/// Role assigned to a request by [`SingleFlight::acquire_or_join`].
#[derive(Debug)]
pub enum Flight {
    /// The variant is already in the store
    Published,
    /// This request must generate the variant and settle the flight
    Leader(FlightLeader),
    /// Another request is generating; wait for its outcome
    Follower(FlightFollower),
}

impl SingleFlight {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether the caller generates `key`, waits for it, or can read it.
    pub async fn acquire_or_join(&self, key: &VariantKey, store: &VariantStore) -> Flight {
        if store.exists(key).await {
            return Flight::Published;
        }

        let leader = {
            let mut in_flight = lock(&self.in_flight);
            if let Some(rx) = in_flight.get(key) {
                debug!(key = %key, "Joining in-flight generation");
                return Flight::Follower(FlightFollower {
                    key: key.clone(),
                    rx: rx.clone(),
                });
            }

            let (tx, rx) = watch::channel(None);
            in_flight.insert(key.clone(), rx);
            FlightLeader {
                key: key.clone(),
                tx: Some(tx),
                in_flight: Arc::clone(&self.in_flight),
            }
        };

        // A previous leader may have published between the first check and
        // our registration.
        if store.exists(key).await {
            leader.complete(Ok(()));
            return Flight::Published;
        }

        debug!(key = %key, "Leading generation");
        Flight::Leader(leader)
    }

    /// Number of generations currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Whether `key` is currently being generated.
    pub fn is_in_flight(&self, key: &VariantKey) -> bool {
        lock(&self.in_flight).contains_key(key)
    }
}

/// Exclusive right to generate one variant.
///
/// Must be settled with [`complete`](Self::complete); dropping it settles the
/// flight as aborted.
#[derive(Debug)]
pub struct FlightLeader {
    key: VariantKey,
    tx: Option<watch::Sender<Outcome>>,
    in_flight: Arc<Mutex<InFlightMap>>,
}

impl FlightLeader {
    /// The key being generated.
    pub fn key(&self) -> &VariantKey {
        &self.key
    }

    /// Settle the flight, waking every follower with `outcome`.
    ///
    /// The key leaves the in-flight map before followers are woken, so a
    /// request arriving after a failure starts a fresh attempt.
    pub fn complete(mut self, outcome: Result<(), VariantError>) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: Result<(), VariantError>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        lock(&self.in_flight).remove(&self.key);
        tx.send_replace(Some(outcome));
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(key = %self.key, "Leader dropped before completing");
            self.settle(Err(VariantError::GenerationAborted {
                message: format!("generation of {} did not complete", self.key),
            }));
        }
    }
}

/// Handle for waiting on another request's generation.
#[derive(Debug)]
pub struct FlightFollower {
    key: VariantKey,
    rx: watch::Receiver<Outcome>,
}

impl FlightFollower {
    /// The key being generated.
    pub fn key(&self) -> &VariantKey {
        &self.key
    }

    /// Wait for the leader to settle and return its outcome.
    pub async fn wait(mut self) -> Result<(), VariantError> {
        let aborted = || VariantError::GenerationAborted {
            message: format!("generation of {} was abandoned", self.key),
        };
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(aborted()))
    }
}

fn lock(map: &Mutex<InFlightMap>) -> MutexGuard<'_, InFlightMap> {
    // The map is never left half-updated, so a poisoned lock is still usable.
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
