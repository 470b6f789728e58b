//! Live subscriptions.
//!
//! The upstream indexer is polled on an interval; every poll re-runs the
//! full matching query and publishes the complete current event set (not a
//! delta) as one tick. Ticks go through a `watch` channel: a worker that is
//! still busy when several ticks land simply sees the newest one, so
//! overlapping ticks coalesce instead of interleaving. The sequence number
//! lets the worker count what it skipped.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use rally_core::{InviteRedeemed, Transfer, TrustEvent};

use crate::client::IndexerClient;
use crate::state::{DomainStatus, TrackerState};

/// One subscription delivery: the full current matching set.
#[derive(Debug, Clone)]
pub struct Tick<T> {
    /// Monotonic per-subscription sequence number; 0 is the pre-first-tick
    /// placeholder and carries no data.
    pub seq: u64,

    /// The complete matching event set at poll time.
    pub events: T,
}

impl<T: Default> Tick<T> {
    fn initial() -> Self {
        Self {
            seq: 0,
            events: T::default(),
        }
    }
}

/// Handle to a live subscription.
///
/// Callers must call [`unsubscribe`](Self::unsubscribe) on teardown to stop
/// the poller. A tick already being processed when the subscription ends may
/// still complete; its write lands in state nobody reads anymore, which is
/// fine.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop the polling task.
    pub fn unsubscribe(&self) {
        self.handle.abort();
    }
}

/// Subscribe to qualifying-transfer candidates for the collection address.
pub fn subscribe_transfers(
    client: Arc<IndexerClient>,
    state: TrackerState,
    collection: Address,
    window: (u64, u64),
    interval: Duration,
) -> (watch::Receiver<Tick<Vec<Transfer>>>, Subscription) {
    let (tx, rx) = watch::channel(Tick::initial());
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut seq = 0u64;
        loop {
            ticker.tick().await;
            match client.transfer_history(collection, window.0, window.1).await {
                Ok(transfers) => {
                    seq += 1;
                    state.set_players_status(DomainStatus::ready());
                    let _ = tx.send(Tick { seq, events: transfers });
                }
                Err(e) => {
                    warn!("Transfer poll failed: {:#}", e);
                    state.set_players_status(DomainStatus::failed(e.to_string()));
                }
            }
        }
    });
    (rx, Subscription { handle })
}

/// Subscribe to trust events touching the current registry.
///
/// The address filter is re-read from the registry on every poll, so
/// players registered after subscription time are picked up automatically.
pub fn subscribe_trusts(
    client: Arc<IndexerClient>,
    state: TrackerState,
    window: (u64, u64),
    interval: Duration,
) -> (watch::Receiver<Tick<Vec<TrustEvent>>>, Subscription) {
    let (tx, rx) = watch::channel(Tick::initial());
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut seq = 0u64;
        loop {
            ticker.tick().await;
            let addresses = state.player_addresses();
            if addresses.is_empty() {
                continue;
            }
            match client.trust_history(&addresses, window.0, window.1).await {
                Ok(events) => {
                    seq += 1;
                    state.set_trust_status(DomainStatus::ready());
                    let _ = tx.send(Tick { seq, events });
                }
                Err(e) => {
                    warn!("Trust poll failed: {:#}", e);
                    state.set_trust_status(DomainStatus::failed(e.to_string()));
                }
            }
        }
    });
    (rx, Subscription { handle })
}

/// Subscribe to invite redemptions credited to the current registry.
///
/// Live ticks carry redemptions only; sent-invite counts are a backfill
/// concern.
pub fn subscribe_invites(
    client: Arc<IndexerClient>,
    state: TrackerState,
    window: (u64, u64),
    interval: Duration,
) -> (watch::Receiver<Tick<Vec<InviteRedeemed>>>, Subscription) {
    let (tx, rx) = watch::channel(Tick::initial());
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut seq = 0u64;
        loop {
            ticker.tick().await;
            let addresses = state.player_addresses();
            if addresses.is_empty() {
                continue;
            }
            match client
                .invite_redemptions(&addresses, window.0, window.1)
                .await
            {
                Ok(events) => {
                    seq += 1;
                    state.set_invites_status(DomainStatus::ready());
                    let _ = tx.send(Tick { seq, events });
                }
                Err(e) => {
                    warn!("Invite poll failed: {:#}", e);
                    state.set_invites_status(DomainStatus::failed(e.to_string()));
                }
            }
        }
    });
    (rx, Subscription { handle })
}
