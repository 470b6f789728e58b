//! Tracker service: historical bootstrap plus live tick workers.
//!
//! The bootstrap fetches each domain's history once and folds it into the
//! shared state; the live side pairs one polling subscription with one
//! worker task per domain. Workers consume ticks strictly in arrival order
//! from a `watch` channel, so a tick being processed can never be undone by
//! an older one completing late.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rally_core::{InviteRedeemed, Transfer, TrustEvent};
use rally_engine::EntryFilter;

use crate::client::IndexerClient;
use crate::config::Config;
use crate::feed::{self, Subscription, Tick};
use crate::profiles::ProfileResolver;
use crate::state::{DomainStatus, TrackerState};

/// The competition tracker.
pub struct Tracker {
    config: Config,
    client: Arc<IndexerClient>,
    resolver: Arc<ProfileResolver>,
    state: TrackerState,
}

/// Handles for the live side of the tracker.
pub struct LiveHandles {
    /// Polling subscriptions (one per domain).
    pub subscriptions: Vec<Subscription>,

    /// Tick worker tasks (one per domain).
    pub workers: Vec<JoinHandle<()>>,
}

impl LiveHandles {
    /// Stop all pollers and workers.
    pub fn shutdown(&self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        for worker in &self.workers {
            worker.abort();
        }
    }
}

impl Tracker {
    /// Build a tracker from a validated configuration.
    pub fn new(
        config: Config,
        client: Arc<IndexerClient>,
        resolver: Arc<ProfileResolver>,
    ) -> Result<Self> {
        let filter = EntryFilter {
            collection_address: config.competition.collection_address,
            min_amount: config.competition.min_amount()?,
            window_start: config.competition.window_start,
            window_end: config.competition.window_end,
            excluded: config.competition.excluded_addresses.iter().copied().collect(),
        };
        let state = TrackerState::new(filter);
        Ok(Self {
            config,
            client,
            resolver,
            state,
        })
    }

    /// Handle to the shared state for display consumers.
    pub fn state(&self) -> TrackerState {
        self.state.clone()
    }

    fn window(&self) -> (u64, u64) {
        (
            self.config.competition.window_start,
            self.config.competition.window_end,
        )
    }

    /// Fetch each domain's history once and fold it into the state.
    ///
    /// The player backfill is upstream of everything and is fatal on
    /// failure; trust and invite failures land in their own status flags
    /// and do not block each other.
    pub async fn bootstrap(&self) -> Result<()> {
        let (window_start, window_end) = self.window();

        self.state.set_players_status(DomainStatus::loading());
        let transfers = match self
            .client
            .transfer_history(
                self.config.competition.collection_address,
                window_start,
                window_end,
            )
            .await
        {
            Ok(transfers) => transfers,
            Err(e) => {
                self.state
                    .set_players_status(DomainStatus::failed(e.to_string()));
                return Err(e).context("Player backfill failed");
            }
        };
        let added = self.state.bootstrap_players(&transfers);
        self.state.set_players_status(DomainStatus::ready());
        info!(
            "Player backfill complete: {} qualifying entries out of {} transfers",
            added,
            transfers.len()
        );

        let addresses = self.state.player_addresses();

        self.state.set_trust_status(DomainStatus::loading());
        match self
            .client
            .trust_history(&addresses, window_start, window_end)
            .await
        {
            Ok(events) => {
                let ranking = self.state.fold_trust_events(&events);
                self.state.set_trust_status(DomainStatus::ready());
                info!(
                    "Trust backfill complete: {} events, {} players on the board",
                    events.len(),
                    ranking.top.len()
                );
            }
            Err(e) => {
                warn!("Trust backfill failed: {:#}", e);
                self.state.set_trust_status(DomainStatus::failed(e.to_string()));
            }
        }

        self.state.set_invites_status(DomainStatus::loading());
        match self
            .client
            .invite_history(&addresses, window_start, window_end)
            .await
        {
            Ok((redeemed, sent)) => {
                self.state.apply_invites_sent(&sent);
                let ranking = self.state.fold_invites(&redeemed);
                self.state.set_invites_status(DomainStatus::ready());
                info!(
                    "Invite backfill complete: {} redemptions, {} players on the board",
                    redeemed.len(),
                    ranking.top.len()
                );
            }
            Err(e) => {
                warn!("Invite backfill failed: {:#}", e);
                self.state
                    .set_invites_status(DomainStatus::failed(e.to_string()));
            }
        }

        // One batched resolution for the whole registry.
        match self.resolver.resolve_batch(&addresses).await {
            Ok(profiles) => {
                info!("Resolved {} profiles", profiles.len());
                self.state.apply_profiles(&profiles);
            }
            Err(e) => warn!("Profile resolution failed: {:#}", e),
        }

        Ok(())
    }

    /// Start the live side: one poller and one worker per domain.
    pub fn spawn_live(&self) -> LiveHandles {
        let interval = Duration::from_secs(self.config.indexer.poll_interval_secs);
        let window = self.window();

        let (transfer_rx, transfer_sub) = feed::subscribe_transfers(
            self.client.clone(),
            self.state.clone(),
            self.config.competition.collection_address,
            window,
            interval,
        );
        let (trust_rx, trust_sub) =
            feed::subscribe_trusts(self.client.clone(), self.state.clone(), window, interval);
        let (invite_rx, invite_sub) =
            feed::subscribe_invites(self.client.clone(), self.state.clone(), window, interval);

        LiveHandles {
            subscriptions: vec![transfer_sub, trust_sub, invite_sub],
            workers: vec![
                self.spawn_transfer_worker(transfer_rx),
                self.spawn_trust_worker(trust_rx),
                self.spawn_invite_worker(invite_rx),
            ],
        }
    }

    fn spawn_transfer_worker(
        &self,
        mut rx: watch::Receiver<Tick<Vec<Transfer>>>,
    ) -> JoinHandle<()> {
        let state = self.state.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let mut last_seq = 0u64;
            while rx.changed().await.is_ok() {
                let tick = rx.borrow_and_update().clone();
                let Some(transfers) = accept_tick(&mut last_seq, tick, "transfers") else {
                    continue;
                };
                let new_players = state.fold_transfers(&transfers);
                if new_players.is_empty() {
                    continue;
                }
                info!("Registered {} new player(s)", new_players.len());
                let addresses: Vec<Address> =
                    new_players.iter().map(|p| p.address).collect();
                enrich(&state, &resolver, &addresses).await;
            }
        })
    }

    fn spawn_trust_worker(
        &self,
        mut rx: watch::Receiver<Tick<Vec<TrustEvent>>>,
    ) -> JoinHandle<()> {
        let state = self.state.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let mut last_seq = 0u64;
            while rx.changed().await.is_ok() {
                let tick = rx.borrow_and_update().clone();
                let Some(events) = accept_tick(&mut last_seq, tick, "trust") else {
                    continue;
                };
                let ranking = state.fold_trust_events(&events);
                debug!(
                    "Trust tick folded: {} events, {} on the board",
                    events.len(),
                    ranking.top.len()
                );
                enrich(&state, &resolver, &ranking.addresses()).await;
            }
        })
    }

    fn spawn_invite_worker(
        &self,
        mut rx: watch::Receiver<Tick<Vec<InviteRedeemed>>>,
    ) -> JoinHandle<()> {
        let state = self.state.clone();
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            let mut last_seq = 0u64;
            while rx.changed().await.is_ok() {
                let tick = rx.borrow_and_update().clone();
                let Some(events) = accept_tick(&mut last_seq, tick, "invites") else {
                    continue;
                };
                let ranking = state.fold_invites(&events);
                debug!(
                    "Invite tick folded: {} redemptions, {} on the board",
                    events.len(),
                    ranking.top.len()
                );
                enrich(&state, &resolver, &ranking.addresses()).await;
            }
        })
    }
}

/// Decide whether a tick should be processed.
///
/// Returns `None` for the initial placeholder and for already-seen
/// sequence numbers; counts how many intermediate ticks the watch channel
/// coalesced away, which is observability data, not an error.
fn accept_tick<T>(last_seq: &mut u64, tick: Tick<T>, domain: &str) -> Option<T> {
    if tick.seq == 0 || tick.seq <= *last_seq {
        return None;
    }
    let coalesced = tick.seq - *last_seq - 1;
    if coalesced > 0 {
        debug!("{}: coalesced {} overlapping tick(s)", domain, coalesced);
    }
    *last_seq = tick.seq;
    Some(tick.events)
}

/// Resolve profiles for an address set and patch them in.
///
/// Enrichment failures degrade to bare addresses on the board.
async fn enrich(state: &TrackerState, resolver: &ProfileResolver, addresses: &[Address]) {
    match resolver.resolve_batch(addresses).await {
        Ok(profiles) => state.apply_profiles(&profiles),
        Err(e) => warn!("Profile resolution failed: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_tick_skips_placeholder_and_replays() {
        let mut last_seq = 0;
        assert!(accept_tick(&mut last_seq, Tick { seq: 0, events: () }, "t").is_none());
        assert!(accept_tick(&mut last_seq, Tick { seq: 1, events: () }, "t").is_some());
        // Same tick observed again: not reprocessed.
        assert!(accept_tick(&mut last_seq, Tick { seq: 1, events: () }, "t").is_none());
        assert_eq!(last_seq, 1);
    }

    #[test]
    fn test_accept_tick_counts_coalesced() {
        let mut last_seq = 0;
        assert!(accept_tick(&mut last_seq, Tick { seq: 1, events: () }, "t").is_some());
        // Ticks 2..=4 were overwritten in the channel while the worker was
        // busy; 5 is the one that gets processed.
        assert!(accept_tick(&mut last_seq, Tick { seq: 5, events: () }, "t").is_some());
        assert_eq!(last_seq, 5);
    }

    #[tokio::test]
    async fn test_watch_channel_coalesces_to_newest() {
        let (tx, mut rx) = watch::channel(Tick { seq: 0, events: 0u32 });
        tx.send(Tick { seq: 1, events: 10 }).unwrap();
        tx.send(Tick { seq: 2, events: 20 }).unwrap();
        tx.send(Tick { seq: 3, events: 30 }).unwrap();

        rx.changed().await.unwrap();
        let tick = rx.borrow_and_update().clone();
        assert_eq!(tick.seq, 3);
        assert_eq!(tick.events, 30);

        // Nothing further pending.
        assert!(!rx.has_changed().unwrap());
    }
}
