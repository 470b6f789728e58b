//! Shared tracker state.
//!
//! One writer per domain (the tick workers), many readers (CLI display,
//! embedding consumers). All mutation goes through fold methods that take
//! the write lock for a short, await-free critical section; readers get
//! cloned snapshots and can never observe a half-applied tick.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy_primitives::Address;
use rally_core::{
    InviteRedeemed, InviteSent, InviteStats, Participant, Profile, ScoreEntry, Transfer,
    TrustEvent, TrustStats,
};
use rally_engine::{rank, EntryFilter, InviteAggregator, ParticipantRegistry, Ranking, TrustGraph};

/// Per-domain load/error flags.
///
/// The domains (players, invites, trust) fail independently: an error in
/// one never blocks reads of the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainStatus {
    /// A backfill for this domain is in flight.
    pub loading: bool,

    /// Last fetch error, cleared by the next successful fetch.
    pub error: Option<String>,
}

impl DomainStatus {
    /// Status for an in-flight backfill.
    pub fn loading() -> Self {
        Self {
            loading: true,
            error: None,
        }
    }

    /// Status after a successful fetch.
    pub fn ready() -> Self {
        Self::default()
    }

    /// Status after a failed fetch.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            loading: false,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug)]
struct Inner {
    registry: ParticipantRegistry,
    graph: TrustGraph,
    invites: InviteAggregator,
    trust_stats: HashMap<Address, TrustStats>,
    invite_ranking: Ranking,
    trust_ranking: Ranking,
    players_status: DomainStatus,
    invites_status: DomainStatus,
    trust_status: DomainStatus,
}

/// Cloneable handle to the tracker's aggregate state.
#[derive(Clone)]
pub struct TrackerState {
    inner: Arc<RwLock<Inner>>,
}

impl TrackerState {
    /// Create empty state with the given entry rules.
    pub fn new(filter: EntryFilter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                registry: ParticipantRegistry::new(filter),
                graph: TrustGraph::new(),
                invites: InviteAggregator::new(),
                trust_stats: HashMap::new(),
                invite_ranking: Ranking::default(),
                trust_ranking: Ranking::default(),
                players_status: DomainStatus::default(),
                invites_status: DomainStatus::default(),
                trust_status: DomainStatus::default(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // --- readers -----------------------------------------------------------

    /// All registered participants, newest live registration first.
    pub fn players(&self) -> Vec<Participant> {
        self.read().registry.participants().to_vec()
    }

    /// Registered addresses in canonical order.
    pub fn player_addresses(&self) -> Vec<Address> {
        self.read().registry.addresses()
    }

    /// Invite stats per registered address, zero-filled.
    pub fn invite_stats(&self) -> HashMap<Address, InviteStats> {
        let inner = self.read();
        inner.registry.zero_filled(inner.invites.stats())
    }

    /// Trust stats per registered address, zero-filled.
    pub fn trust_stats(&self) -> HashMap<Address, TrustStats> {
        let inner = self.read();
        inner.registry.zero_filled(&inner.trust_stats)
    }

    /// Top inviters (strictly positive scores, capped).
    pub fn top_inviters(&self) -> Vec<ScoreEntry> {
        self.read().invite_ranking.top.clone()
    }

    /// Top mutual trusters (strictly positive scores, capped).
    pub fn top_trusters(&self) -> Vec<ScoreEntry> {
        self.read().trust_ranking.top.clone()
    }

    /// The full invite leaderboard, zeros included.
    pub fn full_invite_ranking(&self) -> Vec<ScoreEntry> {
        self.read().invite_ranking.all.clone()
    }

    /// The full trust leaderboard, zeros included.
    pub fn full_trust_ranking(&self) -> Vec<ScoreEntry> {
        self.read().trust_ranking.all.clone()
    }

    /// Players-domain status flags.
    pub fn players_status(&self) -> DomainStatus {
        self.read().players_status.clone()
    }

    /// Invites-domain status flags.
    pub fn invites_status(&self) -> DomainStatus {
        self.read().invites_status.clone()
    }

    /// Trust-domain status flags.
    pub fn trust_status(&self) -> DomainStatus {
        self.read().trust_status.clone()
    }

    // --- writers -----------------------------------------------------------

    /// Register participants from the historical transfer backfill.
    ///
    /// Returns the number of participants added.
    pub fn bootstrap_players(&self, transfers: &[Transfer]) -> usize {
        let mut inner = self.write();
        let added = inner.registry.register_from_history(transfers);
        if added > 0 {
            let addresses = inner.registry.addresses();
            inner.invites.ensure_registered(&addresses);
            recompute_trust(&mut inner);
            recompute_invites(&mut inner);
        }
        added
    }

    /// Register live transfers one by one; returns the new participants.
    ///
    /// New players enter both leaderboards immediately with zero scores;
    /// profile enrichment follows asynchronously.
    pub fn fold_transfers(&self, transfers: &[Transfer]) -> Vec<Participant> {
        let mut inner = self.write();
        let mut added = Vec::new();
        for transfer in transfers {
            if let Some(participant) = inner.registry.register_one(transfer) {
                added.push(participant);
            }
        }
        if !added.is_empty() {
            let addresses = inner.registry.addresses();
            inner.invites.ensure_registered(&addresses);
            recompute_trust(&mut inner);
            recompute_invites(&mut inner);
        }
        added
    }

    /// Fold a full trust event set (one tick's complete matching set).
    ///
    /// Rebuilds the graph, reprojects stats for the whole registry and
    /// rederives the trust leaderboard. Returns the new ranking.
    pub fn fold_trust_events(&self, events: &[TrustEvent]) -> Ranking {
        let mut inner = self.write();
        inner.graph = TrustGraph::rebuild(events);
        recompute_trust(&mut inner);
        inner.trust_ranking.clone()
    }

    /// Fold a full redemption set (one tick's complete matching set).
    ///
    /// Overwrites redemption counts for the whole registry and rederives
    /// the invite leaderboard. Returns the new ranking.
    pub fn fold_invites(&self, events: &[InviteRedeemed]) -> Ranking {
        let mut inner = self.write();
        let addresses = inner.registry.addresses();
        inner.invites.apply_redemptions(events, &addresses);
        recompute_invites(&mut inner);
        inner.invite_ranking.clone()
    }

    /// Apply the bootstrap-only sent-invite counts.
    pub fn apply_invites_sent(&self, events: &[InviteSent]) {
        let mut inner = self.write();
        let addresses = inner.registry.addresses();
        inner.invites.apply_sent(events, &addresses);
    }

    /// Patch resolved profiles into the registry and current rankings.
    ///
    /// Enrichment mutates whatever ranking is current instead of replacing
    /// it, so a slow resolution can never roll a leaderboard back to an
    /// older snapshot.
    pub fn apply_profiles(&self, profiles: &HashMap<Address, Profile>) {
        let mut inner = self.write();
        for (address, profile) in profiles {
            inner
                .registry
                .set_profile(*address, profile.name.clone(), profile.avatar_url.clone());
        }
        inner.invite_ranking.enrich(profiles);
        inner.trust_ranking.enrich(profiles);
    }

    /// Set the players-domain status.
    pub fn set_players_status(&self, status: DomainStatus) {
        self.write().players_status = status;
    }

    /// Set the invites-domain status.
    pub fn set_invites_status(&self, status: DomainStatus) {
        self.write().invites_status = status;
    }

    /// Set the trust-domain status.
    pub fn set_trust_status(&self, status: DomainStatus) {
        self.write().trust_status = status;
    }
}

/// Reproject trust stats and rederive the trust leaderboard.
fn recompute_trust(inner: &mut Inner) {
    let addresses = inner.registry.addresses();
    inner.trust_stats = inner.graph.project_stats(&addresses);
    let scores: Vec<(Address, u64)> = addresses
        .iter()
        .map(|addr| {
            (
                *addr,
                inner
                    .trust_stats
                    .get(addr)
                    .map_or(0, |stats| stats.mutual_trusts),
            )
        })
        .collect();
    let mut ranking = rank(&scores);
    ranking.enrich(&known_profiles(inner));
    inner.trust_ranking = ranking;
}

/// Rederive the invite leaderboard from current counters.
fn recompute_invites(inner: &mut Inner) {
    let addresses = inner.registry.addresses();
    let scores = inner.invites.scores(&addresses);
    let mut ranking = rank(&scores);
    ranking.enrich(&known_profiles(inner));
    inner.invite_ranking = ranking;
}

/// Profile data already attached to registered participants.
///
/// Keeps names on the board across recomputes without waiting for the next
/// resolver round trip.
fn known_profiles(inner: &Inner) -> HashMap<Address, Profile> {
    inner
        .registry
        .participants()
        .iter()
        .filter(|p| p.name.is_some() || p.avatar_url.is_some())
        .map(|p| {
            (
                p.address,
                Profile {
                    name: p.name.clone(),
                    avatar_url: p.avatar_url.clone(),
                    cid_v0: None,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use std::collections::HashSet;

    fn state() -> TrackerState {
        TrackerState::new(EntryFilter {
            collection_address: Address::repeat_byte(0xcc),
            min_amount: U256::from(100),
            window_start: 1_000,
            window_end: 2_000,
            excluded: HashSet::new(),
        })
    }

    fn transfer(from: Address, timestamp: u64) -> Transfer {
        Transfer {
            from,
            to: Address::repeat_byte(0xcc),
            value: U256::from(100),
            timestamp,
            block_number: 1,
            tx_hash: format!("0x{timestamp:x}"),
        }
    }

    const P1: Address = Address::repeat_byte(0x01);
    const P2: Address = Address::repeat_byte(0x02);

    #[test]
    fn test_new_player_gets_zero_rows_everywhere() {
        let state = state();
        state.bootstrap_players(&[transfer(P1, 1_100)]);

        let new = state.fold_transfers(&[transfer(P2, 1_200)]);
        assert_eq!(new.len(), 1);

        assert_eq!(state.invite_stats()[&P2], InviteStats::default());
        assert_eq!(state.trust_stats()[&P2], TrustStats::default());
        // Live registrations come first.
        assert_eq!(state.players()[0].address, P2);
        // Zero-score players appear in the full board but not the top cut.
        assert_eq!(state.full_invite_ranking().len(), 2);
        assert!(state.top_inviters().is_empty());
    }

    #[test]
    fn test_profile_patch_survives_recompute() {
        let state = state();
        state.bootstrap_players(&[transfer(P1, 1_100)]);

        state.apply_profiles(&HashMap::from([(
            P1,
            Profile {
                name: Some("alice".into()),
                avatar_url: None,
                cid_v0: None,
            },
        )]));

        // A later tick rebuilds the ranking; the name must come back from
        // the registry without a new resolver round trip.
        state.fold_invites(&[InviteRedeemed {
            invited_by: P1,
            invitee: P2,
            timestamp: 1_500,
        }]);

        let top = state.top_inviters();
        assert_eq!(top[0].name.as_deref(), Some("alice"));
        assert_eq!(top[0].score, 1);
    }

    #[test]
    fn test_domain_statuses_are_independent() {
        let state = state();
        state.set_invites_status(DomainStatus::failed("upstream down"));
        state.set_trust_status(DomainStatus::ready());

        assert_eq!(state.invites_status().error.as_deref(), Some("upstream down"));
        assert_eq!(state.trust_status(), DomainStatus::ready());
        assert_eq!(state.players_status(), DomainStatus::default());
    }
}
