//! Invite statistics aggregator.
//!
//! Subscription ticks deliver the complete redemption set matching the
//! current filter, not deltas since the last tick. Counts are therefore
//! rebuilt from the full event list on every application and overwrite the
//! stored values; replaying an identical batch cannot double-count.

use std::collections::HashMap;

use alloy_primitives::Address;
use rally_core::{InviteRedeemed, InviteSent, InviteStats};

/// Per-participant invite counters.
#[derive(Debug, Clone, Default)]
pub struct InviteAggregator {
    stats: HashMap<Address, InviteStats>,
}

impl InviteAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a full redemption set for the given registry membership.
    ///
    /// Overwrites `invites_redeemed` for every registered address (explicit
    /// zero when no event matches) and leaves `invites_sent` untouched.
    /// Redemptions credited to unregistered inviters are not counted.
    pub fn apply_redemptions(&mut self, events: &[InviteRedeemed], registered: &[Address]) {
        let mut counts: HashMap<Address, u64> = HashMap::new();
        for event in events {
            *counts.entry(event.invited_by).or_insert(0) += 1;
        }
        for address in registered {
            let entry = self.stats.entry(*address).or_default();
            entry.invites_redeemed = counts.get(address).copied().unwrap_or(0);
        }
    }

    /// Apply a full sent-invite set for the given registry membership.
    ///
    /// Same full-replace shape as redemptions. Live ticks do not carry this
    /// leg, so the value set at bootstrap persists until the next backfill.
    pub fn apply_sent(&mut self, events: &[InviteSent], registered: &[Address]) {
        let mut counts: HashMap<Address, u64> = HashMap::new();
        for event in events {
            *counts.entry(event.truster).or_insert(0) += 1;
        }
        for address in registered {
            let entry = self.stats.entry(*address).or_default();
            entry.invites_sent = counts.get(address).copied().unwrap_or(0);
        }
    }

    /// Ensure explicit zero rows for newly registered addresses.
    ///
    /// Called when the registry grows between ticks so downstream lookups
    /// never miss.
    pub fn ensure_registered(&mut self, registered: &[Address]) {
        for address in registered {
            self.stats.entry(*address).or_default();
        }
    }

    /// Stats for one address (zero when untracked).
    pub fn get(&self, address: &Address) -> InviteStats {
        self.stats.get(address).copied().unwrap_or_default()
    }

    /// The full stats map.
    pub fn stats(&self) -> &HashMap<Address, InviteStats> {
        &self.stats
    }

    /// Scores in the given address order: redeemed-invite counts.
    ///
    /// The invite score counts redemptions only; sent invites were an
    /// experimental weighting that did not make the final policy.
    pub fn scores(&self, registered: &[Address]) -> Vec<(Address, u64)> {
        registered
            .iter()
            .map(|addr| (*addr, self.get(addr).invites_redeemed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: Address = Address::repeat_byte(0x01);
    const P2: Address = Address::repeat_byte(0x02);
    const P3: Address = Address::repeat_byte(0x03);
    const P4: Address = Address::repeat_byte(0x04);

    fn redeemed(invited_by: Address, invitee: Address) -> InviteRedeemed {
        InviteRedeemed {
            invited_by,
            invitee,
            timestamp: 1_750_000_000,
        }
    }

    #[test]
    fn test_counts_are_per_inviter() {
        let mut agg = InviteAggregator::new();
        agg.apply_redemptions(
            &[redeemed(P1, P2), redeemed(P1, P3), redeemed(P2, P4)],
            &[P1, P2, P3],
        );
        assert_eq!(agg.get(&P1).invites_redeemed, 2);
        assert_eq!(agg.get(&P2).invites_redeemed, 1);
        assert_eq!(agg.get(&P3).invites_redeemed, 0);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let events = vec![redeemed(P1, P2), redeemed(P1, P3)];
        let registered = vec![P1, P2, P3];

        let mut agg = InviteAggregator::new();
        agg.apply_redemptions(&events, &registered);
        let first = agg.get(&P1);

        // An identical tick must overwrite, not accumulate.
        agg.apply_redemptions(&events, &registered);
        assert_eq!(agg.get(&P1), first);
        assert_eq!(agg.get(&P1).invites_redeemed, 2);
    }

    #[test]
    fn test_unregistered_inviter_not_counted() {
        let mut agg = InviteAggregator::new();
        agg.apply_redemptions(&[redeemed(P4, P2)], &[P1, P2, P3]);
        assert_eq!(agg.get(&P4), InviteStats::default());
        assert!(!agg.stats().contains_key(&P4));
    }

    #[test]
    fn test_zero_rows_exist_for_all_registered() {
        let mut agg = InviteAggregator::new();
        agg.apply_redemptions(&[], &[P1, P2]);
        assert!(agg.stats().contains_key(&P1));
        assert!(agg.stats().contains_key(&P2));
        assert_eq!(agg.get(&P2).invites_redeemed, 0);
    }

    #[test]
    fn test_redemption_tick_preserves_sent_counts() {
        let registered = vec![P1, P2];
        let mut agg = InviteAggregator::new();
        agg.apply_sent(
            &[
                InviteSent { truster: P1, invite: P3, timestamp: 0 },
                InviteSent { truster: P1, invite: P4, timestamp: 1 },
            ],
            &registered,
        );
        assert_eq!(agg.get(&P1).invites_sent, 2);

        agg.apply_redemptions(&[redeemed(P1, P3)], &registered);
        assert_eq!(agg.get(&P1).invites_sent, 2);
        assert_eq!(agg.get(&P1).invites_redeemed, 1);
    }

    #[test]
    fn test_scores_follow_given_order() {
        let mut agg = InviteAggregator::new();
        agg.apply_redemptions(&[redeemed(P2, P3)], &[P1, P2]);
        assert_eq!(agg.scores(&[P1, P2]), vec![(P1, 0), (P2, 1)]);
    }

    #[test]
    fn test_ensure_registered_adds_zero_rows() {
        let mut agg = InviteAggregator::new();
        agg.ensure_registered(&[P1]);
        assert_eq!(agg.get(&P1), InviteStats::default());
        assert!(agg.stats().contains_key(&P1));
    }
}
