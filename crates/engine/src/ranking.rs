//! Leaderboard derivation.
//!
//! Rankings are regenerated in full from a score snapshot after every stats
//! update: with at most a few hundred participants a fresh stable sort is
//! cheaper than the staleness bugs of incremental patching.

use std::collections::HashMap;

use alloy_primitives::Address;
use rally_core::constants::TOP_N;
use rally_core::{Profile, ScoreEntry};

/// A derived leaderboard: the full sorted list and the top cut.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranking {
    /// Every participant, score-sorted descending.
    pub all: Vec<ScoreEntry>,

    /// The first [`TOP_N`] entries with strictly positive score.
    pub top: Vec<ScoreEntry>,
}

/// Rank a score snapshot.
///
/// The input order is the tie order: the sort is stable and descending by
/// score, so callers pass scores in canonical registry order to get
/// deterministic output across identical inputs. Pure, no side effects.
pub fn rank(scores: &[(Address, u64)]) -> Ranking {
    let mut all: Vec<ScoreEntry> = scores
        .iter()
        .map(|(address, score)| ScoreEntry {
            address: *address,
            score: *score,
            name: None,
            avatar_url: None,
        })
        .collect();

    // Vec::sort_by is stable; equal scores keep their input order.
    all.sort_by(|a, b| b.score.cmp(&a.score));

    let top = all
        .iter()
        .filter(|entry| entry.score > 0)
        .take(TOP_N)
        .cloned()
        .collect();

    Ranking { all, top }
}

impl Ranking {
    /// Decorate entries with resolved profile metadata.
    ///
    /// Profiles are resolved for the whole address set in one batched call
    /// upstream; entries without a profile keep `None` fields and remain
    /// valid rows.
    pub fn enrich(&mut self, profiles: &HashMap<Address, Profile>) {
        for entry in self.all.iter_mut().chain(self.top.iter_mut()) {
            if let Some(profile) = profiles.get(&entry.address) {
                entry.name = profile.name.clone();
                entry.avatar_url = profile.avatar_url.clone();
            }
        }
    }

    /// Addresses of every ranked entry, in rank order.
    pub fn addresses(&self) -> Vec<Address> {
        self.all.iter().map(|entry| entry.address).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = Address::repeat_byte(0x0a);
    const B: Address = Address::repeat_byte(0x0b);
    const C: Address = Address::repeat_byte(0x0c);
    const D: Address = Address::repeat_byte(0x0d);

    #[test]
    fn test_top_excludes_zero_scores() {
        let ranking = rank(&[(A, 5), (B, 0), (C, 3), (D, 0)]);

        let top: Vec<(Address, u64)> = ranking.top.iter().map(|e| (e.address, e.score)).collect();
        assert_eq!(top, vec![(A, 5), (C, 3)]);

        // Zero-score players stay in the full list.
        assert_eq!(ranking.all.len(), 4);
        assert_eq!(ranking.all[0].address, A);
        assert_eq!(ranking.all[1].address, C);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let scores = vec![(A, 5), (B, 5), (C, 5)];
        let first = rank(&scores);
        let second = rank(&scores);

        let order: Vec<Address> = first.all.iter().map(|e| e.address).collect();
        assert_eq!(order, vec![A, B, C]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_top_is_capped() {
        let scores: Vec<(Address, u64)> = (1..=15u8)
            .map(|i| (Address::repeat_byte(i), i as u64))
            .collect();
        let ranking = rank(&scores);
        assert_eq!(ranking.top.len(), TOP_N);
        assert_eq!(ranking.all.len(), 15);
        // Highest score first.
        assert_eq!(ranking.top[0].score, 15);
    }

    #[test]
    fn test_empty_input() {
        let ranking = rank(&[]);
        assert!(ranking.all.is_empty());
        assert!(ranking.top.is_empty());
    }

    #[test]
    fn test_enrichment_is_partial_tolerant() {
        let mut ranking = rank(&[(A, 2), (B, 1)]);
        let profiles = HashMap::from([(
            A,
            Profile {
                name: Some("alice".into()),
                avatar_url: Some("https://img.example/a.png".into()),
                cid_v0: None,
            },
        )]);
        ranking.enrich(&profiles);

        assert_eq!(ranking.all[0].name.as_deref(), Some("alice"));
        assert_eq!(ranking.top[0].name.as_deref(), Some("alice"));
        // Unresolved entry keeps score and address with empty metadata.
        assert_eq!(ranking.all[1].name, None);
        assert_eq!(ranking.all[1].score, 1);
    }
}
