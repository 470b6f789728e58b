//! Participant registry: the list of eligible players.
//!
//! A player enters the competition by sending a qualifying transfer to the
//! collection address inside the competition window. The registry is
//! append-only for the duration of a run; participants are never removed.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};
use rally_core::{Participant, Transfer};

/// Qualification rules for entry transfers.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    /// Address entry transfers must be sent to.
    pub collection_address: Address,

    /// Minimum qualifying amount (inclusive).
    pub min_amount: U256,

    /// Competition window start (unix seconds, inclusive).
    pub window_start: u64,

    /// Competition window end (unix seconds, inclusive).
    pub window_end: u64,

    /// Addresses excluded from the competition (team/ops accounts).
    pub excluded: HashSet<Address>,
}

impl EntryFilter {
    /// Check whether a transfer qualifies as a competition entry.
    pub fn qualifies(&self, transfer: &Transfer) -> bool {
        transfer.to == self.collection_address
            && transfer.value >= self.min_amount
            && transfer.timestamp >= self.window_start
            && transfer.timestamp <= self.window_end
            && !self.excluded.contains(&transfer.from)
    }
}

/// The append-only list of registered players.
///
/// Participant order is the canonical iteration order for downstream
/// consumers: historical registration keeps first-seen order, live
/// registrations are prepended so the newest player is observed first.
#[derive(Debug, Clone)]
pub struct ParticipantRegistry {
    filter: EntryFilter,
    participants: Vec<Participant>,
    seen: HashSet<Address>,
}

impl ParticipantRegistry {
    /// Create an empty registry with the given qualification rules.
    pub fn new(filter: EntryFilter) -> Self {
        Self {
            filter,
            participants: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Register participants from a historical transfer backfill.
    ///
    /// Transfers that fail the entry filter are skipped; duplicates by
    /// sender keep the first-seen transaction reference. Returns the number
    /// of participants added.
    pub fn register_from_history(&mut self, transfers: &[Transfer]) -> usize {
        let mut added = 0;
        for transfer in transfers {
            if !self.filter.qualifies(transfer) || self.seen.contains(&transfer.from) {
                continue;
            }
            self.seen.insert(transfer.from);
            self.participants.push(Self::participant_from(transfer));
            added += 1;
        }
        added
    }

    /// Register a single live transfer.
    ///
    /// Returns the newly created participant, or `None` when the sender is
    /// already registered or the transfer does not qualify. Live additions
    /// are prepended so consumers observe new players in arrival order.
    pub fn register_one(&mut self, transfer: &Transfer) -> Option<Participant> {
        if !self.filter.qualifies(transfer) || self.seen.contains(&transfer.from) {
            return None;
        }
        self.seen.insert(transfer.from);
        let participant = Self::participant_from(transfer);
        self.participants.insert(0, participant.clone());
        Some(participant)
    }

    /// Patch profile fields on an already-registered participant.
    ///
    /// Enrichment is asynchronous and may land well after registration; an
    /// unknown address is a no-op (the participant may belong to a previous
    /// resolution round).
    pub fn set_profile(&mut self, address: Address, name: Option<String>, avatar_url: Option<String>) {
        if let Some(participant) = self
            .participants
            .iter_mut()
            .find(|p| p.address == address)
        {
            participant.name = name;
            participant.avatar_url = avatar_url;
        }
    }

    /// All registered participants, in canonical order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Registered addresses, in canonical order.
    pub fn addresses(&self) -> Vec<Address> {
        self.participants.iter().map(|p| p.address).collect()
    }

    /// Whether an address is registered.
    pub fn contains(&self, address: &Address) -> bool {
        self.seen.contains(address)
    }

    /// Number of registered participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True when no participant is registered.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Build a lookup table from addresses to arbitrary values, zero-filled
    /// for registered addresses absent from the source map.
    pub fn zero_filled<T: Default + Copy>(&self, source: &HashMap<Address, T>) -> HashMap<Address, T> {
        self.participants
            .iter()
            .map(|p| (p.address, source.get(&p.address).copied().unwrap_or_default()))
            .collect()
    }

    fn participant_from(transfer: &Transfer) -> Participant {
        Participant {
            address: transfer.from,
            qualifying_amount: transfer.value,
            joined_at: transfer.timestamp,
            tx_hash: transfer.tx_hash.clone(),
            block_number: transfer.block_number,
            name: None,
            avatar_url: None,
        }
    }
}
