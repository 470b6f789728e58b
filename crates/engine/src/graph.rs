//! Directed trust graph and its mutual-trust projection.
//!
//! Each ordered pair `(truster, trustee)` is either absent or trusted;
//! grants and revocations move it between those two states. Mutuality is
//! never stored; it is derived from the presence of both directed edges,
//! which keeps revocation handling trivially correct.

use std::collections::{HashMap, HashSet};

use alloy_primitives::Address;
use rally_core::{TrustAction, TrustEvent, TrustStats};

/// Directed trust graph over participant addresses.
#[derive(Debug, Clone, Default)]
pub struct TrustGraph {
    out: HashMap<Address, HashSet<Address>>,
    inbound: HashMap<Address, HashSet<Address>>,
}

impl TrustGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a full event set into a fresh graph.
    ///
    /// Events must be ordered by time ascending so that a revocation after a
    /// grant lands in the revoked state. This is the full-rebuild path used
    /// by subscription ticks, which deliver the complete current matching
    /// set rather than deltas.
    pub fn rebuild(events: &[TrustEvent]) -> Self {
        let mut graph = Self::new();
        for event in events {
            graph.apply(event);
        }
        graph
    }

    /// Apply one event (the incremental-edit path).
    ///
    /// Self-referential edges are dropped silently; they are upstream data
    /// noise, not a usage fault.
    pub fn apply(&mut self, event: &TrustEvent) {
        if event.is_self_referential() {
            return;
        }
        match event.action() {
            TrustAction::Grant => self.add_edge(event.truster, event.trustee),
            TrustAction::Revoke => self.remove_edge(event.truster, event.trustee),
            TrustAction::Ignore => {}
        }
    }

    /// Add the directed edge `truster -> trustee` (idempotent).
    pub fn add_edge(&mut self, truster: Address, trustee: Address) {
        if truster == trustee {
            return;
        }
        self.out.entry(truster).or_default().insert(trustee);
        self.inbound.entry(trustee).or_default().insert(truster);
    }

    /// Remove the directed edge `truster -> trustee` if present.
    pub fn remove_edge(&mut self, truster: Address, trustee: Address) {
        if let Some(set) = self.out.get_mut(&truster) {
            set.remove(&trustee);
        }
        if let Some(set) = self.inbound.get_mut(&trustee) {
            set.remove(&truster);
        }
    }

    /// Whether the directed edge `truster -> trustee` exists.
    pub fn has_edge(&self, truster: &Address, trustee: &Address) -> bool {
        self.out
            .get(truster)
            .is_some_and(|set| set.contains(trustee))
    }

    /// Whether both directed edges between the pair exist.
    pub fn is_mutual(&self, a: &Address, b: &Address) -> bool {
        self.has_edge(a, b) && self.has_edge(b, a)
    }

    /// Number of outgoing edges for an address.
    pub fn out_degree(&self, address: &Address) -> u64 {
        self.out.get(address).map_or(0, |set| set.len() as u64)
    }

    /// Number of incoming edges for an address.
    pub fn in_degree(&self, address: &Address) -> u64 {
        self.inbound.get(address).map_or(0, |set| set.len() as u64)
    }

    /// Number of trustees that also trust this address back.
    pub fn mutual_degree(&self, address: &Address) -> u64 {
        let Some(out) = self.out.get(address) else {
            return 0;
        };
        let Some(inbound) = self.inbound.get(address) else {
            return 0;
        };
        out.iter().filter(|peer| inbound.contains(*peer)).count() as u64
    }

    /// Project per-participant trust statistics.
    ///
    /// Computed for every given address (not just touched nodes) so that
    /// registry growth between ticks always yields explicit zero rows.
    pub fn project_stats(&self, addresses: &[Address]) -> HashMap<Address, TrustStats> {
        addresses
            .iter()
            .map(|addr| {
                (
                    *addr,
                    TrustStats {
                        trusts: self.out_degree(addr),
                        mutual_trusts: self.mutual_degree(addr),
                    },
                )
            })
            .collect()
    }

    /// Total number of directed edges.
    pub fn edge_count(&self) -> u64 {
        self.out.values().map(|set| set.len() as u64).sum()
    }
}
