//! Domain types shared across the engine and the tracker service.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Unix timestamp in seconds.
pub type UnixSeconds = u64;

/// Parse a hex address string into its byte form.
///
/// Accepts any casing; the byte representation is the identity used for all
/// map keys, so `0xAbC…` and `0xabc…` resolve to the same participant.
pub fn parse_address(value: &str) -> Result<Address, CoreError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|_| CoreError::InvalidAddress(value.to_string()))
}

/// Parse a decimal (wei-like) amount string into a U256.
pub fn parse_amount(value: &str) -> Result<U256, CoreError> {
    value
        .trim()
        .parse::<U256>()
        .map_err(|_| CoreError::InvalidAmount(value.to_string()))
}

/// A registered competition participant.
///
/// Created when a qualifying entry transfer is observed. Identity fields are
/// immutable for the duration of the run; only the profile fields are
/// patched later by asynchronous enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Player address (byte identity, unique in the registry).
    pub address: Address,

    /// Amount of the qualifying entry transfer.
    pub qualifying_amount: U256,

    /// Timestamp of the qualifying transfer (unix seconds).
    pub joined_at: UnixSeconds,

    /// Transaction hash of the first-seen qualifying transfer.
    pub tx_hash: String,

    /// Block number of the qualifying transfer.
    pub block_number: u64,

    /// Display name, once resolved.
    pub name: Option<String>,

    /// Avatar image URL, once resolved.
    pub avatar_url: Option<String>,
}

/// Per-participant invite statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InviteStats {
    /// Accepted invitations credited to this participant as the inviter.
    pub invites_redeemed: u64,

    /// Outstanding invitations this participant has sent.
    pub invites_sent: u64,
}

/// Per-participant trust statistics, projected from the trust graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrustStats {
    /// Outgoing trust edges (out-degree).
    pub trusts: u64,

    /// Trustees that also trust this participant back.
    pub mutual_trusts: u64,
}

/// One row of a leaderboard.
///
/// Regenerated in full on every stats update; never patched incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreEntry {
    /// Player address.
    pub address: Address,

    /// Domain score (redeemed invites or mutual trusts).
    pub score: u64,

    /// Display name, when profile resolution succeeded.
    pub name: Option<String>,

    /// Avatar image URL, when profile resolution succeeded.
    pub avatar_url: Option<String>,
}

/// A token transfer observed on the entry collection address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Sender (the prospective participant).
    pub from: Address,

    /// Recipient.
    pub to: Address,

    /// Transferred amount.
    pub value: U256,

    /// Transfer timestamp (unix seconds).
    pub timestamp: UnixSeconds,

    /// Block number.
    pub block_number: u64,

    /// Transaction hash.
    pub tx_hash: String,
}

/// A canonical trust event.
///
/// Every upstream shape (historical rows, live rows) is normalized into this
/// one variant before it reaches the graph; the graph never branches on
/// source-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEvent {
    /// The participant granting or revoking trust.
    pub truster: Address,

    /// The participant being trusted.
    pub trustee: Address,

    /// Event timestamp (unix seconds).
    pub timestamp: UnixSeconds,

    /// Trust limit; zero means the relation carries no capacity.
    pub limit: U256,

    /// Expiry timestamp; zero marks a revocation.
    pub expiry: UnixSeconds,
}

/// What a trust event does to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustAction {
    /// Add the directed edge (idempotent).
    Grant,

    /// Remove the directed edge if present.
    Revoke,

    /// Carries no graph effect (zero limit with a live expiry).
    Ignore,
}

impl TrustEvent {
    /// Classify this event.
    ///
    /// A zero expiry is a revocation regardless of limit. A grant requires
    /// both a non-zero limit and a non-zero expiry.
    pub fn action(&self) -> TrustAction {
        if self.expiry == 0 {
            TrustAction::Revoke
        } else if !self.limit.is_zero() {
            TrustAction::Grant
        } else {
            TrustAction::Ignore
        }
    }

    /// True when truster and trustee are the same address.
    ///
    /// Self-referential edges are upstream data noise and are dropped at
    /// ingestion, not reported as errors.
    pub fn is_self_referential(&self) -> bool {
        self.truster == self.trustee
    }
}

/// An accepted invitation, credited to the inviting participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRedeemed {
    /// The inviter this redemption is credited to.
    pub invited_by: Address,

    /// The avatar that redeemed the invite.
    pub invitee: Address,

    /// Redemption timestamp (unix seconds).
    pub timestamp: UnixSeconds,
}

/// An invitation sent but not necessarily redeemed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteSent {
    /// The participant that sent the invitation.
    pub truster: Address,

    /// The invite avatar the relation points at.
    pub invite: Address,

    /// Timestamp of the invite relation (unix seconds).
    pub timestamp: UnixSeconds,
}

/// Profile metadata for an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    pub name: Option<String>,

    /// Avatar image URL.
    pub avatar_url: Option<String>,

    /// Content identifier of the profile document, when known.
    pub cid_v0: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_is_case_insensitive() {
        let lower = parse_address("0xde374ece6fa50e781e81aac78e811b33d16912c7").unwrap();
        let upper = parse_address("0xDE374ECE6FA50E781E81AAC78E811B33D16912C7").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(parse_address("not-an-address").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("").is_err());
    }

    #[test]
    fn test_parse_amount_decimal() {
        assert_eq!(
            parse_amount("1000000000000000000").unwrap(),
            U256::from(10).pow(U256::from(18))
        );
        assert!(parse_amount("12.5").is_err());
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn test_trust_event_classification() {
        let base = TrustEvent {
            truster: Address::repeat_byte(0x01),
            trustee: Address::repeat_byte(0x02),
            timestamp: 1_750_000_000,
            limit: U256::from(100),
            expiry: u64::MAX,
        };
        assert_eq!(base.action(), TrustAction::Grant);

        let revoked = TrustEvent { expiry: 0, ..base.clone() };
        assert_eq!(revoked.action(), TrustAction::Revoke);

        // Zero limit with a zero expiry still counts as a revocation.
        let revoked_zero_limit = TrustEvent {
            limit: U256::ZERO,
            expiry: 0,
            ..base.clone()
        };
        assert_eq!(revoked_zero_limit.action(), TrustAction::Revoke);

        let inert = TrustEvent {
            limit: U256::ZERO,
            ..base.clone()
        };
        assert_eq!(inert.action(), TrustAction::Ignore);
    }

    #[test]
    fn test_self_referential_detection() {
        let event = TrustEvent {
            truster: Address::repeat_byte(0x03),
            trustee: Address::repeat_byte(0x03),
            timestamp: 0,
            limit: U256::from(1),
            expiry: 1,
        };
        assert!(event.is_self_referential());
    }
}
