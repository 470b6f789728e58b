//! Core types for the rally competition tracker.
//!
//! This crate holds the domain vocabulary shared by the aggregation engine
//! and the tracker service:
//! - Participants, per-player statistics and score entries
//! - Canonical event types (qualifying transfers, trust events, invite
//!   redemptions) that every upstream source is normalized into
//! - Profile metadata attached to ranked entries
//!
//! Addresses are `alloy_primitives::Address` values everywhere. Parsing into
//! the byte representation happens once at the ingestion boundary, so two
//! hex spellings of the same address can never fragment statistics.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{
    InviteRedeemed, InviteSent, InviteStats, Participant, Profile, ScoreEntry, Transfer,
    TrustAction, TrustEvent, TrustStats,
};
