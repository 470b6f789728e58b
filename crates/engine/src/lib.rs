//! Incremental aggregation and ranking engine.
//!
//! This crate is the pure core of the tracker: no I/O, no async, no clocks.
//! The tracker service feeds it normalized events and reads back statistics
//! and rankings.
//!
//! - [`registry`]: the append-only list of eligible players, built from
//!   qualifying entry transfers
//! - [`graph`]: the directed trust graph and its mutual-trust projection
//! - [`invites`]: per-player invite counters with full-replace batch
//!   semantics
//! - [`ranking`]: stable score-sorted leaderboards with a strictly-positive
//!   top cut
//!
//! Ownership is one-way: the registry owns participant identity, the graph
//! owns edge state, the invite aggregator owns invite counters, and the
//! ranking step only reads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod invites;
pub mod ranking;
pub mod registry;

pub use graph::TrustGraph;
pub use invites::InviteAggregator;
pub use ranking::{rank, Ranking};
pub use registry::{EntryFilter, ParticipantRegistry};
