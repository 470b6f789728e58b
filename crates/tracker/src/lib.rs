//! Live leaderboard tracker for the rally competition.
//!
//! This crate is the service shell around [`rally_engine`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  rally-tracker                              │
//! │                                             │
//! │  ┌──────────────┐   history + polling       │
//! │  │ IndexerClient│ ← upstream indexer (RPC)  │
//! │  └──────┬───────┘                           │
//! │         │ canonical events                  │
//! │  ┌──────▼───────┐      ┌────────────────┐   │
//! │  │ tick workers │──────│ TrackerState   │   │
//! │  │ (per domain) │      │ registry/graph │   │
//! │  └──────┬───────┘      │ stats/rankings │   │
//! │         │              └───────▲────────┘   │
//! │  ┌──────▼────────┐            │ reads       │
//! │  │ProfileResolver│      CLI / embedders     │
//! │  │ SQLite + HTTP │                          │
//! │  └───────────────┘                          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! - [`config`]: TOML + environment configuration
//! - [`client`]: JSON-RPC indexer client and event normalization
//! - [`feed`]: polling subscriptions delivering full-set ticks
//! - [`profiles`]: cache-first profile resolution
//! - [`state`]: the shared aggregate state handle
//! - [`service`]: bootstrap and live workers wired together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod feed;
pub mod profiles;
pub mod service;
pub mod state;

pub use config::Config;
pub use service::{LiveHandles, Tracker};
pub use state::{DomainStatus, TrackerState};
