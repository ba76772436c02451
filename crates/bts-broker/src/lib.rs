//! bts-broker
//!
//! The per-account trading counter: order intake, corporate-action
//! forwarding, matching, commit, daily mark-to-market, metrics, and the
//! process-wide registry plus snapshot persistence.
//!
//! Concurrency model: every mutating operation on one account serializes
//! under that account's async lock, held across feed suspension points so an
//! order advances corporate actions, matches, and commits as one critical
//! section.  Independent accounts run concurrently; the registry itself uses
//! a single short-lived lock for insert/delete.

mod account;
mod persist;
mod registry;
mod xdxr;

pub use account::{
    Account, AccountInfo, AccountMeta, AccountSnapshot, BillsView, MetricsReport, OrderResult,
    TradePolicy,
};
pub use persist::{FileStore, SnapshotStore};
pub use registry::{AccountBrief, Registry};
