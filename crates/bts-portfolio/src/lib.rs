//! bts-portfolio
//!
//! FIFO lot accounting for one account.  Pure deterministic logic — no IO,
//! no time, no randomness; all market inputs (closes, factors) are supplied
//! by the caller.
//!
//! # The adjustment-frame model
//!
//! A [`Lot`] stores its share count in the frame it was acquired in and is
//! never mutated by corporate actions.  The adjustment factor carries the
//! share-structure arithmetic instead:
//!
//! - current-frame (real) shares of a lot on date D =
//!   `shares · factor(D) / acquired_factor`
//! - market value = `Σ shares · close(D) · factor(D) / acquired_factor`
//! - effective cost per current share =
//!   `cost_basis · acquired_factor / factor(D)`
//!
//! A 2-for-1 split halves the close and doubles the factor, so both value
//! and cost travel continuously across the event without touching any lot.
//! Everything a client sees (snapshot shares, sellable, sell matching) is in
//! the current frame.

mod position;

pub use position::{Lot, Position, SellFill};
