//! bts-daemon
//!
//! The HTTP trading counter.  `routes::build_router` is the single entry
//! point; `main.rs` wires config, feed, store, and middleware around it.
//! All handlers are thin: token → account via the registry, JSON in,
//! envelope out — the business rules live in `bts-broker`.

pub mod api_types;
pub mod routes;
pub mod state;
