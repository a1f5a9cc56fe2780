//! Subscription registry for pub/sub routing
//!
//! The registry tracks which connections listen for which filters and fans
//! published events out to them. State is split between two tables per relay
//! instance:
//!
//! - the **client map**: connection → open subscription handles
//! - the **listener table**: ordered listener entries scanned on broadcast
//!
//! A handle lives in the client map of the relay the client talks to (the
//! *issuing* relay) and points at its listener entry by position in the table
//! of the *serving* relay. Those are the same relay unless the subscription
//! was routed.
//!
//! # Architecture
//!
//! ```text
//!                       RelayGroup (one RwLock)
//!     ┌───────────────────────────────────────────────────────┐
//!     │ front:   clients { conn ─► [handle(sub1 → front[0]),  │
//!     │                             handle(sub2 → notes[0])] }│
//!     │          listeners [ (sub1, filter, conn) ]           │
//!     │ notes:   clients { }                                  │
//!     │          listeners [ (sub2, filter, conn) ]           │
//!     └───────────────────────────────────────────────────────┘
//!            ▲ write lock                      ▲ read lock
//!     open / close / disconnect           broadcast(): filter.matches()
//!                                              │ snapshot, lock released
//!                                  prevent_broadcast ─► conn.write()
//! ```
//!
//! # Removal
//!
//! Listener entries are swap-removed, so removing one moves the table's last
//! entry into the hole. The handle owning the moved entry is found through
//! the entry's back reference and its position is updated, keeping every
//! handle pointing at its own entry.

pub mod cancel;
pub mod config;
pub mod entry;
pub mod store;

pub use cancel::{cancel_pair, Canceller, CloseReason, SubscriptionContext};
pub use config::RelayConfig;
pub use entry::{PreventBroadcast, RelayId};
pub use store::RelayGroup;
