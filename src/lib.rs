//! Booking and availability engine for short-term lodging inventory.
//!
//! All live state sits in memory behind per-room locks; durability comes
//! from an append-only, CRC-framed WAL that is replayed on open and
//! compacted in the background. The crate is a library — request routing,
//! auth tokens and payments belong to the layer above.

pub mod compactor;
pub mod engine;
pub mod identity;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use engine::{Engine, EngineError};
pub use identity::{Caller, IdentityResolver};
pub use notify::{NotificationSink, NotifyHub};
