//! State management module - the reconciliation engine
//!
//! The StateStore turns the ordered stream of decoded envelopes into one
//! current, immutable snapshot and notifies subscribers after every
//! replacement. Topology and protocol changes are signalled explicitly so
//! consumers know when values alone are not enough.

mod events;
mod store;

pub use events::{HandleOutcome, StoreEvent, SubscriberFn, SubscriptionId};
pub use store::StateStore;
