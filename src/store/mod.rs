//! State containers with serialized commits.
//!
//! A store owns the application state, replaces it wholesale on every
//! commit and notifies its subscribers afterwards.

mod store;

pub use store::{Store, Subscription, WeakStore};
