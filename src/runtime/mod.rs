//! Context propagation.
//!
//! Containers push themselves onto a thread-local provider stack while
//! their children run; consumers resolve the innermost provider of their
//! context, falling back to the context's default value.

mod context;

pub use context::{depth, ContextId, Provided};
pub(crate) use context::{lookup, with_frame, Frame};
