//! # dispatch-context
//!
//! Reducer-style dispatch wired into a shared context.
//!
//! A [`ContextContainer`] owns a store and exposes it, together with a
//! [`Dispatch`] entry point, to every [`ContextConsumer`] running inside it.
//! Consumers trigger transitions by dispatching [`Action`]s with a payload.
//!
//! ## Context (propagation)
//!
//! - `Context<S, P>` - A context key with its default value
//! - `ContextContainer<S, P>` - Owns the store and provides it to children
//! - `ContextConsumer<S, P>` - Reads or watches the innermost container
//!
//! ## Dispatch (transitions)
//!
//! - `Action<S, P>` - Synchronous or deferred state transitions
//! - `Dispatch<S, P>` - Runs lists of actions against the container's store
//! - `DispatchHandle` - Joinable deferred work of one dispatch call
//!
//! Every action invocation emits a `tracing` event at INFO level carrying
//! the action identifier and the payload.
//!
//! ```
//! use dispatch_context::{create_dispatch_context, Action, Dispatch};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Counter {
//!     count: i32,
//! }
//!
//! let (consumer, container) = create_dispatch_context::<Counter, ()>(Counter { count: 0 });
//! let increment = Action::sync(|store: &Counter, _: &(), _: &Dispatch<Counter>| Counter {
//!     count: store.count + 1,
//! })
//! .named("increment");
//!
//! container.provide(|| {
//!     consumer.read().dispatch.send(increment, ()).unwrap();
//!     assert_eq!(consumer.read().store, Counter { count: 1 });
//! });
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use context::{create_dispatch_context, Context, ContextConsumer, ContextContainer, ContextValue};
pub use dispatch::{
    Action, ActionKind, BoundDispatch, Dispatch, DispatchConfig, DispatchHandle, DispatchMode,
    Event, Payload, Updater,
};
pub use error::DispatchError;
pub use store::{Store, Subscription, WeakStore};
