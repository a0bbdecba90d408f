//! Actions, payloads and the dispatcher that runs them against a store.
//!
//! - [`Action`]: a named transition, either synchronous or deferred
//! - [`Payload`]: data passed to every action, with an optional persist hook
//! - [`Dispatch`]: the stable entry point handed to consumers and actions
//! - [`DispatchHandle`]: the joinable deferred work of one dispatch call

mod action;
mod config;
mod dispatcher;
mod payload;

pub use action::{Action, ActionKind, AsyncFn, Deferred, SyncFn, Updater};
pub use config::{DispatchConfig, DispatchMode};
pub use dispatcher::{BoundDispatch, Dispatch, DispatchHandle};
pub use payload::{Event, Payload, PersistHook};
