//! Shared context: containers that own a store and consumers that read it.

mod container;

pub use container::{
    create_dispatch_context, Context, ContextConsumer, ContextContainer, ContextValue,
};
