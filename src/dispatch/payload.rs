use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Zero-argument hook a payload may expose.
pub type PersistHook = dyn Fn() + Send + Sync;

/// Data passed through to every action of a dispatch call.
///
/// A payload may expose a persist hook, which the dispatcher calls before
/// each action computes its new state. UI events use it to mark themselves
/// as retained before asynchronous work proceeds.
pub trait Payload: fmt::Debug + Send + Sync + 'static {
    fn persist_hook(&self) -> Option<&PersistHook> {
        None
    }
}

macro_rules! impl_plain_payload {
    ($($ty:ty),* $(,)?) => {
        $(impl Payload for $ty {})*
    };
}

impl_plain_payload!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    f32,
    f64,
    String,
    &'static str,
);

impl<P: Payload> Payload for Option<P> {
    fn persist_hook(&self) -> Option<&PersistHook> {
        self.as_ref().and_then(Payload::persist_hook)
    }
}

impl<P: fmt::Debug + Send + Sync + 'static> Payload for Vec<P> {}

impl<P: Payload> Payload for Arc<P> {
    fn persist_hook(&self) -> Option<&PersistHook> {
        (**self).persist_hook()
    }
}

/// A payload carrying a persist hook.
///
/// ```
/// use dispatch_context::{Event, Payload};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let persisted = Arc::new(AtomicBool::new(false));
/// let flag = persisted.clone();
/// let event = Event::new("click").on_persist(move || flag.store(true, Ordering::SeqCst));
///
/// if let Some(hook) = event.persist_hook() {
///     hook();
/// }
/// assert!(persisted.load(Ordering::SeqCst));
/// assert_eq!(*event, "click");
/// ```
pub struct Event<P> {
    data: P,
    persist: Option<Arc<PersistHook>>,
}

impl<P> Event<P> {
    pub fn new(data: P) -> Self {
        Self {
            data,
            persist: None,
        }
    }

    /// Attach the persist hook.
    #[must_use]
    pub fn on_persist<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.persist = Some(Arc::new(hook));
        self
    }

    pub fn data(&self) -> &P {
        &self.data
    }

    pub fn into_data(self) -> P {
        self.data
    }
}

impl<P> Deref for Event<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.data
    }
}

impl<P: Clone> Clone for Event<P> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            persist: self.persist.clone(),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for Event<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("data", &self.data)
            .field("persist", &self.persist.is_some())
            .finish()
    }
}

impl<P: fmt::Debug + Send + Sync + 'static> Payload for Event<P> {
    fn persist_hook(&self) -> Option<&PersistHook> {
        self.persist.as_deref()
    }
}
