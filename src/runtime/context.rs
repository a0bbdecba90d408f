use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

/// Identity of a context, shared by all of its providers and consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One active provider: the context it provides and the type-erased
/// source consumers read from.
#[derive(Clone)]
pub(crate) struct Frame {
    context: ContextId,
    source: Arc<dyn Any + Send + Sync>,
}

impl Frame {
    pub(crate) fn new(context: ContextId, source: Arc<dyn Any + Send + Sync>) -> Self {
        Self { context, source }
    }
}

// Thread-local stack of active providers, innermost last.
thread_local! {
    static PROVIDER_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with `frame` pushed onto the provider stack.
///
/// The frame is popped even if `f` panics.
pub(crate) fn with_frame<F, R>(frame: Frame, f: F) -> R
where
    F: FnOnce() -> R,
{
    PROVIDER_STACK.with(|stack| {
        stack.borrow_mut().push(frame);
    });

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    PROVIDER_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

/// Find the innermost provider of `context` and downcast its source.
pub(crate) fn lookup<T>(context: ContextId) -> Option<Arc<T>>
where
    T: Any + Send + Sync,
{
    PROVIDER_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|frame| frame.context == context)
            .and_then(|frame| Arc::clone(&frame.source).downcast::<T>().ok())
    })
}

/// Number of providers currently active on this thread.
pub fn depth() -> usize {
    PROVIDER_STACK.with(|stack| stack.borrow().len())
}

/// A future that sees `frame` on the provider stack every time it is polled.
pub struct Provided<F> {
    frame: Frame,
    inner: Pin<Box<F>>,
}

impl<F> Provided<F> {
    pub(crate) fn new(frame: Frame, inner: F) -> Self {
        Self {
            frame,
            inner: Box::pin(inner),
        }
    }
}

impl<F: Future> Future for Provided<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let frame = this.frame.clone();
        let inner = this.inner.as_mut();
        with_frame(frame, move || inner.poll(cx))
    }
}
