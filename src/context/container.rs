use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::dispatch::{Dispatch, DispatchConfig, Payload};
use crate::runtime::{lookup, with_frame, ContextId, Frame, Provided};
use crate::store::{Store, Subscription};

/// The value every consumer observes: the current store and the dispatch
/// entry point of the container providing it.
pub struct ContextValue<S, P = ()> {
    pub store: S,
    pub dispatch: Dispatch<S, P>,
}

impl<S: Clone, P> Clone for ContextValue<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<S, P> fmt::Debug for ContextValue<S, P>
where
    S: fmt::Debug + Clone + Send + Sync + 'static,
    P: Payload,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextValue")
            .field("store", &self.store)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// What a container puts on the provider stack.
struct Source<S, P> {
    store: Store<S>,
    dispatch: Dispatch<S, P>,
}

impl<S, P> Source<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    fn value(&self) -> ContextValue<S, P> {
        ContextValue {
            store: self.store.get(),
            dispatch: self.dispatch.clone(),
        }
    }

    fn watch<F>(&self, render: F) -> Subscription
    where
        F: Fn(&ContextValue<S, P>) + Send + Sync + 'static,
    {
        let dispatch = self.dispatch.clone();
        self.store.watch(move |store| {
            render(&ContextValue {
                store: store.clone(),
                dispatch: dispatch.clone(),
            })
        })
    }
}

/// A context key together with the value consumers see when no container
/// is providing it: the default store and a dispatch that does nothing.
pub struct Context<S, P = ()> {
    id: ContextId,
    default: Arc<S>,
    _payload: std::marker::PhantomData<fn(P)>,
}

impl<S, P> Context<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    pub fn new(default: S) -> Self {
        Self {
            id: ContextId::next(),
            default: Arc::new(default),
            _payload: std::marker::PhantomData,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The value seen outside of any container.
    pub fn default_value(&self) -> ContextValue<S, P> {
        ContextValue {
            store: (*self.default).clone(),
            dispatch: Dispatch::detached(),
        }
    }

    pub fn consumer(&self) -> ContextConsumer<S, P> {
        ContextConsumer {
            context: self.clone(),
        }
    }
}

impl<S, P> Clone for Context<S, P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Arc::clone(&self.default),
            _payload: std::marker::PhantomData,
        }
    }
}

impl<S, P> fmt::Debug for Context<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

/// Subscription handle for reading a context from inside a container.
pub struct ContextConsumer<S, P = ()> {
    context: Context<S, P>,
}

impl<S, P> ContextConsumer<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    /// The value of the innermost container providing this context, or the
    /// context default when there is none.
    pub fn read(&self) -> ContextValue<S, P> {
        match self.source() {
            Some(source) => source.value(),
            None => self.context.default_value(),
        }
    }

    /// Whether a container for this context is in scope.
    pub fn is_provided(&self) -> bool {
        self.source().is_some()
    }

    /// Render with the current value now and again after every commit of
    /// the innermost container.
    ///
    /// The first render and the subscription are taken together, so a
    /// commit landing on another thread meanwhile is rendered after the
    /// first render and never lost.
    ///
    /// Outside of any container `render` runs once with the default value
    /// and the returned subscription is inert.
    pub fn watch<F>(&self, render: F) -> Subscription
    where
        F: Fn(&ContextValue<S, P>) + Send + Sync + 'static,
    {
        match self.source() {
            Some(source) => source.watch(render),
            None => {
                render(&self.context.default_value());
                Subscription::inert()
            }
        }
    }

    pub fn context(&self) -> &Context<S, P> {
        &self.context
    }

    fn source(&self) -> Option<Arc<Source<S, P>>> {
        lookup::<Source<S, P>>(self.context.id)
    }
}

impl<S, P> Clone for ContextConsumer<S, P> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

impl<S, P> fmt::Debug for ContextConsumer<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConsumer")
            .field("context", &self.context)
            .finish()
    }
}

/// Owner of the store for one context.
///
/// Children run inside [`provide`](Self::provide) or
/// [`provide_async`](Self::provide_async) and reach the container through a
/// [`ContextConsumer`]. Dropping the container tears the store down; deferred
/// updates that resolve afterwards are discarded.
pub struct ContextContainer<S, P = ()> {
    context: Context<S, P>,
    source: Arc<Source<S, P>>,
}

impl<S, P> ContextContainer<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    /// Mount a container for `context` holding `initial`.
    pub fn new(initial: S, context: &Context<S, P>) -> Self {
        Self::with_config(initial, context, DispatchConfig::default())
    }

    pub fn with_config(initial: S, context: &Context<S, P>, config: DispatchConfig) -> Self {
        let store = Store::new(initial);
        let dispatch = Dispatch::new(&store, config);
        Self {
            context: context.clone(),
            source: Arc::new(Source { store, dispatch }),
        }
    }

    /// Run `children` with this container visible to consumers.
    pub fn provide<F, R>(&self, children: F) -> R
    where
        F: FnOnce() -> R,
    {
        with_frame(self.frame(), children)
    }

    /// Wrap `children` so this container is visible whenever it is polled.
    pub fn provide_async<F>(&self, children: F) -> Provided<F>
    where
        F: Future,
    {
        Provided::new(self.frame(), children)
    }

    /// The current context value.
    pub fn value(&self) -> ContextValue<S, P> {
        self.source.value()
    }

    pub fn store(&self) -> &Store<S> {
        &self.source.store
    }

    pub fn dispatch(&self) -> Dispatch<S, P> {
        self.source.dispatch.clone()
    }

    pub fn consumer(&self) -> ContextConsumer<S, P> {
        self.context.consumer()
    }

    pub fn context(&self) -> &Context<S, P> {
        &self.context
    }

    fn frame(&self) -> Frame {
        let source: Arc<dyn std::any::Any + Send + Sync> = self.source.clone();
        Frame::new(self.context.id(), source)
    }
}

impl<S, P> fmt::Debug for ContextContainer<S, P>
where
    S: fmt::Debug + Clone + Send + Sync + 'static,
    P: Payload,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextContainer")
            .field("context", &self.context)
            .field("store", &self.source.store.get())
            .field("version", &self.source.store.version())
            .finish()
    }
}

/// Create a context whose default store is `initial`, together with a
/// consumer for it and a container already holding `initial`.
///
/// ```
/// use dispatch_context::{create_dispatch_context, Action, Dispatch};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Counter {
///     count: i32,
/// }
///
/// let (consumer, container) = create_dispatch_context::<Counter, ()>(Counter { count: 0 });
///
/// container.provide(|| {
///     let value = consumer.read();
///     let increment = Action::sync(|store: &Counter, _: &(), _: &Dispatch<Counter>| Counter {
///         count: store.count + 1,
///     });
///     value.dispatch.send(increment, ()).unwrap();
/// });
///
/// assert_eq!(container.value().store, Counter { count: 1 });
/// ```
pub fn create_dispatch_context<S, P>(initial: S) -> (ContextConsumer<S, P>, ContextContainer<S, P>)
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    let context = Context::new(initial.clone());
    let container = ContextContainer::new(initial, &context);
    (context.consumer(), container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Action;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Theme {
        name: String,
    }

    fn rename(name: &'static str) -> Action<Theme> {
        Action::sync(move |_store: &Theme, _payload: &(), _dispatch: &Dispatch<Theme>| Theme {
            name: name.to_string(),
        })
        .named("rename")
    }

    fn theme(name: &str) -> Theme {
        Theme {
            name: name.to_string(),
        }
    }

    #[test]
    fn consumer_outside_container_sees_default() {
        let (consumer, _container) = create_dispatch_context::<Theme, ()>(theme("light"));

        let value = consumer.read();
        assert_eq!(value.store, theme("light"));
        assert!(!value.dispatch.is_connected());
        assert!(!consumer.is_provided());

        value.dispatch.send(rename("dark"), ()).unwrap();
        assert_eq!(consumer.read().store, theme("light"));
    }

    #[test]
    fn consumer_inside_container_sees_live_store() {
        let (consumer, container) = create_dispatch_context::<Theme, ()>(theme("light"));

        container.provide(|| {
            let value = consumer.read();
            assert_eq!(value.store, theme("light"));
            assert!(value.dispatch.is_connected());

            value.dispatch.send(rename("dark"), ()).unwrap();
            assert_eq!(consumer.read().store, theme("dark"));
        });

        assert_eq!(container.value().store, theme("dark"));
    }

    #[test]
    fn nested_container_shadows_outer() {
        let context = Context::<Theme, ()>::new(theme("default"));
        let outer = ContextContainer::new(theme("outer"), &context);
        let inner = ContextContainer::new(theme("inner"), &context);
        let consumer = context.consumer();

        outer.provide(|| {
            assert_eq!(consumer.read().store, theme("outer"));
            inner.provide(|| {
                assert_eq!(consumer.read().store, theme("inner"));
                consumer.read().dispatch.send(rename("changed"), ()).unwrap();
            });
            assert_eq!(consumer.read().store, theme("outer"));
        });

        assert_eq!(inner.value().store, theme("changed"));
        assert_eq!(outer.value().store, theme("outer"));
    }

    #[test]
    fn watch_renders_now_and_after_each_commit() {
        let (consumer, container) = create_dispatch_context::<Theme, ()>(theme("light"));
        let rendered = Arc::new(Mutex::new(Vec::new()));

        let subscription = container.provide(|| {
            let rendered = rendered.clone();
            consumer.watch(move |value| rendered.lock().unwrap().push(value.store.name.clone()))
        });

        container.dispatch().send(rename("dark"), ()).unwrap();
        container.dispatch().send(rename("dim"), ()).unwrap();
        drop(subscription);
        container.dispatch().send(rename("off"), ()).unwrap();

        assert_eq!(*rendered.lock().unwrap(), vec!["light", "dark", "dim"]);
    }

    #[test]
    fn watch_mounted_during_dispatches_misses_no_commit() {
        let (consumer, container) = create_dispatch_context::<u64, ()>(0);
        let bump = || {
            Action::<u64, ()>::sync(|count: &u64, _: &(), _: &Dispatch<u64>| count + 1)
                .named("bump")
        };

        let dispatch = container.dispatch();
        let writer = std::thread::spawn(move || {
            for _ in 0..200 {
                dispatch.send(bump(), ()).unwrap();
            }
        });
        std::thread::sleep(std::time::Duration::from_micros(50));

        let rendered = Arc::new(Mutex::new(Vec::new()));
        let _subscription = container.provide(|| {
            let rendered = rendered.clone();
            consumer.watch(move |value| rendered.lock().unwrap().push(value.store))
        });
        writer.join().unwrap();

        let rendered = rendered.lock().unwrap();
        assert!(
            rendered.windows(2).all(|pair| pair[0] + 1 == pair[1]),
            "renders skipped or repeated a commit: {rendered:?}"
        );
        assert_eq!(rendered.last(), Some(&200));
    }

    #[test]
    fn watch_outside_container_renders_default_once() {
        let (consumer, _container) = create_dispatch_context::<Theme, ()>(theme("light"));
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();

        let _subscription = consumer.watch(move |value| {
            assert_eq!(value.store, theme("light"));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unrelated_context_is_not_visible() {
        let (consumer, _container) = create_dispatch_context::<Theme, ()>(theme("mine"));
        let (_other_consumer, other) = create_dispatch_context::<Theme, ()>(theme("theirs"));

        other.provide(|| {
            assert!(!consumer.is_provided());
            assert_eq!(consumer.read().store, theme("mine"));
        });
    }

    #[tokio::test]
    async fn provide_async_is_visible_across_awaits() {
        let (consumer, container) = create_dispatch_context::<Theme, ()>(theme("light"));

        let seen = container
            .provide_async(async move {
                tokio::task::yield_now().await;
                consumer.read().store
            })
            .await;

        assert_eq!(seen, theme("light"));
    }

    #[test]
    fn dropping_container_disconnects_dispatch() {
        let (consumer, container) = create_dispatch_context::<Theme, ()>(theme("light"));
        let dispatch = container.provide(|| consumer.read().dispatch);

        assert!(dispatch.is_connected());
        drop(container);
        assert!(!dispatch.is_connected());
        assert!(dispatch.send(rename("dark"), ()).unwrap().is_settled());
    }
}
