use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use super::dispatcher::Dispatch;

/// Transformation a deferred action resolves to. It is applied to the state
/// current at resolution time, not the state the action started from.
pub type Updater<S> = Box<dyn FnOnce(&S) -> S + Send>;

/// Pending result of a deferred action.
pub type Deferred<S> = BoxFuture<'static, anyhow::Result<Updater<S>>>;

pub type SyncFn<S, P> = dyn Fn(&S, &P, &Dispatch<S, P>) -> S + Send + Sync;
pub type AsyncFn<S, P> = dyn Fn(&S, &P, &Dispatch<S, P>) -> Deferred<S> + Send + Sync;

/// The two shapes an action can take.
pub enum ActionKind<S, P> {
    /// Computes the next state directly.
    Sync(Arc<SyncFn<S, P>>),
    /// Starts asynchronous work that later yields an [`Updater`].
    Async(Arc<AsyncFn<S, P>>),
}

impl<S, P> Clone for ActionKind<S, P> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// What invoking an action produced.
pub(crate) enum Outcome<S> {
    Ready(S),
    Pending(Deferred<S>),
}

/// A named state transition.
///
/// Actions receive a snapshot of the store, the payload and the dispatch
/// handle of the container they run in, so they can dispatch follow-up
/// actions themselves.
///
/// ```
/// use dispatch_context::Action;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Counter {
///     count: i32,
/// }
///
/// let increment = Action::<Counter, ()>::sync(|store, _payload, _dispatch| Counter {
///     count: store.count + 1,
/// })
/// .named("increment");
///
/// assert_eq!(increment.name(), "increment");
/// assert!(!increment.is_async());
/// ```
pub struct Action<S, P = ()> {
    name: Cow<'static, str>,
    kind: ActionKind<S, P>,
}

impl<S, P> Action<S, P>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// An action that returns the next store value.
    ///
    /// The action is identified by its closure type until it is
    /// [`named`](Self::named).
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&S, &P, &Dispatch<S, P>) -> S + Send + Sync + 'static,
    {
        Self {
            name: Cow::Borrowed(std::any::type_name::<F>()),
            kind: ActionKind::Sync(Arc::new(f)),
        }
    }

    /// An action that resolves later to an [`Updater`].
    ///
    /// `f` runs synchronously at dispatch time; only the returned future is
    /// deferred, so anything it needs from the snapshot or payload has to
    /// be moved into it.
    pub fn deferred<F, Fut, U>(f: F) -> Self
    where
        F: Fn(&S, &P, &Dispatch<S, P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
        U: FnOnce(&S) -> S + Send + 'static,
    {
        let name = std::any::type_name::<F>();
        let deferred = move |store: &S, payload: &P, dispatch: &Dispatch<S, P>| -> Deferred<S> {
            f(store, payload, dispatch)
                .map(|resolved| resolved.map(|update| Box::new(update) as Updater<S>))
                .boxed()
        };
        Self {
            name: Cow::Borrowed(name),
            kind: ActionKind::Async(Arc::new(deferred)),
        }
    }

    /// Give the action the identifier used in diagnostics and errors.
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ActionKind<S, P> {
        &self.kind
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, ActionKind::Async(_))
    }

    pub(crate) fn invoke(&self, store: &S, payload: &P, dispatch: &Dispatch<S, P>) -> Outcome<S> {
        match &self.kind {
            ActionKind::Sync(f) => Outcome::Ready(f(store, payload, dispatch)),
            ActionKind::Async(f) => Outcome::Pending(f(store, payload, dispatch)),
        }
    }
}

impl<S, P> Clone for Action<S, P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<S, P> fmt::Debug for Action<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ActionKind::Sync(_) => "sync",
            ActionKind::Async(_) => "async",
        };
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(store: &i32, _payload: &(), _dispatch: &Dispatch<i32, ()>) -> i32 {
        store * 2
    }

    #[test]
    fn unnamed_action_is_identified_by_type() {
        let action = Action::sync(double);
        assert!(action.name().ends_with("double"), "{}", action.name());
        assert!(!action.is_async());
    }

    #[test]
    fn named_action_keeps_its_name() {
        let action = Action::sync(double).named("double_it");
        assert_eq!(action.name(), "double_it");
        assert_eq!(action.clone().name(), "double_it");
    }

    #[test]
    fn sync_action_is_ready_immediately() {
        let action = Action::sync(double);
        match action.invoke(&21, &(), &Dispatch::detached()) {
            Outcome::Ready(value) => assert_eq!(value, 42),
            Outcome::Pending(_) => panic!("sync action deferred its result"),
        }
    }

    #[test]
    fn deferred_action_resolves_to_updater() {
        let action = Action::<i32, ()>::deferred(|_store, _payload, _dispatch| async {
            anyhow::Ok(|current: &i32| current + 1)
        })
        .named("bump");
        assert!(action.is_async());

        let Outcome::Pending(pending) = action.invoke(&0, &(), &Dispatch::detached()) else {
            panic!("deferred action committed synchronously");
        };
        let update = futures::executor::block_on(pending).expect("resolves");
        assert_eq!(update(&10), 11);
    }

    #[test]
    fn debug_shows_name_and_kind() {
        let action = Action::sync(double).named("double_it");
        assert_eq!(
            format!("{action:?}"),
            r#"Action { name: "double_it", kind: "sync" }"#
        );
    }
}
