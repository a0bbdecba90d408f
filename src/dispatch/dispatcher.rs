use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument, Span};

use super::action::{Action, Deferred, Outcome};
use super::config::{DispatchConfig, DispatchMode};
use super::payload::Payload;
use crate::error::{DispatchError, Result};
use crate::store::{Store, WeakStore};

/// Entry point for triggering store transitions.
///
/// A `Dispatch` is cheap to clone and never keeps its store alive. Once the
/// owning container is gone every call is a no-op, and so is a call on a
/// [`detached`](Self::detached) handle.
pub struct Dispatch<S, P = ()> {
    store: WeakStore<S>,
    config: DispatchConfig,
    _payload: PhantomData<fn(P)>,
}

impl<S, P> Dispatch<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    pub(crate) fn new(store: &Store<S>, config: DispatchConfig) -> Self {
        Self {
            store: store.downgrade(),
            config,
            _payload: PhantomData,
        }
    }

    /// A handle bound to no store. Dispatching through it does nothing.
    pub fn detached() -> Self {
        Self {
            store: WeakStore::new(),
            config: DispatchConfig::default(),
            _payload: PhantomData,
        }
    }

    /// Whether the store this handle commits to still exists.
    pub fn is_connected(&self) -> bool {
        self.store.upgrade().is_some()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Bind a list of actions; the returned dispatcher runs them for a payload.
    pub fn actions<I>(&self, actions: I) -> BoundDispatch<S, P>
    where
        I: IntoIterator<Item = Action<S, P>>,
    {
        BoundDispatch {
            dispatch: self.clone(),
            actions: actions.into_iter().collect(),
        }
    }

    /// Bind a single action.
    pub fn action(&self, action: Action<S, P>) -> BoundDispatch<S, P> {
        self.actions([action])
    }

    /// Run one action with `payload`.
    pub fn send(&self, action: Action<S, P>, payload: P) -> Result<DispatchHandle> {
        self.action(action).call(payload)
    }
}

impl<S, P> Clone for Dispatch<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            _payload: PhantomData,
        }
    }
}

impl<S, P> fmt::Debug for Dispatch<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("connected", &self.is_connected())
            .field("mode", &self.config.mode)
            .finish()
    }
}

/// A list of actions waiting for its payload.
pub struct BoundDispatch<S, P = ()> {
    dispatch: Dispatch<S, P>,
    actions: Vec<Action<S, P>>,
}

impl<S, P> BoundDispatch<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    pub fn actions(&self) -> &[Action<S, P>] {
        &self.actions
    }

    /// Run every bound action with `payload`.
    ///
    /// Synchronous work (diagnostics, persist hooks, action bodies and the
    /// commits of synchronous actions) happens before this returns.
    /// Deferred updates run on the current tokio runtime; the returned
    /// handle can be joined to wait for them or dropped to let them finish
    /// on their own.
    ///
    /// A panic inside a synchronous action propagates to the caller.
    pub fn call(&self, payload: P) -> Result<DispatchHandle> {
        let Some(store) = self.dispatch.store.upgrade() else {
            debug!(
                actions = self.actions.len(),
                "dispatch without a mounted container ignored"
            );
            return Ok(DispatchHandle::settled());
        };

        let runtime = match self.actions.iter().find(|action| action.is_async()) {
            Some(action) => Some(Handle::try_current().map_err(|_| DispatchError::NoRuntime {
                action: action.name().to_owned(),
            })?),
            None => None,
        };

        let payload = Arc::new(payload);
        match self.dispatch.config.mode {
            DispatchMode::Concurrent => self.run_concurrent(&store, payload, runtime.as_ref()),
            DispatchMode::Sequential => self.run_sequential(&store, payload, runtime.as_ref()),
        }
    }

    fn run_concurrent(
        &self,
        store: &Store<S>,
        payload: Arc<P>,
        runtime: Option<&Handle>,
    ) -> Result<DispatchHandle> {
        let mut handle = DispatchHandle::settled();
        for action in &self.actions {
            match begin(action, store, &*payload, &self.dispatch) {
                Outcome::Ready(next) => commit(action.name(), store, next),
                Outcome::Pending(pending) => {
                    let name = action.name().to_owned();
                    let task = settle(name.clone(), store.downgrade(), pending);
                    handle.spawn(runtime, name, task)?;
                }
            }
        }
        Ok(handle)
    }

    fn run_sequential(
        &self,
        store: &Store<S>,
        payload: Arc<P>,
        runtime: Option<&Handle>,
    ) -> Result<DispatchHandle> {
        let mut handle = DispatchHandle::settled();
        let mut queue = self.actions.iter();
        while let Some(action) = queue.next() {
            match begin(action, store, &*payload, &self.dispatch) {
                Outcome::Ready(next) => commit(action.name(), store, next),
                Outcome::Pending(pending) => {
                    let name = action.name().to_owned();
                    let task = settle_in_order(
                        name.clone(),
                        pending,
                        queue.cloned().collect(),
                        store.downgrade(),
                        payload,
                        self.dispatch.clone(),
                    );
                    handle.spawn(runtime, name, task)?;
                    break;
                }
            }
        }
        Ok(handle)
    }
}

impl<S, P> fmt::Debug for BoundDispatch<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundDispatch")
            .field("actions", &self.actions)
            .finish()
    }
}

/// Log the action, fire the payload's persist hook and invoke the action
/// against a snapshot of the store.
fn begin<S, P>(
    action: &Action<S, P>,
    store: &Store<S>,
    payload: &P,
    dispatch: &Dispatch<S, P>,
) -> Outcome<S>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    info!(
        target: "dispatch_context::dispatch",
        action = %action.name(),
        payload = ?payload,
        "dispatching action"
    );
    if let Some(persist) = payload.persist_hook() {
        persist();
    }
    let snapshot = store.get();
    action.invoke(&snapshot, payload, dispatch)
}

fn commit<S>(action: &str, store: &Store<S>, next: S)
where
    S: Clone + Send + Sync + 'static,
{
    store.set(next);
    debug!(action, version = store.version(), "committed");
}

/// Wait for a deferred action and apply its updater to the state current
/// at resolution time.
async fn settle<S>(action: String, store: WeakStore<S>, pending: Deferred<S>) -> Result<()>
where
    S: Clone + Send + Sync + 'static,
{
    let update = match pending.await {
        Ok(update) => update,
        Err(source) => {
            error!(action = %action, error = %source, "deferred action failed");
            return Err(DispatchError::Action { action, source });
        }
    };

    match store.upgrade() {
        Some(store) => {
            store.replace_with(update);
            debug!(action = %action, version = store.version(), "committed deferred update");
        }
        None => debug!(
            action = %action,
            "container dropped before deferred action resolved; update discarded"
        ),
    }
    Ok(())
}

/// Settle `pending`, then run `rest` one after another, waiting for each
/// deferred action before starting the next.
async fn settle_in_order<S, P>(
    action: String,
    pending: Deferred<S>,
    rest: Vec<Action<S, P>>,
    store: WeakStore<S>,
    payload: Arc<P>,
    dispatch: Dispatch<S, P>,
) -> Result<()>
where
    S: Clone + Send + Sync + 'static,
    P: Payload,
{
    settle(action, store.clone(), pending).await?;

    for action in rest {
        let Some(live) = store.upgrade() else {
            debug!(action = %action.name(), "container dropped; remaining actions skipped");
            return Ok(());
        };
        match begin(&action, &live, &*payload, &dispatch) {
            Outcome::Ready(next) => commit(action.name(), &live, next),
            Outcome::Pending(pending) => {
                drop(live);
                settle(action.name().to_owned(), store.clone(), pending).await?;
            }
        }
    }
    Ok(())
}

/// Deferred work started by one dispatch call.
///
/// Dropping the handle detaches the work; it still runs to completion.
pub struct DispatchHandle {
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
}

impl DispatchHandle {
    fn settled() -> Self {
        Self { tasks: Vec::new() }
    }

    fn spawn<F>(&mut self, runtime: Option<&Handle>, action: String, task: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let Some(runtime) = runtime else {
            return Err(DispatchError::NoRuntime { action });
        };
        let join = runtime.spawn(task.instrument(Span::current()));
        self.tasks.push((action, join));
        Ok(())
    }

    /// Number of spawned tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tasks
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .count()
    }

    pub fn is_settled(&self) -> bool {
        self.pending() == 0
    }

    /// Wait for every deferred update of the call.
    ///
    /// Updates that succeeded stay committed even if others failed.
    pub async fn join(self) -> Result<()> {
        let (actions, tasks): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = join_all(tasks).await;

        let mut failures: Vec<DispatchError> = actions
            .into_iter()
            .zip(results)
            .filter_map(|(action, result)| match result {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(join) if join.is_panic() => Some(DispatchError::Panicked { action }),
                Err(_) => Some(DispatchError::Cancelled { action }),
            })
            .collect();

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(DispatchError::Multiple(failures)),
        }
    }

    /// Let the deferred work finish on its own.
    pub fn detach(self) {}
}

impl fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle")
            .field(
                "actions",
                &self.tasks.iter().map(|(action, _)| action).collect::<Vec<_>>(),
            )
            .field("pending", &self.pending())
            .finish()
    }
}
