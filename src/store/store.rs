use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::thread::{self, ThreadId};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    /// Commit version current when the subscriber registered. Older
    /// snapshots still queued are not delivered to it.
    since: u64,
    callback: Subscriber<T>,
}

/// Shared state behind every clone of a [`Store`].
pub(crate) struct StoreInner<T> {
    state: RwLock<T>,
    subscribers: RwLock<Vec<Entry<T>>>,
    next_subscriber: AtomicU64,
    version: AtomicU64,
    /// Committed snapshots waiting for delivery, in commit order.
    pending: Mutex<VecDeque<(u64, T)>>,
    /// Held by whichever thread is delivering.
    delivery: Mutex<()>,
    deliverer: Mutex<Option<ThreadId>>,
}

impl<T> StoreInner<T> {
    fn state(&self) -> RwLockReadGuard<'_, T> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<(u64, T)>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliverer(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.deliverer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribers that registered before `version` was committed.
    fn subscribers_for(&self, version: u64) -> Vec<Subscriber<T>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.since < version)
            .map(|entry| Arc::clone(&entry.callback))
            .collect()
    }

    fn is_delivering(&self) -> bool {
        *self.deliverer() == Some(thread::current().id())
    }

    /// Run `f` while holding the delivery turn.
    ///
    /// A thread that already holds the turn (a subscriber touching the store
    /// from inside its callback) runs `f` directly.
    fn serialized<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.is_delivering() {
            return f();
        }
        let _turn = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        *self.deliverer() = Some(thread::current().id());
        let _release = ReleaseTurn(&self.deliverer);
        f()
    }
}

/// Clears the deliverer on scope exit, unwinding included.
struct ReleaseTurn<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for ReleaseTurn<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Removal hook used by [`Subscription`] without knowing the store's type.
trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

impl<T: Send + Sync> Unsubscribe for StoreInner<T> {
    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|entry| entry.id != id);
    }
}

/// A thread-safe store for managing application state.
///
/// Every write is a commit: the whole value is replaced, the commit
/// version is bumped and a snapshot is queued for the subscribers.
/// Snapshots are delivered one at a time in commit order, so concurrent
/// writers never make a subscriber observe an older state after a newer
/// one. Subscribers run after the state lock is released and may read from
/// or write to the store again; a write made from inside a subscriber is
/// delivered once the current snapshot has reached every subscriber.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    /// Create a new store with the given initial state.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(initial),
                subscribers: RwLock::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                version: AtomicU64::new(0),
                pending: Mutex::new(VecDeque::new()),
                delivery: Mutex::new(()),
                deliverer: Mutex::new(None),
            }),
        }
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> T {
        self.inner.state().clone()
    }

    /// Read state without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&*self.inner.state())
    }

    /// Replace the state wholesale.
    pub fn set(&self, new_state: T) {
        {
            let mut state = self.inner.state_mut();
            *state = new_state;
            self.commit(&state);
        }
        self.deliver();
    }

    /// Update the state in place.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        {
            let mut state = self.inner.state_mut();
            f(&mut *state);
            self.commit(&state);
        }
        self.deliver();
    }

    /// Derive the next state from the current one.
    ///
    /// `f` runs while the write lock is held, so it observes every commit
    /// that happened before it and no commit can slip in between the read
    /// and the write. It must not touch the store itself.
    pub fn replace_with<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        {
            let mut state = self.inner.state_mut();
            *state = f(&*state);
            self.commit(&state);
        }
        self.deliver();
    }

    /// Subscribe to state changes.
    ///
    /// The callback is called after every later commit until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(Arc::new(callback), false)
    }

    /// Call `callback` with the current state, then after every later
    /// commit.
    ///
    /// Registration and the first call happen in one delivery turn: no
    /// commit is missed between them and none arrives ahead of the first
    /// call.
    pub fn watch<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(Arc::new(callback), true)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of commits since the store was created.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// A handle that does not keep the store alive.
    pub fn downgrade(&self) -> WeakStore<T> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn register(&self, callback: Subscriber<T>, call_now: bool) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);

        self.inner.serialized(|| {
            let current = {
                // The read lock keeps commits out until the entry is in place.
                let state = self.inner.state();
                self.inner
                    .subscribers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(Entry {
                        id,
                        since: self.inner.version.load(Ordering::SeqCst),
                        callback: Arc::clone(&callback),
                    });
                call_now.then(|| state.clone())
            };
            if let Some(current) = current {
                callback(&current);
            }
        });

        let inner: Arc<dyn Unsubscribe> = self.inner.clone();
        Subscription {
            id,
            store: Some(Arc::downgrade(&inner)),
        }
    }

    /// Called with the write lock held.
    fn commit(&self, state: &T) {
        let version = self.inner.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.pending().push_back((version, state.clone()));
    }

    /// Drain the queue. Returns once every snapshot queued so far has been
    /// delivered, unless called from inside a subscriber, in which case the
    /// outer delivery loop picks the new snapshot up.
    fn deliver(&self) {
        if self.inner.is_delivering() {
            return;
        }
        self.inner.serialized(|| loop {
            let Some((version, snapshot)) = self.inner.pending().pop_front() else {
                break;
            };
            for subscriber in self.inner.subscribers_for(version) {
                subscriber(&snapshot);
            }
        });
    }
}


impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Non-owning handle to a [`Store`].
///
/// Deferred work holds one of these so that a store torn down in the
/// meantime simply stops receiving commits.
pub struct WeakStore<T> {
    inner: Weak<StoreInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> WeakStore<T> {
    /// A handle that never upgrades.
    pub fn new() -> Self {
        Self { inner: Weak::new() }
    }

    pub fn upgrade(&self) -> Option<Store<T>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<T: Clone + Send + Sync + 'static> Default for WeakStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WeakStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// RAII guard for store subscribers.
///
/// Dropping the guard removes the subscriber.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    store: Option<Weak<dyn Unsubscribe>>,
}

impl Subscription {
    /// A subscription attached to nothing.
    pub(crate) fn inert() -> Self {
        Self { id: 0, store: None }
    }

    /// Keep the subscriber registered for as long as the store lives.
    pub fn detach(mut self) {
        self.store = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.take().and_then(|store| store.upgrade()) {
            store.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    struct AppState {
        count: usize,
        name: String,
    }

    fn app_store() -> Store<AppState> {
        Store::new(AppState {
            count: 0,
            name: "test".to_string(),
        })
    }

    #[test]
    fn store_get_set() {
        let store = app_store();
        assert_eq!(store.get().count, 0);

        store.set(AppState {
            count: 42,
            name: "updated".to_string(),
        });

        assert_eq!(store.get().count, 42);
        assert_eq!(store.get().name, "updated");
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn store_update_and_replace_with() {
        let store = app_store();

        store.update(|state| state.count += 10);
        store.replace_with(|state| AppState {
            count: state.count * 2,
            ..state.clone()
        });

        assert_eq!(store.get().count, 20);
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn store_subscribe() {
        let store = app_store();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let _subscription = store.subscribe(move |_state| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        store.update(|state| state.count += 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        store.update(|state| state.count += 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let store = app_store();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let subscription = store.subscribe(move |_state| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(store.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(store.subscriber_count(), 0);

        store.update(|state| state.count += 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let store = app_store();
        store.subscribe(|_state| {}).detach();
        assert_eq!(store.subscriber_count(), 1);
    }

    #[test]
    fn subscriber_may_write_back() {
        let store = Store::new(0usize);
        let writer = store.clone();

        store
            .subscribe(move |value| {
                if *value < 3 {
                    writer.set(value + 1);
                }
            })
            .detach();

        store.set(1);
        assert_eq!(store.get(), 3);
    }

    #[test]
    fn concurrent_commits_reach_subscribers_in_order() {
        let store = Store::new(0usize);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let _subscription = store.subscribe(move |value| {
            // Slow renders widen the window between commit and delivery.
            if value % 7 == 0 {
                thread::sleep(Duration::from_micros(200));
            }
            sink.lock().unwrap().push(*value);
        });

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        store.replace_with(|value| value + 1);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), (1..=400).collect::<Vec<_>>());
    }

    #[test]
    fn watch_calls_immediately_then_on_commit() {
        let store = Store::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let _subscription = store.watch(move |value| sink.lock().unwrap().push(*value));
        store.set(2);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn watch_started_during_commits_never_goes_back() {
        let store = Store::new(0usize);
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    store.replace_with(|value| value + 1);
                }
            })
        };
        thread::sleep(Duration::from_micros(50));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = store.watch(move |value| sink.lock().unwrap().push(*value));
        writer.join().unwrap();

        let seen = seen.lock().unwrap();
        assert!(
            seen.windows(2).all(|pair| pair[0] + 1 == pair[1]),
            "renders skipped or repeated a commit: {seen:?}"
        );
        assert_eq!(seen.last(), Some(&200));
    }

    #[test]
    fn subscriber_may_subscribe_while_delivering() {
        let store = Store::new(0);
        let inner = store.clone();
        let nested = Arc::new(Mutex::new(Vec::new()));
        let keep = nested.clone();

        let _outer = store.subscribe(move |value| {
            if *value == 1 {
                let sink = keep.clone();
                inner
                    .watch(move |value| sink.lock().unwrap().push(*value))
                    .detach();
            }
        });

        store.set(1);
        store.set(2);
        assert_eq!(*nested.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn weak_store_stops_upgrading_after_drop() {
        let store = Store::new(1);
        let weak = store.downgrade();
        assert!(weak.upgrade().is_some());

        drop(store);
        assert!(weak.upgrade().is_none());
        assert!(WeakStore::<i32>::new().upgrade().is_none());
    }
}
