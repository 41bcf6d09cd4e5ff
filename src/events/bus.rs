//! Keyed callback registry.
//!
//! Subscribers register for one event kind or for every kind. Publishing
//! runs kind-specific subscribers first, then the catch-all ones. Sync
//! subscribers run inline on the publishing task; async subscribers are
//! spawned on the current tokio runtime. A panicking subscriber is logged
//! and skipped, the rest still run.

use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type SyncCallback<E> = Arc<dyn Fn(&E) + Send + Sync>;
type AsyncCallback<E> = Arc<dyn Fn(E) -> BoxFuture + Send + Sync>;

/// Events that can be routed by kind.
pub trait Keyed: Clone + Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

pub type SubscriberId = u64;

#[derive(Clone)]
enum Callback<E> {
    Sync(SyncCallback<E>),
    Async(AsyncCallback<E>),
}

#[derive(Clone)]
struct Subscriber<E: Keyed> {
    id: SubscriberId,
    filter: Option<E::Kind>,
    callback: Callback<E>,
}

pub struct EventBus<E: Keyed> {
    name: &'static str,
    subscribers: RwLock<Vec<Subscriber<E>>>,
    next_id: AtomicU64,
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<E: Keyed> EventBus<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback. `None` subscribes to every kind.
    pub fn subscribe<F>(&self, filter: Option<E::Kind>, callback: F) -> SubscriberId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(filter, Callback::Sync(Arc::new(callback)))
    }

    /// Register a callback whose work runs as its own task.
    pub fn subscribe_async<F, Fut>(&self, filter: Option<E::Kind>, callback: F) -> SubscriberId
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(
            filter,
            Callback::Async(Arc::new(move |event| Box::pin(callback(event)) as BoxFuture)),
        )
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Deliver `event` to every matching subscriber.
    pub fn publish(&self, event: &E) {
        let kind = event.kind();
        // snapshot so callbacks may (un)subscribe without deadlocking
        let targets: Vec<Subscriber<E>> = {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            let specific = subs.iter().filter(|s| s.filter == Some(kind));
            let wildcard = subs.iter().filter(|s| s.filter.is_none());
            specific.chain(wildcard).cloned().collect()
        };

        for sub in targets {
            match &sub.callback {
                Callback::Sync(cb) => {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| cb(event))) {
                        tracing::warn!(
                            "{}: subscriber {} for {:?} panicked: {}",
                            self.name,
                            sub.id,
                            kind,
                            panic_message(panic)
                        );
                    }
                }
                Callback::Async(cb) => self.spawn_async(sub.id, kind, cb(event.clone())),
            }
        }
    }

    fn spawn_async(&self, id: SubscriberId, kind: E::Kind, fut: BoxFuture) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                tracing::warn!("{}: no runtime for async subscriber {} ({:?})", self.name, id, kind);
                return;
            }
        };
        let name = self.name;
        let task = handle.spawn(fut);
        handle.spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::warn!(
                        "{}: async subscriber {} for {:?} panicked: {}",
                        name,
                        id,
                        kind,
                        panic_message(e.into_panic())
                    );
                }
            }
        });
    }

    fn insert(&self, filter: Option<E::Kind>, callback: Callback<E>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber { id, filter, callback });
        id
    }
}
