//! Live feeds over store subscriptions, and the handles that end them.
//!
//! Every push is a full result set, so a feed maps each push on its own and
//! hands the whole mapped value to its callback. Nothing is merged.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use goldconnect_store::{Document, DocumentStore, Query};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribing,
    Live,
    Unsubscribed,
}

const SUBSCRIBING: u8 = 0;
const LIVE: u8 = 1;
const UNSUBSCRIBED: u8 = 2;

thread_local! {
    /// Address of the flag whose callback is running on this thread.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug)]
struct Flag {
    state: AtomicU8,
    /// Held for the duration of each callback.
    gate: Mutex<()>,
}

impl Flag {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SUBSCRIBING),
            gate: Mutex::new(()),
        }
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    fn delivering_here(&self) -> bool {
        DELIVERING.with(|d| d.get() == self.addr())
    }

    /// Run `callback` under the gate if still live. Returns false once the
    /// feed is closed.
    fn deliver(&self, callback: impl FnOnce()) -> bool {
        let Ok(_gate) = self.gate.lock() else {
            return false;
        };
        if !self.is_live() {
            return false;
        }
        let previous = DELIVERING.with(|d| d.replace(self.addr()));
        callback();
        DELIVERING.with(|d| d.set(previous));
        true
    }

    /// Block until a callback running on another thread has returned.
    fn wait_idle(&self) {
        if !self.delivering_here() {
            drop(self.gate.lock());
        }
    }

    fn state(&self) -> SubscriptionState {
        match self.state.load(Ordering::Acquire) {
            SUBSCRIBING => SubscriptionState::Subscribing,
            LIVE => SubscriptionState::Live,
            _ => SubscriptionState::Unsubscribed,
        }
    }

    fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == LIVE
    }

    fn go_live(&self) -> bool {
        self.state
            .compare_exchange(SUBSCRIBING, LIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns false if already unsubscribed.
    fn close(&self) -> bool {
        self.state.swap(UNSUBSCRIBED, Ordering::AcqRel) != UNSUBSCRIBED
    }
}

/// Owner of one live feed. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    label: &'static str,
    flag: Arc<Flag>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            flag: Arc::new(Flag::new()),
            task: Mutex::new(None),
        }
    }

    /// A handle that never delivers anything.
    pub(crate) fn inert(label: &'static str) -> Self {
        let handle = Self::new(label);
        handle.flag.close();
        handle
    }

    pub fn state(&self) -> SubscriptionState {
        self.flag.state()
    }

    pub fn is_live(&self) -> bool {
        self.flag.is_live()
    }

    /// Stop the feed. No callback runs after this returns: a callback
    /// already running on another thread is waited for. Called from inside
    /// the feed's own callback, it returns at once and that callback is the
    /// last. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        if !self.flag.close() {
            return;
        }
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
        self.flag.wait_idle();
        debug!(feed = self.label, "unsubscribed");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Subscribe to `query`, then run `map` on every push and hand the result to
/// `on_update`.
pub(crate) async fn spawn_feed<T, M, C>(
    store: &dyn DocumentStore,
    label: &'static str,
    query: Query,
    map: M,
    mut on_update: C,
) -> Result<SubscriptionHandle>
where
    T: Send + 'static,
    M: Fn(&[Document]) -> T + Send + 'static,
    C: FnMut(T) + Send + 'static,
{
    let handle = SubscriptionHandle::new(label);
    let mut subscription = match store.subscribe(query).await {
        Ok(sub) => sub,
        Err(e) => {
            handle.flag.close();
            warn!(feed = label, error = %e, "subscription failed");
            return Err(e.into());
        }
    };

    handle.flag.go_live();
    debug!(feed = label, "subscription live");

    let flag = handle.flag.clone();
    let task = tokio::spawn(async move {
        while let Some(docs) = subscription.next().await {
            if !flag.is_live() {
                return;
            }
            let value = map(&docs);
            if !flag.deliver(|| on_update(value)) {
                return;
            }
        }
        if flag.close() {
            debug!(feed = label, "store closed the feed");
        }
    });

    if let Ok(mut slot) = handle.task.lock() {
        *slot = Some(task);
    }
    Ok(handle)
}

#[derive(Debug, Default)]
struct ScopeInner {
    disposed: AtomicBool,
    handles: Mutex<Vec<SubscriptionHandle>>,
}

/// Lifetime of one view.
///
/// Owns the view's feeds and wraps callbacks of operations that may finish
/// after the view is gone. Once disposed, every feed is stopped and every
/// guarded callback becomes a no-op.
#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    inner: Arc<ScopeInner>,
}

impl ViewScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Take ownership of a feed. A feed adopted after disposal is stopped
    /// right away.
    pub fn adopt(&self, handle: SubscriptionHandle) {
        if self.is_disposed() {
            handle.unsubscribe();
            return;
        }
        if let Ok(mut handles) = self.inner.handles.lock() {
            handles.push(handle);
        }
    }

    /// Wrap a callback so it only runs while the scope is alive.
    pub fn guard<T, F>(&self, mut callback: F) -> impl FnMut(T) + Send + 'static
    where
        F: FnMut(T) + Send + 'static,
    {
        let scope = self.clone();
        move |value| {
            if !scope.is_disposed() {
                callback(value);
            }
        }
    }

    /// Like [`ViewScope::guard`] for callbacks that must be `Fn + Sync`,
    /// such as upload progress.
    pub fn guard_fn<T, F>(&self, callback: F) -> impl Fn(T) + Send + Sync + 'static
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let scope = self.clone();
        move |value| {
            if !scope.is_disposed() {
                callback(value);
            }
        }
    }

    /// Deliver the outcome of a finished operation unless the scope is gone.
    /// Returns whether it was delivered.
    pub fn deliver<T>(&self, value: T, callback: impl FnOnce(T)) -> bool {
        if self.is_disposed() {
            debug!("dropping result for disposed view");
            return false;
        }
        callback(value);
        true
    }

    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = match self.inner.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => Vec::new(),
        };
        for handle in &handles {
            handle.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldconnect_store::MemoryDocumentStore;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fields(value: serde_json::Value) -> goldconnect_store::Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn feed(
        store: &MemoryDocumentStore,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<usize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_feed(
            store,
            "test",
            Query::collection("items"),
            |docs| docs.len(),
            move |n| {
                let _ = tx.send(n);
            },
        )
        .await
        .unwrap();
        (handle, rx)
    }

    #[tokio::test]
    async fn delivers_full_result_sets() {
        let store = MemoryDocumentStore::new();
        let (handle, mut rx) = feed(&store).await;
        assert_eq!(handle.state(), SubscriptionState::Live);
        assert_eq!(rx.recv().await, Some(0));

        store.add("items", fields(json!({"n": 1}))).await.unwrap();
        assert_eq!(rx.recv().await, Some(1));
        store.add("items", fields(json!({"n": 2}))).await.unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let store = MemoryDocumentStore::new();
        let (handle, mut rx) = feed(&store).await;
        assert_eq!(rx.recv().await, Some(0));

        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(handle.state(), SubscriptionState::Unsubscribed);

        store.add("items", fields(json!({"n": 1}))).await.unwrap();
        // the sender was dropped with the aborted task
        let next = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(next, Ok(None) | Err(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unsubscribe_waits_for_running_callback() {
        let store = MemoryDocumentStore::new();
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, mut started) = mpsc::unbounded_channel();
        let done = finished.clone();
        let handle = spawn_feed(
            &store,
            "slow",
            Query::collection("items"),
            |docs| docs.len(),
            move |n| {
                if n == 0 {
                    return;
                }
                let _ = started_tx.send(());
                std::thread::sleep(Duration::from_millis(150));
                done.store(true, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

        store.add("items", fields(json!({"n": 1}))).await.unwrap();
        started.recv().await.unwrap();
        handle.unsubscribe();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unsubscribe_from_own_callback() {
        let store = MemoryDocumentStore::new();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let own = slot.clone();
        let handle = spawn_feed(
            &store,
            "self-closing",
            Query::collection("items"),
            |docs| docs.len(),
            move |n| {
                let _ = tx.send(n);
                if n > 0 {
                    let handle = own.lock().unwrap().take();
                    drop(handle);
                }
            },
        )
        .await
        .unwrap();
        let flag = handle.flag.clone();
        *slot.lock().unwrap() = Some(handle);
        assert_eq!(rx.recv().await, Some(0));

        store.add("items", fields(json!({"n": 1}))).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert_eq!(got.unwrap(), Some(1));
        assert_eq!(flag.state(), SubscriptionState::Unsubscribed);

        store.add("items", fields(json!({"n": 2}))).await.unwrap();
        let next = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(next, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn closed_store_ends_feed() {
        let store = MemoryDocumentStore::new();
        let (handle, mut rx) = feed(&store).await;
        assert_eq!(rx.recv().await, Some(0));
        store.close();
        assert_eq!(rx.recv().await, None);
        assert_eq!(handle.state(), SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn scope_disposal() {
        let store = MemoryDocumentStore::new();
        let scope = ViewScope::new();
        let (handle, mut rx) = feed(&store).await;
        assert_eq!(rx.recv().await, Some(0));
        scope.adopt(handle);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut guarded = scope.guard(move |v: u32| sink.lock().unwrap().push(v));
        guarded(1);

        scope.dispose();
        assert!(scope.is_disposed());
        guarded(2);
        assert_eq!(*seen.lock().unwrap(), [1]);
        assert!(!scope.deliver(3, |_| panic!("delivered into disposed view")));

        store.add("items", fields(json!({"n": 1}))).await.unwrap();
        let next = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(matches!(next, Ok(None) | Err(_)));

        let (late, _rx) = feed(&store).await;
        let flag = late.flag.clone();
        scope.adopt(late);
        assert_eq!(flag.state(), SubscriptionState::Unsubscribed);
    }
}
