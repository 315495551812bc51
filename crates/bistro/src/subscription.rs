//! Live query subscriptions.
//!
//! A [`Subscription`] delivers an initial snapshot of a read, then a fresh
//! snapshot every time the store reports a write inside the subscription's
//! [`WatchScope`]s. Each subscription runs as its own tokio task feeding a
//! bounded channel.
//!
//! Cancellation is explicit through a [`SubscriptionHandle`] and implicit
//! when the [`Subscription`] is dropped. A [`SubscriptionSet`] groups handles
//! so a screen (or CLI command) can tear down everything it started at once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::ChangeEvent;

/// Default capacity of a subscription's snapshot channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// A cloneable handle to cancel a subscription from anywhere.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SubscriptionHandle {
    /// Create a new, active handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if the subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the subscription is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Which writes make a subscription reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchScope {
    /// Any write to a collection.
    Collection(String),
    /// Writes to a single document.
    Document {
        /// Collection path.
        collection: String,
        /// Document id.
        id: String,
    },
}

impl WatchScope {
    /// Watch a whole collection.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self::Collection(collection.into())
    }

    /// Watch one document.
    #[must_use]
    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Document {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Check if a change event falls inside this scope.
    #[must_use]
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::Collection(collection) => event.collection == *collection,
            Self::Document { collection, id } => {
                event.collection == *collection && event.id == *id
            }
        }
    }
}

/// A stream of snapshots.
///
/// Errors from a reload are delivered as items; the subscription keeps
/// running after an error.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T>>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the subscription is cancelled or its source has
    /// gone away.
    pub async fn next(&mut self) -> Option<Result<T>> {
        if self.handle.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.handle.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Get a handle that can cancel this subscription.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Cancel this subscription.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Check if this subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.handle.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// A collection of subscriptions cancelled together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    handles: Vec<SubscriptionHandle>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a subscription handle.
    pub fn add(&mut self, handle: SubscriptionHandle) {
        self.handles.push(handle);
    }

    /// Cancel every tracked subscription.
    pub fn cancel_all(&self) {
        for handle in &self.handles {
            handle.cancel();
        }
    }

    /// Get the number of tracked subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if no subscriptions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Check if any tracked subscription is still active.
    #[must_use]
    pub fn any_active(&self) -> bool {
        self.handles.iter().any(|h| !h.is_cancelled())
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Start a subscription that runs `load` now and after every matching change.
///
/// `changes` must be subscribed before the call so no write between the
/// initial load and the first `recv` is missed. A subscriber that falls behind
/// the change buffer reloads once instead of replaying every event.
pub(crate) fn watch<T, F, Fut>(
    mut changes: broadcast::Receiver<ChangeEvent>,
    scopes: Vec<WatchScope>,
    capacity: usize,
    load: F,
) -> Subscription<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = SubscriptionHandle::new();
    let task_handle = handle.clone();

    tokio::spawn(async move {
        if !deliver(&tx, &task_handle, load().await).await {
            return;
        }

        loop {
            tokio::select! {
                () = task_handle.cancelled() => break,
                () = tx.closed() => break,
                event = changes.recv() => match event {
                    Ok(event) => {
                        if !scopes.iter().any(|scope| scope.matches(&event)) {
                            continue;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscription lagged by {} change events, reloading", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }

            // Coalesce a burst of writes into one reload.
            loop {
                match changes.try_recv() {
                    Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                    Err(_) => break,
                }
            }

            if task_handle.is_cancelled() || !deliver(&tx, &task_handle, load().await).await {
                break;
            }
        }

        debug!("Subscription task finished");
    });

    Subscription { rx, handle }
}

/// Send one snapshot, giving up if the subscription is cancelled first.
///
/// Returns `false` when the task should stop.
async fn deliver<T>(
    tx: &mpsc::Sender<Result<T>>,
    handle: &SubscriptionHandle,
    snapshot: Result<T>,
) -> bool {
    tokio::select! {
        biased;
        () = handle.cancelled() => false,
        sent = tx.send(snapshot) => sent.is_ok(),
    }
}
