use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub type ObserverFn<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// Registry of callbacks that are notified in registration order.
pub struct ObserverList<T> {
    inner: Arc<ObserverListInner<T>>,
}

struct ObserverListInner<T> {
    next_id: AtomicU64,
    observers: Mutex<BTreeMap<u64, ObserverFn<T>>>,
}

impl<T> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObserverListInner {
                next_id: AtomicU64::new(0),
                observers: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .observers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(id, Arc::new(observer));

        let weak: Weak<ObserverListInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .observers
                    .lock()
                    .unwrap_or_else(|poison| poison.into_inner())
                    .remove(&id);
            }
        })
    }

    /// Invokes every observer with `value`. Callbacks run outside the registry lock so they
    /// may subscribe or unsubscribe re-entrantly.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<ObserverFn<T>> = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .values()
            .cloned()
            .collect();
        for observer in snapshot {
            observer(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clear();
    }
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObserverList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle returned by `subscribe`; detaches the observer on [`unsubscribe`](Self::unsubscribe)
/// or when dropped, unless [`detach`](Self::detach) was called.
#[must_use = "dropping a Subscription unsubscribes the observer"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that owns nothing.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keeps the observer registered for the lifetime of its source.
    pub fn detach(mut self) {
        self.cancel.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
