//! Event fan-out and disposal primitives.
//!
//! Everything here is single-threaded: listeners are invoked synchronously, in
//! subscription order, on the thread that fires the event.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Listener<T> = Rc<dyn Fn(&T)>;

struct EmitterInner<T> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(u64, Listener<T>)>>,
}

/// Multi-subscriber event emitter.
///
/// Cloning an emitter yields another handle to the same listener list.
pub struct Emitter<T: 'static> {
    inner: Rc<EmitterInner<T>>,
}

impl<T: 'static> Emitter<T> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EmitterInner {
                next_id: Cell::new(0),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// subscription is dropped or unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));

        let weak: Weak<EmitterInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Deliver `event` to every listener registered at the time of the call.
    pub fn fire(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Weak handle that can fire without keeping the emitter alive.
    pub fn downgrade(&self) -> WeakEmitter<T> {
        WeakEmitter {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Non-owning emitter handle.
pub struct WeakEmitter<T: 'static> {
    inner: Weak<EmitterInner<T>>,
}

impl<T: 'static> WeakEmitter<T> {
    /// Fire if the emitter is still alive. Returns whether it was.
    pub fn fire(&self, event: &T) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                Emitter { inner }.fire(event);
                true
            }
            None => false,
        }
    }
}

impl<T: 'static> Clone for WeakEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

/// Emitter that can hold events back while paused.
///
/// Events fired while paused are queued; on the final `resume` they are
/// delivered either one by one or, with a merge function, as one event.
pub struct PauseableEmitter<T: 'static> {
    emitter: Emitter<T>,
    paused: Cell<u32>,
    queue: RefCell<Vec<T>>,
    merge: Option<fn(Vec<T>) -> T>,
}

impl<T: 'static> PauseableEmitter<T> {
    pub fn new(merge: Option<fn(Vec<T>) -> T>) -> Self {
        Self {
            emitter: Emitter::new(),
            paused: Cell::new(0),
            queue: RefCell::new(Vec::new()),
            merge,
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        self.emitter.subscribe(listener)
    }

    pub fn fire(&self, event: T) {
        if self.is_paused() {
            self.queue.borrow_mut().push(event);
        } else {
            self.emitter.fire(&event);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get() > 0
    }

    /// Start holding events back. Pauses nest.
    pub fn pause(&self) {
        self.paused.set(self.paused.get() + 1);
    }

    /// Undo one `pause`; the last one flushes the queue.
    pub fn resume(&self) {
        let depth = self.paused.get().saturating_sub(1);
        self.paused.set(depth);
        if depth > 0 {
            return;
        }

        let queued = std::mem::take(&mut *self.queue.borrow_mut());
        if queued.is_empty() {
            return;
        }
        match self.merge {
            Some(merge) => self.emitter.fire(&merge(queued)),
            None => {
                for event in queued {
                    self.emitter.fire(&event);
                }
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}

/// Token for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes the listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// An explicitly released resource, e.g. a registered keybinding.
///
/// Unlike [`Subscription`], dropping a disposable does nothing; only
/// [`Disposable::dispose`] releases it.
#[derive(Default)]
pub struct Disposable {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Disposable {
    /// Create a disposable running `f` on dispose.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(f)),
        }
    }

    /// A disposable that does nothing.
    pub fn none() -> Self {
        Self { dispose: None }
    }

    /// Whether this is a no-op disposable.
    pub fn is_none(&self) -> bool {
        self.dispose.is_none()
    }

    /// Release the resource.
    pub fn dispose(mut self) {
        if let Some(f) = self.dispose.take() {
            f();
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("none", &self.is_none())
            .finish()
    }
}

/// A group of disposables released together.
#[derive(Debug, Default)]
pub struct DisposableCollection {
    items: Vec<Disposable>,
}

impl DisposableCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a disposable to the group.
    pub fn push(&mut self, disposable: Disposable) {
        if !disposable.is_none() {
            self.items.push(disposable);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Release every member, most recent first.
    pub fn dispose(self) {
        for item in self.items.into_iter().rev() {
            item.dispose();
        }
    }
}

impl From<DisposableCollection> for Disposable {
    fn from(collection: DisposableCollection) -> Self {
        if collection.is_empty() {
            Disposable::none()
        } else {
            Disposable::new(move || collection.dispose())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_in_subscription_order() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s1 = seen.clone();
        let _a = emitter.subscribe(move |v| s1.borrow_mut().push(("a", *v)));
        let s2 = seen.clone();
        let _b = emitter.subscribe(move |v| s2.borrow_mut().push(("b", *v)));

        emitter.fire(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let emitter: Emitter<()> = Emitter::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let sub = emitter.subscribe(move |_| c.set(c.get() + 1));
        emitter.fire(&());
        sub.unsubscribe();
        emitter.fire(&());
        assert_eq!(count.get(), 1);

        {
            let c = count.clone();
            let _scoped = emitter.subscribe(move |_| c.set(c.get() + 10));
            emitter.fire(&());
        }
        emitter.fire(&());
        assert_eq!(count.get(), 11);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_reentrant_subscribe_during_fire() {
        let emitter: Emitter<()> = Emitter::new();
        let late = Rc::new(RefCell::new(Vec::new()));

        let handle = emitter.clone();
        let store = late.clone();
        let _sub = emitter.subscribe(move |_| {
            store.borrow_mut().push(handle.subscribe(|_| {}));
        });

        emitter.fire(&());
        assert_eq!(emitter.listener_count(), 2);
    }

    #[test]
    fn test_weak_emitter() {
        let emitter: Emitter<u8> = Emitter::new();
        let weak = emitter.downgrade();
        assert!(weak.fire(&1));
        drop(emitter);
        assert!(!weak.fire(&1));
    }

    #[test]
    fn test_pauseable_emitter_merges() {
        fn concat(events: Vec<Vec<u8>>) -> Vec<u8> {
            events.concat()
        }
        let emitter: PauseableEmitter<Vec<u8>> = PauseableEmitter::new(Some(concat));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let store = seen.clone();
        let _sub = emitter.subscribe(move |e: &Vec<u8>| store.borrow_mut().push(e.clone()));

        emitter.pause();
        emitter.fire(vec![1]);
        emitter.pause();
        emitter.fire(vec![2]);
        emitter.resume();
        assert!(seen.borrow().is_empty());
        emitter.resume();
        assert_eq!(*seen.borrow(), vec![vec![1, 2]]);

        emitter.fire(vec![3]);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_disposable_collection() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut collection = DisposableCollection::new();
        for i in 0..3 {
            let order = order.clone();
            collection.push(Disposable::new(move || order.borrow_mut().push(i)));
        }
        collection.push(Disposable::none());
        assert_eq!(collection.len(), 3);

        Disposable::from(collection).dispose();
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }
}
