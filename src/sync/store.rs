use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener<T>)>,
}

/// Observable value with atomic replace-on-write, backed by a `watch` channel.
///
/// Async consumers take a [`watch::Receiver`] from [`Store::watch`] and see the latest value.
/// Callback listeners are run inside the channel's write lock, so they observe every write in
/// the order it was applied. A listener gets the new value as its argument and must not touch
/// the store it is subscribed to.
pub struct Store<T> {
    sender: watch::Sender<T>,
    listeners: Mutex<Listeners<T>>,
}

impl<T: Clone> Store<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender,
            listeners: Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.update(|_| value);
    }

    /// Computes the next value from the current one and publishes it, as one step.
    pub fn update(&self, next: impl FnOnce(&T) -> T) {
        let listeners: Vec<Listener<T>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        self.sender.send_modify(|value| {
            let updated = next(&*value);
            *value = updated;
            for listener in &listeners {
                listener(&*value);
            }
        });
    }

    pub fn watch(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.entries.len();
        listeners.entries.retain(|(existing, _)| *existing != id);
        listeners.entries.len() != before
    }
}

impl<T: Clone + Default> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Lifecycle of one fetched value.
///
/// `Loading` keeps whatever was shown before so that a failed fetch can put it back.
#[derive(Debug, PartialEq)]
pub enum SlotState<T> {
    Empty,
    Loading { previous: Option<Arc<T>> },
    Populated(Arc<T>),
}

impl<T> Clone for SlotState<T> {
    fn clone(&self) -> Self {
        match self {
            SlotState::Empty => SlotState::Empty,
            SlotState::Loading { previous } => SlotState::Loading {
                previous: previous.clone(),
            },
            SlotState::Populated(value) => SlotState::Populated(Arc::clone(value)),
        }
    }
}

impl<T> Default for SlotState<T> {
    fn default() -> Self {
        SlotState::Empty
    }
}

impl<T> SlotState<T> {
    /// Last good value, including the one held over while loading.
    pub fn value(&self) -> Option<&Arc<T>> {
        match self {
            SlotState::Empty => None,
            SlotState::Loading { previous } => previous.as_ref(),
            SlotState::Populated(value) => Some(value),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SlotState::Loading { .. })
    }

    fn loading(&self) -> Self {
        SlotState::Loading {
            previous: self.value().cloned(),
        }
    }

    //Overlapping loads are last-writer-wins, so if another load already finished there is
    //nothing to restore.
    fn restored(&self) -> Self {
        match self {
            SlotState::Loading {
                previous: Some(value),
            } => SlotState::Populated(Arc::clone(value)),
            SlotState::Loading { previous: None } => SlotState::Empty,
            other => other.clone(),
        }
    }
}

pub type Slot<T> = Store<SlotState<T>>;

impl<T> Store<SlotState<T>> {
    /// Marks the slot loading. The returned guard puts the previous value back if it is
    /// dropped unsettled, which covers a task cancelled mid-fetch.
    pub fn begin_load(&self) -> Load<'_, T> {
        self.update(SlotState::loading);
        Load {
            slot: self,
            settled: false,
        }
    }

    pub fn current(&self) -> Option<Arc<T>> {
        self.get().value().cloned()
    }
}

/// An in-flight fetch into a [`Slot`].
pub struct Load<'a, T> {
    slot: &'a Slot<T>,
    settled: bool,
}

impl<T> Load<'_, T> {
    pub fn finish(mut self, value: T) {
        self.settled = true;
        self.slot.set(SlotState::Populated(Arc::new(value)));
    }

    pub fn abandon(mut self) {
        self.settled = true;
        self.slot.update(SlotState::restored);
    }
}

impl<T> Drop for Load<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            self.slot.update(SlotState::restored);
        }
    }
}
