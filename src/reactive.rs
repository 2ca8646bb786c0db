use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type SubscriberFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Subscription(u64);

struct CellState<T> {
    value: RwLock<T>,
    subscribers: RwLock<Vec<(Subscription, SubscriberFn<T>)>>,
    next_subscription: AtomicU64,
}

pub struct Cell<T> {
    state: Arc<CellState<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            state: Arc::new(CellState {
                value: RwLock::new(value),
                subscribers: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    pub fn get(&self) -> T {
        read_lock(&self.state.value).clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&read_lock(&self.state.value))
    }

    pub fn set(&self, value: T) -> bool {
        {
            let mut current = write_lock(&self.state.value);
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        self.notify(&value);
        true
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let next = {
            let mut current = write_lock(&self.state.value);
            let previous = current.clone();
            f(&mut current);
            if *current == previous {
                return false;
            }
            current.clone()
        };
        self.notify(&next);
        true
    }

    pub fn subscribe(&self, subscriber: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let subscription =
            Subscription(self.state.next_subscription.fetch_add(1, Ordering::SeqCst));
        write_lock(&self.state.subscribers).push((subscription, Arc::new(subscriber)));
        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        write_lock(&self.state.subscribers).retain(|(id, _)| *id != subscription);
    }

    pub fn view(&self) -> View<T> {
        View { cell: self.clone() }
    }

    // Subscribers are cloned out of the lock before being called, so a
    // subscriber may freely read or mutate this cell.
    fn notify(&self, value: &T) {
        let subscribers: Vec<SubscriberFn<T>> = read_lock(&self.state.subscribers)
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            subscriber(value);
        }
    }
}

pub struct View<T> {
    cell: Cell<T>,
}

impl<T> Clone for View<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> View<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    pub fn subscribe(&self, subscriber: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.cell.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.cell.unsubscribe(subscription)
    }
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
