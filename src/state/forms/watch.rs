//! Value-change subscriptions

use super::path::FieldPath;
use super::value::FormValue;
use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;

/// What kind of mutation produced a change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// User input through a field binding
    Input,
    /// Programmatic `set_value`
    SetValue,
    ArrayAppend,
    ArrayInsert,
    ArrayRemove,
    Reset,
    DefaultsLoaded,
}

/// Details passed alongside the current values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchEvent {
    pub changed_path: Option<FieldPath>,
    pub kind: ChangeKind,
}

pub type WatchCallback = Box<dyn FnMut(&FormValue, &WatchEvent)>;

/// Handle returned by `watch`; dropping it does not unsubscribe
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    active: Rc<Cell<bool>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

struct Watcher {
    id: u64,
    active: Rc<Cell<bool>>,
    callback: WatchCallback,
}

/// Registry of watch callbacks, notified synchronously in subscription order
#[derive(Default)]
pub struct WatchHub {
    watchers: Vec<Watcher>,
    next_id: u64,
}

impl WatchHub {
    pub fn subscribe(&mut self, callback: WatchCallback) -> Subscription {
        self.next_id += 1;
        let active = Rc::new(Cell::new(true));
        self.watchers.push(Watcher {
            id: self.next_id,
            active: Rc::clone(&active),
            callback,
        });
        Subscription {
            id: self.next_id,
            active,
        }
    }

    pub fn notify(&mut self, values: &FormValue, event: &WatchEvent) {
        self.watchers.retain(|w| w.active.get());
        for watcher in &mut self.watchers {
            // A callback may unsubscribe a later watcher through a cloned handle
            if watcher.active.get() {
                (watcher.callback)(values, event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.watchers.iter().filter(|w| w.active.get()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<u64> {
        self.watchers
            .iter()
            .filter(|w| w.active.get())
            .map(|w| w.id)
            .collect()
    }

    /// Deactivate and drop every watcher
    pub fn clear(&mut self) {
        for watcher in &self.watchers {
            watcher.active.set(false);
        }
        self.watchers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn event() -> WatchEvent {
        WatchEvent {
            changed_path: Some(FieldPath::parse("username").unwrap()),
            kind: ChangeKind::Input,
        }
    }

    #[test]
    fn test_notifies_subscribers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hub = WatchHub::default();
        let sink = Rc::clone(&seen);
        hub.subscribe(Box::new(move |values, event| {
            sink.borrow_mut().push((values.clone(), event.kind));
        }));

        hub.notify(&FormValue::from("a"), &event());

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].1, ChangeKind::Input);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let count = Rc::new(Cell::new(0));
        let mut hub = WatchHub::default();
        let counter = Rc::clone(&count);
        let sub = hub.subscribe(Box::new(move |_, _| counter.set(counter.get() + 1)));

        hub.notify(&FormValue::Null, &event());
        sub.unsubscribe();
        hub.notify(&FormValue::Null, &event());

        assert_eq!(count.get(), 1);
        assert!(!sub.is_active());
        assert!(hub.is_empty());
    }

    #[test]
    fn test_resubscribe_after_unsubscribe() {
        let count = Rc::new(Cell::new(0));
        let mut hub = WatchHub::default();
        let counter = Rc::clone(&count);
        let first = hub.subscribe(Box::new(move |_, _| counter.set(counter.get() + 1)));
        first.unsubscribe();
        let counter = Rc::clone(&count);
        let second = hub.subscribe(Box::new(move |_, _| counter.set(counter.get() + 10)));

        hub.notify(&FormValue::Null, &event());

        assert_eq!(count.get(), 10);
        assert_ne!(first.id(), second.id());
        assert_eq!(hub.ids(), vec![second.id()]);
    }

    #[test]
    fn test_clear_deactivates_handles() {
        let mut hub = WatchHub::default();
        let sub = hub.subscribe(Box::new(|_, _| {}));
        hub.clear();
        assert!(!sub.is_active());
        assert_eq!(hub.len(), 0);
    }
}
