//! Run-scoped coordination state shared by every worker: one lock and one map.
//!
//! Each map operation is atomic on its own. A step doing read-modify-write across several
//! operations must hold [`SharedState::lock`] for the whole sequence; nothing enforces that.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloning gives another handle to the same lock and map.
#[derive(Clone, Debug, Default)]
pub struct SharedState {
    lock: Arc<Mutex<()>>,
    map: Arc<Mutex<HashMap<String, Value>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the run-wide lock. Poisoning is ignored: a step that panicked while holding it
    /// must not wedge the other items.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.map().get(key).cloned()
    }

    /// Insert, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.map().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.map().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Copy of the current map contents.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.map().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn clones_share_the_same_map() {
        let a = SharedState::new();
        let b = a.clone();
        a.insert("k", json!(1));
        assert_eq!(b.get("k"), Some(json!(1)));
        assert_eq!(b.remove("k"), Some(json!(1)));
        assert!(a.is_empty());
    }

    #[test]
    fn read_modify_write_under_lock_is_not_lost() {
        let shared = SharedState::new();
        shared.insert("count", json!(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _guard = shared.lock();
                        let n = shared.get("count").and_then(|v| v.as_u64()).unwrap();
                        shared.insert("count", json!(n + 1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.get("count"), Some(json!(800)));
    }

    #[test]
    fn lock_survives_a_panicking_holder() {
        let shared = SharedState::new();
        let s = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = s.lock();
            panic!("step blew up");
        })
        .join();
        let _guard = shared.lock();
        shared.insert("after", json!(true));
        assert!(shared.contains_key("after"));
    }
}
