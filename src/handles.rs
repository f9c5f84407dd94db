//! Handle tables
//!
//! Stable numeric ids for call frames, variable containers, sources and
//! breakpoint ids. Ids are monotonically allocated positive integers; a
//! reset clears the entries but never rewinds the counter, so a handle
//! issued in one pause epoch can never resolve in the next.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;

/// Forward-only handle table.
#[derive(Debug)]
pub struct HandleTable<T> {
    inner: RwLock<HandleTableInner<T>>,
}

#[derive(Debug)]
struct HandleTableInner<T> {
    next: i64,
    entries: HashMap<i64, T>,
}

impl<T: Clone> HandleTable<T> {
    /// Create an empty table. The first issued handle is `start`.
    pub fn new(start: i64) -> Self {
        Self {
            inner: RwLock::new(HandleTableInner {
                next: start.max(1),
                entries: HashMap::new(),
            }),
        }
    }

    /// Allocate a fresh handle for `value`.
    pub fn create(&self, value: T) -> i64 {
        let mut inner = self.inner.write();
        let handle = inner.next;
        inner.next += 1;
        inner.entries.insert(handle, value);
        handle
    }

    /// Look up a handle. Stale handles from before a reset return `None`.
    pub fn get(&self, handle: i64) -> Option<T> {
        self.inner.read().entries.get(&handle).cloned()
    }

    /// Drop all entries, keeping the counter monotonic.
    pub fn reset(&self) {
        self.inner.write().entries.clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

/// Handle table with reverse lookup: repeated `handle_for` calls with an
/// equal key return the same id.
#[derive(Debug)]
pub struct ReverseHandleTable<T: Eq + Hash + Clone> {
    inner: RwLock<ReverseHandleTableInner<T>>,
}

#[derive(Debug)]
struct ReverseHandleTableInner<T: Eq + Hash + Clone> {
    next: i64,
    entries: HashMap<i64, T>,
    reverse: HashMap<T, i64>,
}

impl<T: Eq + Hash + Clone> ReverseHandleTable<T> {
    /// Create an empty table. The first issued handle is `start`.
    pub fn new(start: i64) -> Self {
        Self {
            inner: RwLock::new(ReverseHandleTableInner {
                next: start.max(1),
                entries: HashMap::new(),
                reverse: HashMap::new(),
            }),
        }
    }

    /// Return the stable handle for `value`, allocating one on first sight.
    pub fn handle_for(&self, value: T) -> i64 {
        let mut inner = self.inner.write();
        if let Some(&handle) = inner.reverse.get(&value) {
            return handle;
        }
        let handle = inner.next;
        inner.next += 1;
        inner.entries.insert(handle, value.clone());
        inner.reverse.insert(value, handle);
        handle
    }

    /// Allocate a handle with no value bound yet; pair it later with
    /// [`Self::bind`].
    pub fn allocate(&self) -> i64 {
        let mut inner = self.inner.write();
        let handle = inner.next;
        inner.next += 1;
        handle
    }

    /// Bind a previously allocated handle to a value. Later
    /// [`Self::handle_for`] and [`Self::lookup`] calls with an equal value
    /// return this handle.
    pub fn bind(&self, handle: i64, value: T) {
        let mut inner = self.inner.write();
        inner.entries.insert(handle, value.clone());
        inner.reverse.insert(value, handle);
    }

    /// Forward lookup.
    pub fn get(&self, handle: i64) -> Option<T> {
        self.inner.read().entries.get(&handle).cloned()
    }

    /// Reverse lookup without allocating.
    pub fn lookup(&self, value: &T) -> Option<i64> {
        self.inner.read().reverse.get(value).copied()
    }

    /// Drop all entries, keeping the counter monotonic.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.reverse.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let table = HandleTable::new(1);
        let h = table.create("frame".to_string());
        assert_eq!(table.get(h).as_deref(), Some("frame"));
    }

    #[test]
    fn test_ids_are_positive_and_monotonic() {
        let table = HandleTable::new(1);
        let a = table.create(1u32);
        let b = table.create(2u32);
        assert!(a >= 1);
        assert!(b > a);
    }

    #[test]
    fn test_epoch_isolation() {
        let table = HandleTable::new(1);
        let old = table.create("epoch N".to_string());
        table.reset();
        assert_eq!(table.get(old), None);

        // A handle allocated after the reset never collides with the old one.
        let fresh = table.create("epoch N+1".to_string());
        assert_ne!(fresh, old);
        assert_eq!(table.get(fresh).as_deref(), Some("epoch N+1"));
    }

    #[test]
    fn test_allocate_then_bind() {
        let table = ReverseHandleTable::new(1);
        let handle = table.allocate();
        assert_eq!(table.get(handle), None);

        table.bind(handle, "runtime-bp:9".to_string());
        assert_eq!(table.get(handle).as_deref(), Some("runtime-bp:9"));
        assert_eq!(table.handle_for("runtime-bp:9".to_string()), handle);
    }

    #[test]
    fn test_reverse_handles_are_stable() {
        let table = ReverseHandleTable::new(1000);
        let a = table.handle_for("script:1".to_string());
        let b = table.handle_for("script:2".to_string());
        let a_again = table.handle_for("script:1".to_string());
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(table.get(a).as_deref(), Some("script:1"));
        assert_eq!(table.lookup(&"script:2".to_string()), Some(b));
        assert_eq!(table.lookup(&"script:3".to_string()), None);
    }
}
