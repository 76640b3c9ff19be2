//! Refcounted string interning pool, the idiomatic stand-in for the
//! original configuration cache's shared-memory string pool (`zbx_strpool`).
//!
//! Every host name entering the host-proxy secondary index goes through
//! `acquire`/`release` here so that identical names share one allocation
//! across bindings, and so a balanced sequence of acquires/releases leaves
//! the pool empty (see the string-pool invariant in the crate's root tests).

use std::collections::HashMap;
use std::sync::Arc;

/// An interned string. Cloning is cheap (refcount bump on the shared `Arc`);
/// equality and hashing are by content, so it can be used directly as a
/// `HashMap` key without re-hashing through the pool.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct InternedStr(Arc<str>);

impl InternedStr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for InternedStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InternedStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct Entry {
    value: Arc<str>,
    refcount: usize,
}

/// A refcounted string pool. Not `Sync` on its own; callers hold it behind
/// the cache's write lock, matching the original's "interning happens under
/// `WRLOCK_CACHE`" discipline.
#[derive(Default)]
pub struct StringPool {
    entries: HashMap<Arc<str>, usize>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a reference to `s`, interning it if this is the first
    /// reference. Returns the shared handle.
    pub fn acquire(&mut self, s: &str) -> InternedStr {
        if let Some((key, count)) = self.entries.get_key_value(s) {
            let key = key.clone();
            self.entries.insert(key.clone(), count + 1);
            return InternedStr(key);
        }
        let key: Arc<str> = Arc::from(s);
        self.entries.insert(key.clone(), 1);
        InternedStr(key)
    }

    /// Release a previously acquired handle, dropping the pooled entry once
    /// its refcount reaches zero.
    pub fn release(&mut self, s: &InternedStr) {
        let key = s.0.clone();
        match self.entries.get_mut(&key) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.entries.remove(&key);
            }
            None => {
                // Releasing a handle the pool never acquired is a caller bug;
                // the original's hashset-based pool would also silently no-op
                // a double-release past zero, so we mirror that rather than
                // panic in a cache used from many threads.
            }
        }
    }

    /// Number of distinct interned strings currently referenced. Used by
    /// tests to assert the pool drains to empty after balanced
    /// acquire/release sequences.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_shares_storage() {
        let mut pool = StringPool::new();
        let a = pool.acquire("h1");
        let b = pool.acquire("h1");
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn release_drops_at_zero_refcount() {
        let mut pool = StringPool::new();
        let a = pool.acquire("h1");
        let b = pool.acquire("h1");
        pool.release(&a);
        assert_eq!(pool.len(), 1);
        pool.release(&b);
        assert!(pool.is_empty());
    }

    #[test]
    fn rename_sequence_is_balanced() {
        let mut pool = StringPool::new();
        let h1 = pool.acquire("h1");
        pool.release(&h1);
        let h2 = pool.acquire("h2");
        pool.release(&h2);
        assert!(pool.is_empty());
    }
}
