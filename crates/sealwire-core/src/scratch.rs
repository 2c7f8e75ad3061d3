//! Connection-scoped storage for multi-step flows.
//!
//! Each flow defines its own state type (a pending one-time code, a temporary
//! token) and stores at most one value of that type per session. Values may
//! carry an expiry; an expired value reads as absent and is dropped on access.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    time::Instant,
};

struct Entry {
    value: Box<dyn Any + Send>,
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|deadline| now < deadline)
    }
}

/// Type-keyed scratch store.
#[derive(Default)]
pub struct Scratch {
    entries: HashMap<TypeId, Entry>,
}

impl Scratch {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` with no expiry, replacing any previous value of `T`
    pub fn insert<T: Any + Send>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Entry { value: Box::new(value), expires: None });
    }

    /// Store `value` until `deadline`, replacing any previous value of `T`
    pub fn insert_until<T: Any + Send>(&mut self, value: T, deadline: Instant) {
        self.entries
            .insert(TypeId::of::<T>(), Entry { value: Box::new(value), expires: Some(deadline) });
    }

    /// Borrow the live value of `T`, dropping it if expired
    pub fn get<T: Any + Send>(&mut self, now: Instant) -> Option<&T> {
        self.evict_expired::<T>(now);
        self.entries.get(&TypeId::of::<T>()).and_then(|entry| entry.value.downcast_ref::<T>())
    }

    /// Remove and return the live value of `T`
    pub fn take<T: Any + Send>(&mut self, now: Instant) -> Option<T> {
        let entry = self.entries.remove(&TypeId::of::<T>())?;
        if !entry.is_live(now) {
            return None;
        }
        entry.value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Remove any value of `T`, expired or not
    pub fn remove<T: Any + Send>(&mut self) -> bool {
        self.entries.remove(&TypeId::of::<T>()).is_some()
    }

    /// Drop every value
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored values, including expired ones not yet accessed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired<T: Any>(&mut self, now: Instant) {
        let key = TypeId::of::<T>();
        if self.entries.get(&key).is_some_and(|entry| !entry.is_live(now)) {
            self.entries.remove(&key);
        }
    }
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scratch").field("entries", &self.entries.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct PendingCode(String);

    #[derive(Debug, PartialEq)]
    struct TempToken(u64);

    #[test]
    fn values_are_keyed_by_type() {
        let now = Instant::now();
        let mut scratch = Scratch::new();
        scratch.insert(PendingCode("123456".into()));
        scratch.insert(TempToken(9));

        assert_eq!(scratch.get::<PendingCode>(now), Some(&PendingCode("123456".into())));
        assert_eq!(scratch.get::<TempToken>(now), Some(&TempToken(9)));
        assert_eq!(scratch.len(), 2);
    }

    #[test]
    fn insert_replaces_previous_value() {
        let now = Instant::now();
        let mut scratch = Scratch::new();
        scratch.insert(TempToken(1));
        scratch.insert(TempToken(2));

        assert_eq!(scratch.take::<TempToken>(now), Some(TempToken(2)));
        assert!(scratch.is_empty());
    }

    #[test]
    fn expired_values_read_as_absent() {
        let now = Instant::now();
        let mut scratch = Scratch::new();
        scratch.insert_until(PendingCode("1".into()), now + Duration::from_secs(300));

        assert!(scratch.get::<PendingCode>(now + Duration::from_secs(299)).is_some());
        assert!(scratch.get::<PendingCode>(now + Duration::from_secs(300)).is_none());
        assert!(scratch.is_empty());
    }

    #[test]
    fn take_of_expired_value_drops_it() {
        let now = Instant::now();
        let mut scratch = Scratch::new();
        scratch.insert_until(TempToken(5), now);

        assert_eq!(scratch.take::<TempToken>(now), None);
        assert!(scratch.is_empty());
    }

    #[test]
    fn remove_and_clear() {
        let mut scratch = Scratch::new();
        scratch.insert(TempToken(1));
        assert!(scratch.remove::<TempToken>());
        assert!(!scratch.remove::<TempToken>());

        scratch.insert(PendingCode("x".into()));
        scratch.clear();
        assert!(scratch.is_empty());
    }
}
