use hdict_core::{
    error::{HdictError, Result},
    types::key,
};
use std::collections::BTreeSet;

/// Per-key read-only status
///
/// A key is locked if it or any ancestor group is locked. Locking a key that
/// does not exist yet is allowed and takes effect once it is created.
#[derive(Debug, Clone, Default)]
pub struct KeyLock {
    locked: BTreeSet<String>,
}

impl KeyLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locked.extend(keys.into_iter().map(Into::into));
    }

    pub fn unlock<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for k in keys {
            self.locked.remove(k.as_ref());
        }
    }

    pub fn unlock_all(&mut self) {
        self.locked.clear();
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.locked.iter().any(|l| key::is_within(key, l))
    }

    /// Fail with `ReadOnlyKey` if `key` is locked or if replacing it would
    /// overwrite a locked key below it.
    pub fn check(&self, key: &str, action: &'static str) -> Result<()> {
        let blocked = self
            .locked
            .iter()
            .any(|l| key::is_within(key, l) || key::is_within(l, key));
        if blocked {
            return Err(HdictError::ReadOnlyKey {
                key: key.to_string(),
                action,
            });
        }
        Ok(())
    }

    pub fn locked_keys(&self) -> impl Iterator<Item = &str> {
        self.locked.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.locked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_lock_covers_children() {
        let mut locks = KeyLock::new();
        locks.lock(["g"]);
        assert!(locks.is_locked("g"));
        assert!(locks.is_locked("g/x/y"));
        assert!(!locks.is_locked("gx"));
        assert!(matches!(
            locks.check("g/x", "set"),
            Err(HdictError::ReadOnlyKey { action: "set", .. })
        ));
    }

    #[test]
    fn test_replacing_parent_of_locked_key_is_rejected() {
        let mut locks = KeyLock::new();
        locks.lock(["g/x"]);
        assert!(!locks.is_locked("g"));
        assert!(locks.check("g", "delete").is_err());
        assert!(locks.check("g/y", "set").is_ok());
    }

    #[test]
    fn test_unlock_is_symmetric() {
        let mut locks = KeyLock::new();
        locks.lock(["a", "b"]);
        locks.unlock(["a"]);
        assert!(!locks.is_locked("a"));
        assert!(locks.is_locked("b"));
        locks.unlock_all();
        assert!(locks.is_empty());
    }
}
