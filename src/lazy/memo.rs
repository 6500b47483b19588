use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

/// A single-assignment memoized slot.
///
/// Readers that find the value published never touch the lock. The first
/// writers serialize on a per-slot mutex, re-check, and only one of them runs
/// the initializer. A failed initializer publishes nothing, so the next reader
/// tries again.
pub struct Memo<T> {
    value: OnceLock<T>,
    init: Mutex<()>,
}

impl<T> Memo<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Creates a memo that is already resolved.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let memo = Self::new();
        let _ = memo.value.set(value);
        memo
    }

    /// Returns the value if it has been published.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }

    /// Returns the published value, running `init` first if there is none.
    ///
    /// # Errors
    ///
    /// Returns whatever `init` returns; the slot stays unresolved.
    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        // The guard protects no data, so a panic in another initializer
        // leaves nothing to repair.
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let value = init()?;
        Ok(self.value.get_or_init(|| value))
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.get() {
            Some(value) => f.debug_tuple("Memo").field(value).finish(),
            None => f.write_str("Memo(<unresolved>)"),
        }
    }
}
