use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::memo::Memo;
use crate::error::{ResolveError, ResolveResult};

/// Produces the element at one index of a [`LazyList`].
///
/// Implementations hold whatever they need to resolve a slot: a resolved
/// underlying collection plus a resolve context, or a list of specifications
/// plus a resolver.
pub trait SlotSource<T: ?Sized>: Send + Sync {
    fn resolve_slot(&self, index: usize) -> ResolveResult<Arc<T>>;
}

/// A fixed-length sequence whose elements resolve individually on first read.
///
/// Iteration resolves elements one at a time in traversal order. Reading the
/// same index twice, from any number of threads, calls the source at most
/// once and yields the same `Arc`.
pub struct LazyList<T: ?Sized> {
    slots: Box<[Memo<Arc<T>>]>,
    source: Option<Box<dyn SlotSource<T>>>,
}

impl<T: ?Sized> LazyList<T> {
    /// Creates a list of `len` unresolved slots backed by `source`.
    pub fn new(len: usize, source: impl SlotSource<T> + 'static) -> Self {
        Self {
            slots: (0..len).map(|_| Memo::new()).collect(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a list whose elements are all resolved already.
    #[must_use]
    pub fn resolved(items: Vec<Arc<T>>) -> Self {
        Self {
            slots: items.into_iter().map(Memo::ready).collect(),
            source: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the element at `index`, resolving it if this is the first read.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` for a bad index, otherwise whatever the source reports.
    pub fn get(&self, index: usize) -> ResolveResult<Arc<T>> {
        let len = self.len();
        let slot = self
            .slots
            .get(index)
            .ok_or(ResolveError::IndexOutOfRange { index, len })?;

        slot.get_or_try_init(|| {
            let source = self
                .source
                .as_ref()
                .ok_or_else(|| ResolveError::internal("lazy list slot has no source"))?;
            trace!(index, len, "resolving lazy list slot");
            source.resolve_slot(index)
        })
        .map(Arc::clone)
    }

    /// True if the element at `index` has been resolved.
    #[must_use]
    pub fn is_resolved(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Memo::is_resolved)
    }

    /// Number of elements resolved so far.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_resolved()).count()
    }

    /// Iterates in index order, resolving each element as it is reached.
    pub fn iter(&self) -> impl Iterator<Item = ResolveResult<Arc<T>>> + '_ {
        (0..self.len()).map(move |index| self.get(index))
    }

    /// Resolves every element.
    pub fn to_vec(&self) -> ResolveResult<Vec<Arc<T>>> {
        self.iter().collect()
    }
}

impl<T: ?Sized> fmt::Debug for LazyList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyList")
            .field("len", &self.len())
            .field("resolved", &self.resolved_count())
            .finish()
    }
}
