//! Marshalling pass bookkeeping.
//!
//! Producing a snapshot may itself resolve things (a child's identifier, a
//! security link), and resolving pushes entities into the shared cache. A
//! cache is not required to tolerate being written while one of its own
//! entries is being marshalled, so pushes made inside a snapshot pass are
//! parked on the current thread and replayed when the outermost pass ends.
//!
//! Snapshots and the `materialize_*` walks in [`crate::snapshot`] open a pass.
//! Caches outside this crate can consult [`is_writing`] themselves.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::resolver::TargetResolver;
use crate::target::Target;
use crate::version::VersionCorrection;

thread_local! {
    /// Nesting depth of snapshot passes on this thread.
    static WRITE_DEPTH: Cell<usize> = const { Cell::new(0) };

    /// Cache pushes parked until the outermost pass completes.
    static DEFERRED: RefCell<Vec<DeferredPush>> = const { RefCell::new(Vec::new()) };
}

struct DeferredPush {
    resolver: Arc<dyn TargetResolver>,
    target: Target,
    version_correction: VersionCorrection,
}

/// RAII guard marking the current thread as inside a snapshot pass.
///
/// Guards nest. Dropping the outermost one flushes every deferred push.
/// The guard is tied to its thread and cannot be sent elsewhere.
#[must_use = "the pass ends when the guard is dropped"]
pub struct WriteGuard {
    _not_send: PhantomData<*const ()>,
}

impl WriteGuard {
    pub fn enter() -> Self {
        WRITE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self { _not_send: PhantomData }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let remaining = WRITE_DEPTH.with(|depth| {
            let next = depth.get().saturating_sub(1);
            depth.set(next);
            next
        });
        if remaining > 0 {
            return;
        }

        let pending = DEFERRED.with(|deferred| std::mem::take(&mut *deferred.borrow_mut()));
        if std::thread::panicking() {
            return;
        }
        for push in pending {
            flush(&push);
        }
    }
}

fn flush(push: &DeferredPush) {
    let Some(cache) = push.resolver.cache() else {
        return;
    };
    let targets = std::slice::from_ref(&push.target);
    if let Err(err) = cache.cache_targets(targets, &push.version_correction) {
        warn!(error = %err, "deferred cache push failed");
    }
}

/// True while the current thread is inside a snapshot pass.
#[must_use]
pub fn is_writing() -> bool {
    depth() > 0
}

/// Current nesting depth on this thread.
#[must_use]
pub fn depth() -> usize {
    WRITE_DEPTH.with(Cell::get)
}

/// Parks a cache push until the outermost pass on this thread ends.
pub(crate) fn defer(resolver: Arc<dyn TargetResolver>, target: Target, version_correction: VersionCorrection) {
    trace!(kind = %target.kind(), "deferring cache push until marshalling completes");
    DEFERRED.with(|deferred| {
        deferred.borrow_mut().push(DeferredPush {
            resolver,
            target,
            version_correction,
        });
    });
}
