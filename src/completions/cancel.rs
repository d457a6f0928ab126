use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tokio_util::sync::CancellationToken;

/// Why a scope was fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller (or a parent scope fired by the caller) asked to stop.
    Caller,
    /// A deadline elapsed.
    Timeout,
}

struct ScopeInner {
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
    children: Mutex<Vec<Weak<ScopeInner>>>,
}

/// A node in a tree of cancellation scopes.
///
/// Firing a scope fires every live descendant exactly once with the same
/// reason. Firing is idempotent: the first reason wins and later calls are
/// no-ops. Children never fire their parent.
///
/// # Example
/// ```no_run
/// let root = CancelScope::new();
/// let slot = root.fork();
///
/// root.cancel(CancelReason::Caller);
/// assert_eq!(slot.reason(), Some(CancelReason::Caller));
/// ```
#[derive(Clone)]
pub struct CancelScope {
    inner: Arc<ScopeInner>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                token: CancellationToken::new(),
                reason: OnceLock::new(),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derives a child scope. A child forked from a fired scope is born fired.
    pub fn fork(&self) -> CancelScope {
        let child = CancelScope::new();

        // The reason is checked under the children lock so a concurrent
        // `cancel` either sees this child or we see its reason.
        let inherited = {
            let mut children = self.inner.children.lock();
            match self.reason() {
                Some(reason) => Some(reason),
                None => {
                    children.retain(|c| c.strong_count() > 0);
                    children.push(Arc::downgrade(&child.inner));
                    None
                }
            }
        };

        if let Some(reason) = inherited {
            child.cancel(reason);
        }
        child
    }

    /// Fires this scope and all of its descendants.
    ///
    /// Returns `true` if this call fired the scope, `false` if it was already
    /// fired (in which case the original reason is kept).
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.inner.reason.set(reason).is_err() {
            return false;
        }
        self.inner.token.cancel();

        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            CancelScope { inner: child }.cancel(reason);
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// Resolves once the scope has been fired.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("reason", &self.reason())
            .field("children", &self.inner.children.lock().len())
            .finish()
    }
}
