//! Compute-once, fan-out-many memo cell

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;

/// Holds the result of one asynchronous computation shared by every caller.
///
/// Callers arriving while the computation is in flight wait for it instead of
/// starting their own. A failed computation leaves the cell empty, so the
/// next caller runs it again.
pub struct SharedCell<T> {
    cell: OnceCell<Arc<T>>,
}

impl<T> SharedCell<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Return the memoized value, computing it with `init` if no caller has yet.
    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell
            .get_or_try_init(|| async { init().await.map(Arc::new) })
            .await
            .cloned()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

impl<T> Default for SharedCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCell")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
