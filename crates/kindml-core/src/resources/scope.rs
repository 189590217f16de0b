//! Per-call resource scope.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use super::{ResourcePool, Tensor};
use crate::error::Result;

/// Owns every transient tensor of one inference call.
///
/// Tensors allocated or tracked through the scope are released when it is
/// dropped, on the success path and the error path alike. Tensors marked
/// with [`keep`](Self::keep) escape and become owned by whoever holds them.
pub struct ResourceScope {
    pool: ResourcePool,
    owned: Mutex<Vec<Tensor>>,
    escaping: Mutex<HashSet<u64>>,
}

impl ResourcePool {
    /// Opens a scope whose tensors are counted by this pool.
    #[must_use]
    pub fn scope(&self) -> ResourceScope {
        ResourceScope {
            pool: self.clone(),
            owned: Mutex::new(Vec::new()),
            escaping: Mutex::new(HashSet::new()),
        }
    }
}

impl ResourceScope {
    /// Allocates a tensor owned by this scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`](crate::Error::Shape) if `data` does not
    /// match `shape`.
    pub fn alloc(&self, shape: Vec<usize>, data: Vec<f32>) -> Result<Tensor> {
        let tensor = self.pool.tensor(shape, data)?;
        self.owned.lock().push(tensor.clone());
        Ok(tensor)
    }

    /// Takes ownership of a tensor created elsewhere.
    ///
    /// Tracking the same tensor twice is a no-op.
    pub fn track(&self, tensor: &Tensor) -> Tensor {
        let mut owned = self.owned.lock();
        if !owned.iter().any(|t| t.same_as(tensor)) {
            owned.push(tensor.clone());
        }
        tensor.clone()
    }

    /// Marks a tensor as escaping: it survives the scope.
    pub fn keep(&self, tensor: &Tensor) -> Tensor {
        self.escaping.lock().insert(tensor.id());
        tensor.clone()
    }

    /// Number of tensors this scope will release on exit.
    #[must_use]
    pub fn pending_release(&self) -> usize {
        let escaping = self.escaping.lock();
        self.owned
            .lock()
            .iter()
            .filter(|t| !escaping.contains(&t.id()) && !t.is_released())
            .count()
    }

    /// Closes the scope now, returning how many tensors it released.
    pub fn close(self) -> usize {
        self.release_owned()
    }

    fn release_owned(&self) -> usize {
        let escaping = std::mem::take(&mut *self.escaping.lock());
        let owned = std::mem::take(&mut *self.owned.lock());

        let released = owned
            .iter()
            .filter(|t| !escaping.contains(&t.id()))
            .filter(|t| t.release())
            .count();

        if released > 0 {
            debug!(
                "Released {released} transient tensor(s), {} escaping",
                escaping.len()
            );
        }
        released
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        self.release_owned();
    }
}

impl fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceScope")
            .field("owned", &self.owned.lock().len())
            .field("escaping", &self.escaping.lock().len())
            .finish_non_exhaustive()
    }
}
