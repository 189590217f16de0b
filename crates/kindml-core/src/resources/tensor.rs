//! Transient tensors and the pool that counts them.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Counts live tensors.
///
/// Every tensor created through a pool (directly or via one of its scopes)
/// increments the live count and decrements it exactly once when released,
/// either explicitly or when its last handle is dropped.
#[derive(Debug, Clone, Default)]
pub struct ResourcePool {
    inner: Arc<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    live: AtomicUsize,
    next_id: AtomicU64,
}

impl ResourcePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tensors currently holding data.
    #[must_use]
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Allocates a tensor owned directly by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if `data` does not match `shape`.
    pub fn tensor(&self, shape: Vec<usize>, data: Vec<f32>) -> Result<Tensor> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(Error::Shape {
                shape,
                expected,
                actual: data.len(),
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.live.fetch_add(1, Ordering::SeqCst);

        Ok(Tensor {
            inner: Arc::new(TensorInner {
                id,
                shape,
                data: Mutex::new(Some(data)),
                pool: Arc::clone(&self.inner),
            }),
        })
    }
}

/// A handle to a numeric buffer.
///
/// Handles are cheap to clone and share one buffer. Releasing through any
/// handle frees the data for all of them; reading afterwards fails with
/// [`Error::Released`].
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<TensorInner>,
}

struct TensorInner {
    id: u64,
    shape: Vec<usize>,
    data: Mutex<Option<Vec<f32>>>,
    pool: Arc<PoolInner>,
}

impl Tensor {
    /// Identifier, unique within its pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Declared shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.inner.shape
    }

    /// Returns true once the data has been freed.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.data.lock().is_none()
    }

    /// Copies the data out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Released`] if the tensor was released.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        self.with_data(<[f32]>::to_vec)
    }

    /// Runs `f` over the data without copying it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Released`] if the tensor was released.
    pub fn with_data<R>(&self, f: impl FnOnce(&[f32]) -> R) -> Result<R> {
        let guard = self.inner.data.lock();
        guard
            .as_deref()
            .map(f)
            .ok_or(Error::Released(self.inner.id))
    }

    /// Frees the data. Returns false if it was already freed.
    pub fn release(&self) -> bool {
        self.inner.release()
    }

    /// Returns true if both handles point at the same tensor.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl TensorInner {
    fn release(&self) -> bool {
        let freed = self.data.lock().take().is_some();
        if freed {
            self.pool.live.fetch_sub(1, Ordering::SeqCst);
        }
        freed
    }
}

impl Drop for TensorInner {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.inner.id)
            .field("shape", &self.inner.shape)
            .field("released", &self.is_released())
            .finish()
    }
}
