//! Resource management

use crate::error::ReductionError;

use tokio::sync::{Semaphore, SemaphorePermit};

/// [crate::resource_manager::ResourceManager] provides a simple way to allocate resources to
/// tasks. Resource management is performed using a Tokio Semaphore for each type of resource.
#[derive(Debug)]
pub struct ResourceManager {
    /// Optional semaphore for concurrent artifact uploads.
    uploads: Option<Semaphore>,

    /// Optional semaphore for memory used by locally materialised results, in KiB.
    memory: Option<Semaphore>,

    /// Optional total memory pool in bytes.
    total_memory: Option<usize>,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(upload_limit: Option<usize>, memory_limit: Option<usize>) -> Self {
        Self {
            uploads: upload_limit.map(Semaphore::new),
            memory: memory_limit.map(|limit| Semaphore::new(kib(limit))),
            total_memory: memory_limit,
        }
    }

    /// Acquire an upload resource.
    pub async fn upload(&self) -> Result<Option<SemaphorePermit>, ReductionError> {
        optional_acquire(&self.uploads, 1).await
    }

    /// Acquire memory resource to materialise `what` locally.
    ///
    /// Fails immediately if the request could never be satisfied.
    pub async fn memory(
        &self,
        what: &'static str,
        bytes: usize,
    ) -> Result<Option<SemaphorePermit>, ReductionError> {
        if let Some(total_memory) = self.total_memory {
            if bytes > total_memory {
                return Err(ReductionError::InsufficientMemory {
                    what,
                    requested: bytes,
                    total: total_memory,
                });
            };
        };
        optional_acquire(&self.memory, kib(bytes)).await
    }
}

/// Number of KiB permits covering `bytes`. Semaphore permits are acquired as a `u32`, so memory
/// is not tracked at byte granularity.
fn kib(bytes: usize) -> usize {
    bytes.div_ceil(1024)
}

/// Acquire permits on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Semaphore>,
    n: usize,
) -> Result<Option<SemaphorePermit>, ReductionError> {
    if let Some(sem) = sem {
        sem.acquire_many(n.try_into()?)
            .await
            .map(Some)
            .map_err(|err| err.into())
    } else {
        Ok(None)
    }
}
