//! Resource management

use crate::error::EquipStatError;

use tokio::sync::{Semaphore, SemaphorePermit};

/// [crate::resource_manager::ResourceManager] bounds the work the server takes on at once. Each
/// type of resource is managed with a Tokio Semaphore.
#[derive(Debug)]
pub struct ResourceManager {
    /// Optional semaphore for upload memory (bytes).
    memory: Option<Semaphore>,

    /// Optional total memory pool in bytes.
    total_memory: Option<usize>,

    /// Optional semaphore for ingest tasks.
    tasks: Option<Semaphore>,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(memory_limit: Option<usize>, task_limit: Option<usize>) -> Self {
        Self {
            memory: memory_limit.map(Semaphore::new),
            total_memory: memory_limit,
            tasks: task_limit.map(Semaphore::new),
        }
    }

    /// Acquire memory resource.
    pub async fn memory(&self, bytes: usize) -> Result<Option<SemaphorePermit>, EquipStatError> {
        if let Some(total_memory) = self.total_memory {
            if bytes > total_memory {
                return Err(EquipStatError::InsufficientMemory {
                    requested: bytes,
                    total: total_memory,
                });
            };
        };
        optional_acquire(&self.memory, bytes).await
    }

    /// Acquire a task resource.
    pub async fn task(&self) -> Result<Option<SemaphorePermit>, EquipStatError> {
        optional_acquire(&self.tasks, 1).await
    }
}

/// Acquire permits on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Semaphore>,
    n: usize,
) -> Result<Option<SemaphorePermit>, EquipStatError> {
    let n = n.try_into()?;
    if let Some(sem) = sem {
        sem.acquire_many(n)
            .await
            .map(Some)
            .map_err(|err| err.into())
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::TryAcquireError;

    #[tokio::test]
    async fn no_resource_management() {
        let rm = ResourceManager::new(None, None);
        assert!(rm.memory.is_none());
        assert!(rm.tasks.is_none());
        let _m = rm.memory(1 << 30).await.unwrap();
        let _t = rm.task().await.unwrap();
        assert!(_m.is_none());
        assert!(_t.is_none());
    }

    #[tokio::test]
    async fn full_resource_management() {
        let rm = ResourceManager::new(Some(1), Some(1));
        assert!(rm.memory.is_some());
        assert!(rm.tasks.is_some());
        let _m = rm.memory(1).await.unwrap();
        let _t = rm.task().await.unwrap();
        assert!(_m.is_some());
        assert!(_t.is_some());
        // Check that there are no more resources (without blocking).
        assert_eq!(
            rm.memory.as_ref().unwrap().try_acquire().err(),
            Some(TryAcquireError::NoPermits)
        );
        assert_eq!(
            rm.tasks.as_ref().unwrap().try_acquire().err(),
            Some(TryAcquireError::NoPermits)
        );
    }

    #[tokio::test]
    async fn upload_larger_than_memory_limit() {
        let rm = ResourceManager::new(Some(1024), None);
        assert!(matches!(
            rm.memory(2048).await,
            Err(EquipStatError::InsufficientMemory {
                requested: 2048,
                total: 1024
            })
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[tokio::test]
    async fn too_many_permits() {
        // Semaphores accept at most u32::MAX permits at once.
        let rm = ResourceManager::new(Some(Semaphore::MAX_PERMITS), None);
        assert!(matches!(
            rm.memory(Semaphore::MAX_PERMITS).await,
            Err(EquipStatError::TryFromInt(_))
        ));
    }
}
