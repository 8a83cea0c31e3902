//! MemoryStorage - keeps written images in memory

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{AxesCoordinates, ContractError, ImageStorage, IntegratedImage};
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct Shared {
    images: Mutex<Vec<IntegratedImage>>,
    flushes: AtomicU64,
    closed: AtomicBool,
}

/// Storage that appends every image to a shared vector
pub struct MemoryStorage {
    name: String,
    shared: Arc<Shared>,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::default(),
        }
    }

    /// Read access that stays valid after the storage moves to its worker
    pub fn contents(&self) -> MemoryContents {
        MemoryContents {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ImageStorage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put_image(&mut self, image: &IntegratedImage) -> Result<(), ContractError> {
        if self.shared.closed.load(Ordering::Relaxed) {
            return Err(ContractError::storage_write(&self.name, "storage is closed"));
        }
        lock(&self.shared.images).push(image.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        self.shared.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[instrument(name = "memory_storage_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.shared.closed.store(true, Ordering::Relaxed);
        debug!(storage = %self.name, images = lock(&self.shared.images).len(), "MemoryStorage closed");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared view of a [`MemoryStorage`]
#[derive(Debug, Clone)]
pub struct MemoryContents {
    shared: Arc<Shared>,
}

impl MemoryContents {
    /// Images in write order
    pub fn images(&self) -> Vec<IntegratedImage> {
        lock(&self.shared.images).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.images).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First image written at `axes`
    pub fn find(&self, axes: &AxesCoordinates) -> Option<IntegratedImage> {
        lock(&self.shared.images)
            .iter()
            .find(|image| image.axes == *axes)
            .cloned()
    }

    pub fn flush_count(&self) -> u64 {
        self.shared.flushes.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ImageTags, PixelData};

    fn image(time: u32) -> IntegratedImage {
        IntegratedImage {
            pixels: PixelData::from(vec![time as u8; 4]),
            tags: ImageTags::new(),
            axes: AxesCoordinates::new(time, 0, 0, 0),
            width: 2,
            height: 2,
            is_rgb: false,
        }
    }

    #[tokio::test]
    async fn test_contents_visible_after_move() {
        let mut storage = MemoryStorage::new("mem");
        let contents = storage.contents();

        storage.put_image(&image(0)).await.unwrap();
        storage.put_image(&image(1)).await.unwrap();
        storage.flush().await.unwrap();

        assert_eq!(contents.len(), 2);
        assert_eq!(contents.flush_count(), 1);
        let found = contents.find(&AxesCoordinates::new(1, 0, 0, 0)).unwrap();
        assert_eq!(found.pixels.sample(0), Some(1));
    }

    #[tokio::test]
    async fn test_closed_storage_rejects_writes() {
        let mut storage = MemoryStorage::new("mem");
        storage.close().await.unwrap();
        assert!(storage.contents().is_closed());
        assert!(matches!(
            storage.put_image(&image(0)).await,
            Err(ContractError::StorageWrite { .. })
        ));
    }
}
