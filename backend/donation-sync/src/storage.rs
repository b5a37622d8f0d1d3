//! Durable single-key storage backing the offline queue.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db;
use crate::errors::StorageFault;

/// One read/write slot addressed by a fixed key.
#[async_trait]
pub trait DurableSlot: Send + Sync {
    async fn get(&self) -> Result<Option<Vec<u8>>, StorageFault>;

    async fn set(&self, bytes: &[u8]) -> Result<(), StorageFault>;

    async fn clear(&self) -> Result<(), StorageFault>;

    /// Read the slot and clear it. Backends that can do this in one step
    /// should override the default.
    async fn take(&self) -> Result<Option<Vec<u8>>, StorageFault> {
        let value = self.get().await?;
        if value.is_some() {
            self.clear().await?;
        }
        Ok(value)
    }
}

/// Slot stored as a row in the `durable_slots` table.
#[derive(Clone)]
pub struct SqliteSlot {
    pool: SqlitePool,
    key: String,
}

impl SqliteSlot {
    pub fn new(pool: SqlitePool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }
}

#[async_trait]
impl DurableSlot for SqliteSlot {
    async fn get(&self) -> Result<Option<Vec<u8>>, StorageFault> {
        Ok(db::get_slot(&self.pool, &self.key).await?)
    }

    async fn set(&self, bytes: &[u8]) -> Result<(), StorageFault> {
        Ok(db::set_slot(&self.pool, &self.key, bytes).await?)
    }

    async fn clear(&self) -> Result<(), StorageFault> {
        Ok(db::clear_slot(&self.pool, &self.key).await?)
    }

    async fn take(&self) -> Result<Option<Vec<u8>>, StorageFault> {
        Ok(db::take_slot(&self.pool, &self.key).await?)
    }
}

/// Process-local slot. Does not survive restarts.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<Vec<u8>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Vec<u8>>>, StorageFault> {
        self.value
            .lock()
            .map_err(|_| StorageFault::Unavailable("memory slot poisoned".to_string()))
    }
}

#[async_trait]
impl DurableSlot for MemorySlot {
    async fn get(&self) -> Result<Option<Vec<u8>>, StorageFault> {
        Ok(self.lock()?.clone())
    }

    async fn set(&self, bytes: &[u8]) -> Result<(), StorageFault> {
        *self.lock()? = Some(bytes.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageFault> {
        *self.lock()? = None;
        Ok(())
    }

    async fn take(&self) -> Result<Option<Vec<u8>>, StorageFault> {
        Ok(self.lock()?.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_slot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let url = path.to_str().unwrap().to_string();

        {
            let pool = db::init_pool(&url).await.unwrap();
            let slot = SqliteSlot::new(pool.clone(), "pendingDonations");
            slot.set(b"[1,2,3]").await.unwrap();
            pool.close().await;
        }

        let pool = db::init_pool(&url).await.unwrap();
        let slot = SqliteSlot::new(pool, "pendingDonations");
        assert_eq!(slot.get().await.unwrap(), Some(b"[1,2,3]".to_vec()));
        assert_eq!(slot.take().await.unwrap(), Some(b"[1,2,3]".to_vec()));
        assert_eq!(slot.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_slot_take_clears() {
        let slot = MemorySlot::new();
        assert_eq!(slot.take().await.unwrap(), None);
        slot.set(b"x").await.unwrap();
        assert_eq!(slot.take().await.unwrap(), Some(b"x".to_vec()));
        assert_eq!(slot.get().await.unwrap(), None);
    }
}
