//! Offline queue for donations that did not reach the gateway.
//!
//! The whole queue is one JSON array in a single [`DurableSlot`]. Storage
//! faults never reach the caller: they are logged, remembered as the
//! store's last fault, and a queue that cannot be read counts as empty.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::errors::StorageFault;
use crate::models::NewDonation;
use crate::storage::DurableSlot;

/// Fixed key of the queue slot.
pub const QUEUE_KEY: &str = "pendingDonations";

/// A donation waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub donation: NewDonation,
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(donation: NewDonation) -> Self {
        Self {
            donation,
            queued_at: Utc::now(),
        }
    }
}

pub struct QueueStore {
    slot: Arc<dyn DurableSlot>,
    /// Serializes read-modify-write sequences on the slot.
    write_lock: Mutex<()>,
    last_fault: StdMutex<Option<String>>,
}

impl QueueStore {
    pub fn new(slot: Arc<dyn DurableSlot>) -> Self {
        Self {
            slot,
            write_lock: Mutex::new(()),
            last_fault: StdMutex::new(None),
        }
    }

    /// Append a donation to the back of the queue.
    pub async fn enqueue(&self, donation: NewDonation) {
        self.push_back(vec![QueueEntry::new(donation)]).await;
    }

    /// Put entries back at the front of the queue, keeping their order.
    pub async fn restore(&self, entries: Vec<QueueEntry>) {
        if entries.is_empty() {
            return;
        }
        let _guard = self.write_lock.lock().await;
        let mut queue = entries;
        queue.extend(self.read().await);
        self.write(&queue).await;
    }

    /// Read every pending entry and clear the queue.
    pub async fn dequeue_all(&self) -> Vec<QueueEntry> {
        let _guard = self.write_lock.lock().await;
        match self.slot.take().await {
            Ok(Some(bytes)) => self.decode(&bytes),
            Ok(None) => Vec::new(),
            Err(e) => {
                self.record_fault("dequeue", e);
                Vec::new()
            }
        }
    }

    pub async fn has_pending(&self) -> bool {
        !self.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.read().await.len()
    }

    /// Return and clear the last swallowed storage fault.
    pub fn take_fault(&self) -> Option<String> {
        self.last_fault.lock().ok().and_then(|mut f| f.take())
    }

    async fn push_back(&self, entries: Vec<QueueEntry>) {
        let _guard = self.write_lock.lock().await;
        let mut queue = self.read().await;
        queue.extend(entries);
        self.write(&queue).await;
        debug!("Offline queue now holds {} entries", queue.len());
    }

    async fn read(&self) -> Vec<QueueEntry> {
        match self.slot.get().await {
            Ok(Some(bytes)) => self.decode(&bytes),
            Ok(None) => Vec::new(),
            Err(e) => {
                self.record_fault("read", e);
                Vec::new()
            }
        }
    }

    async fn write(&self, queue: &[QueueEntry]) {
        let result = match serde_json::to_vec(queue) {
            Ok(bytes) => self.slot.set(&bytes).await,
            Err(e) => Err(StorageFault::from(e)),
        };
        if let Err(e) = result {
            self.record_fault("write", e);
        }
    }

    fn decode(&self, bytes: &[u8]) -> Vec<QueueEntry> {
        serde_json::from_slice(bytes).unwrap_or_else(|e| {
            self.record_fault("decode", StorageFault::from(e));
            Vec::new()
        })
    }

    fn record_fault(&self, op: &str, fault: StorageFault) {
        error!("Offline queue {op} failed: {fault}");
        if let Ok(mut last) = self.last_fault.lock() {
            *last = Some(fault.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySlot;
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    fn donation(amount: i64) -> NewDonation {
        NewDonation::new(Decimal::new(amount, 0), "kiosk")
    }

    fn amounts(entries: &[QueueEntry]) -> Vec<Decimal> {
        entries.iter().map(|e| e.donation.amount_eur).collect()
    }

    #[tokio::test]
    async fn dequeue_all_is_fifo_and_empties_store() {
        let store = QueueStore::new(Arc::new(MemorySlot::new()));
        assert!(!store.has_pending().await);

        for amount in [1, 2, 3] {
            store.enqueue(donation(amount)).await;
        }
        assert!(store.has_pending().await);
        assert_eq!(store.len().await, 3);

        let drained = store.dequeue_all().await;
        assert_eq!(
            amounts(&drained),
            vec![Decimal::new(1, 0), Decimal::new(2, 0), Decimal::new(3, 0)]
        );
        assert!(!store.has_pending().await);
        assert!(store.dequeue_all().await.is_empty());
    }

    #[tokio::test]
    async fn restore_goes_ahead_of_newer_entries() {
        let store = QueueStore::new(Arc::new(MemorySlot::new()));
        store.enqueue(donation(9)).await;

        let mut failed = QueueEntry::new(donation(7));
        failed.queued_at = Utc::now() - chrono::Duration::hours(1);
        store.restore(vec![failed.clone()]).await;

        let drained = store.dequeue_all().await;
        assert_eq!(drained[0], failed);
        assert_eq!(amounts(&drained), vec![Decimal::new(7, 0), Decimal::new(9, 0)]);
    }

    #[tokio::test]
    async fn payload_round_trips_through_json() {
        let slot = Arc::new(MemorySlot::new());
        let store = QueueStore::new(slot.clone());
        let mut d = NewDonation::new(Decimal::new(1050, 2), "kiosk");
        d.project_name = Some("Choir".to_string());
        d.payment_method = Some(crate::models::PaymentMethod::Cash);
        store.enqueue(d.clone()).await;

        let raw = slot.get().await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json[0]["amount_eur"], "10.50");
        assert_eq!(json[0]["payment_method"], "cash");

        let drained = store.dequeue_all().await;
        assert_eq!(drained[0].donation, d);
    }

    #[tokio::test]
    async fn corrupt_payload_reads_as_empty_and_records_fault() {
        let slot = Arc::new(MemorySlot::new());
        slot.set(b"not json").await.unwrap();
        let store = QueueStore::new(slot);

        assert!(!store.has_pending().await);
        assert!(store.take_fault().unwrap().contains("Corrupt"));
        assert!(store.take_fault().is_none());
    }

    struct BrokenSlot;

    #[async_trait]
    impl DurableSlot for BrokenSlot {
        async fn get(&self) -> Result<Option<Vec<u8>>, StorageFault> {
            Err(StorageFault::Unavailable("disk gone".to_string()))
        }
        async fn set(&self, _bytes: &[u8]) -> Result<(), StorageFault> {
            Err(StorageFault::Unavailable("disk gone".to_string()))
        }
        async fn clear(&self) -> Result<(), StorageFault> {
            Err(StorageFault::Unavailable("disk gone".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_faults_are_swallowed() {
        let store = QueueStore::new(Arc::new(BrokenSlot));
        store.enqueue(donation(10)).await;
        assert!(store.dequeue_all().await.is_empty());
        assert!(store.take_fault().unwrap().contains("disk gone"));
    }
}
