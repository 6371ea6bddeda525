//! External voxel store contract and the in-process store

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use glam::IVec3;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::voxel::{VoxelColor, VoxelId};

/// Boxed future returned by store calls
pub type StoreFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Buffered realtime notifications per subscriber before it lags
const NOTIFY_CAPACITY: usize = 1024;

/// A stored voxel row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelRecord {
    pub id: VoxelId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub color: VoxelColor,
}

impl VoxelRecord {
    pub fn position(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

/// Insert payload; the store assigns the identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVoxel {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub color: VoxelColor,
}

impl NewVoxel {
    pub fn new(position: IVec3, color: VoxelColor) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            color,
        }
    }

    pub fn position(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

/// Realtime change pushed to subscribers, including the writer's own changes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreNotification {
    Inserted { record: VoxelRecord },
    Deleted { id: VoxelId },
}

/// The persistence backend shared by all viewers
pub trait VoxelStore: Send + Sync {
    /// Every stored voxel
    fn load_all(&self) -> StoreFuture<Vec<VoxelRecord>>;

    /// Persist a voxel, returning its new identity
    fn insert(&self, voxel: NewVoxel) -> StoreFuture<VoxelId>;

    /// Delete by identity; deleting an absent identity succeeds
    fn delete(&self, id: VoxelId) -> StoreFuture<()>;

    /// Realtime feed of inserts and deletes
    fn subscribe(&self) -> Result<broadcast::Receiver<StoreNotification>>;
}

struct MemoryInner {
    rows: Mutex<BTreeMap<VoxelId, VoxelRecord>>,
    next_id: AtomicU64,
    offline: AtomicBool,
    notify: broadcast::Sender<StoreNotification>,
}

/// In-process store. Clones share the same rows, so several viewers in one
/// process see each other's changes.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                rows: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                offline: AtomicBool::new(false),
                notify,
            }),
        }
    }

    /// While offline every call fails with `Error::Store`
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        log::info!("Memory store {}", if offline { "offline" } else { "online" });
    }

    /// Current rows in identity order
    pub async fn records(&self) -> Vec<VoxelRecord> {
        self.inner.rows.lock().await.values().copied().collect()
    }

    fn check_online(inner: &MemoryInner) -> Result<()> {
        if inner.offline.load(Ordering::SeqCst) {
            Err(Error::Store("memory store is offline".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VoxelStore for MemoryStore {
    fn load_all(&self) -> StoreFuture<Vec<VoxelRecord>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check_online(&inner)?;
            let rows = inner.rows.lock().await;
            Ok(rows.values().copied().collect())
        })
    }

    fn insert(&self, voxel: NewVoxel) -> StoreFuture<VoxelId> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check_online(&inner)?;
            let id = VoxelId(inner.next_id.fetch_add(1, Ordering::SeqCst));
            let record = VoxelRecord {
                id,
                x: voxel.x,
                y: voxel.y,
                z: voxel.z,
                color: voxel.color,
            };
            inner.rows.lock().await.insert(id, record);

            // No subscribers is not an error
            let _ = inner.notify.send(StoreNotification::Inserted { record });
            Ok(id)
        })
    }

    fn delete(&self, id: VoxelId) -> StoreFuture<()> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check_online(&inner)?;
            if inner.rows.lock().await.remove(&id).is_some() {
                let _ = inner.notify.send(StoreNotification::Deleted { id });
            }
            Ok(())
        })
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<StoreNotification>> {
        Self::check_online(&self.inner)?;
        Ok(self.inner.notify.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_load_delete() {
        let store = MemoryStore::new();
        let a = store.insert(NewVoxel::new(IVec3::new(1, 2, 3), VoxelColor::ACCENT)).await.unwrap();
        let b = store.insert(NewVoxel::new(IVec3::ZERO, VoxelColor::rgb(1, 1, 1))).await.unwrap();
        assert_ne!(a, b);

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].position(), IVec3::new(1, 2, 3));

        store.delete(a).await.unwrap();
        store.delete(a).await.unwrap();
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);

        assert!(matches!(store.load_all().await, Err(Error::Store(_))));
        assert!(matches!(store.insert(NewVoxel::new(IVec3::ZERO, VoxelColor::ACCENT)).await, Err(Error::Store(_))));
        assert!(matches!(store.delete(VoxelId(1)).await, Err(Error::Store(_))));
        assert!(store.subscribe().is_err());

        store.set_offline(false);
        assert!(store.load_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_rows_and_notify() {
        let store = MemoryStore::new();
        let other = store.clone();
        let mut rx = store.subscribe().unwrap();

        let id = other.insert(NewVoxel::new(IVec3::ONE, VoxelColor::ACCENT)).await.unwrap();
        other.delete(id).await.unwrap();

        match rx.recv().await.unwrap() {
            StoreNotification::Inserted { record } => {
                assert_eq!(record.id, id);
                assert_eq!(record.position(), IVec3::ONE);
            }
            other => panic!("unexpected notification {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap(), StoreNotification::Deleted { id });
    }

    #[test]
    fn test_record_serde() {
        let record = VoxelRecord { id: VoxelId(7), x: 2, y: 3, z: -1, color: VoxelColor::ACCENT };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r##"{"id":7,"x":2,"y":3,"z":-1,"color":"#298de6"}"##);
        assert_eq!(serde_json::from_str::<VoxelRecord>(&json).unwrap(), record);
    }
}
