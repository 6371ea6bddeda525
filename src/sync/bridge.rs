//! Optimistic local edits and remote merge
//!
//! The bridge never touches the grid from a background task. Store calls run
//! on the tokio runtime and report back through an unbounded queue; the frame
//! loop applies the queued events with `pump`, passing the grid in.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::IVec3;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::interact::placement::Intent;
use crate::voxel::{VoxelGrid, VoxelId};
use super::store::{NewVoxel, StoreNotification, VoxelRecord, VoxelStore};

/// Epoch value meaning "no active subscription"
const NO_EPOCH: u64 = 0;

/// Completion or notification queued for the frame loop
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeEvent {
    InsertAcked { ticket: u64, position: IVec3, id: VoxelId },
    InsertFailed { ticket: u64, position: IVec3, error: String },
    DeleteAcked { id: VoxelId },
    DeleteFailed { id: VoxelId, error: String },
    Loaded { records: Vec<VoxelRecord> },
    /// Reload after the feed lagged. `known` holds the identities the grid
    /// had when the reload was requested.
    Reloaded { known: Vec<VoxelId>, records: Vec<VoxelRecord> },
    LoadFailed { error: String },
    /// Realtime notification tagged with the subscription it arrived on
    Remote { epoch: u64, notification: StoreNotification },
    /// The realtime feed dropped notifications
    Lagged { epoch: u64, skipped: u64 },
}

/// Running totals for the status line and debug server
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Events that changed the grid
    pub applied: u64,
    /// Remote rows already present locally
    pub deduplicated: u64,
    /// Store calls that failed
    pub failed: u64,
    /// Events dropped because their subscription had ended
    pub discarded: u64,
    /// Inserts confirmed by the store
    pub acknowledged: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InflightState {
    /// Waiting for the store; the pending voxel is still ours
    Pending,
    /// A remote insert at the same cell gave the pending voxel this identity
    Adopted(VoxelId),
    /// The pending voxel was removed before the store answered
    Cancelled,
}

/// Handle for a realtime subscription. Dropping it unsubscribes.
pub struct Subscription {
    epoch: u64,
    active: Arc<AtomicU64>,
    task: AbortHandle,
}

impl Subscription {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether this subscription still feeds the bridge
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.epoch
    }

    /// Stop forwarding; safe to call more than once
    pub fn unsubscribe(&mut self) {
        let _ = self.active.compare_exchange(self.epoch, NO_EPOCH, Ordering::SeqCst, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Connects the grid to a `VoxelStore`
pub struct SyncBridge {
    store: Arc<dyn VoxelStore>,
    runtime: Handle,
    event_tx: mpsc::UnboundedSender<BridgeEvent>,
    event_rx: mpsc::UnboundedReceiver<BridgeEvent>,
    next_ticket: u64,
    /// Ticket -> state of each insert the store has not answered yet
    inflight: HashMap<u64, InflightState>,
    /// Cell -> ticket for voxels still waiting on their own insert
    pending_by_position: HashMap<IVec3, u64>,
    /// Epoch of the live subscription, `NO_EPOCH` when none
    active_epoch: Arc<AtomicU64>,
    last_epoch: u64,
    forward_task: Option<AbortHandle>,
    rollback_failed_inserts: bool,
    stats: SyncStats,
}

impl SyncBridge {
    pub fn new(store: Arc<dyn VoxelStore>, runtime: Handle) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            store,
            runtime,
            event_tx,
            event_rx,
            next_ticket: 1,
            inflight: HashMap::new(),
            pending_by_position: HashMap::new(),
            active_epoch: Arc::new(AtomicU64::new(NO_EPOCH)),
            last_epoch: NO_EPOCH,
            forward_task: None,
            rollback_failed_inserts: false,
            stats: SyncStats::default(),
        }
    }

    /// Remove optimistic voxels whose insert the store rejected
    pub fn with_rollback_failed_inserts(mut self, rollback: bool) -> Self {
        self.rollback_failed_inserts = rollback;
        self
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Inserts sent but not yet answered
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Epoch of the live subscription, if any
    pub fn active_epoch(&self) -> Option<u64> {
        match self.active_epoch.load(Ordering::SeqCst) {
            NO_EPOCH => None,
            epoch => Some(epoch),
        }
    }

    /// Apply a local intent to the grid now and push it to the store.
    ///
    /// `Occupied` and `CapacityExceeded` are returned unchanged; removing a
    /// voxel that is already gone is a no-op.
    pub fn apply_intent(&mut self, grid: &mut VoxelGrid, intent: Intent) -> Result<()> {
        match intent {
            Intent::Add { cell, color } => {
                grid.add(cell, color, None)?;

                let ticket = self.next_ticket;
                self.next_ticket += 1;
                self.inflight.insert(ticket, InflightState::Pending);
                self.pending_by_position.insert(cell, ticket);
                self.spawn_insert(ticket, NewVoxel::new(cell, color));
            }
            Intent::Remove { target } => {
                let Some(removed) = grid.remove(&target) else {
                    log::trace!("Remove of {} ignored, voxel already gone", target.position);
                    return Ok(());
                };

                match removed.id {
                    Some(id) => self.spawn_delete(id),
                    None => {
                        // The identity is deleted once the insert is acknowledged
                        if let Some(ticket) = self.pending_by_position.remove(&removed.position) {
                            if let Some(state) = self.inflight.get_mut(&ticket) {
                                *state = InflightState::Cancelled;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetch every stored voxel and merge it once it arrives
    pub fn request_initial_load(&self) {
        let store = self.store.clone();
        let tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let event = match store.load_all().await {
                Ok(records) => BridgeEvent::Loaded { records },
                Err(e) => BridgeEvent::LoadFailed { error: e.to_string() },
            };
            let _ = tx.send(event);
        });
    }

    /// Start forwarding realtime notifications. Replaces any earlier subscription.
    pub fn subscribe(&mut self) -> Result<Subscription> {
        self.unsubscribe();

        let mut rx = self.store.subscribe()?;
        self.last_epoch += 1;
        let epoch = self.last_epoch;
        self.active_epoch.store(epoch, Ordering::SeqCst);

        let tx = self.event_tx.clone();
        let task = self.runtime.spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(notification) => BridgeEvent::Remote { epoch, notification },
                    Err(RecvError::Lagged(skipped)) => BridgeEvent::Lagged { epoch, skipped },
                    Err(RecvError::Closed) => break,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        let abort = task.abort_handle();
        self.forward_task = Some(abort.clone());
        log::info!("Subscribed to store notifications (epoch {})", epoch);

        Ok(Subscription {
            epoch,
            active: self.active_epoch.clone(),
            task: abort,
        })
    }

    /// End the live subscription; queued notifications from it are discarded
    pub fn unsubscribe(&mut self) {
        let previous = self.active_epoch.swap(NO_EPOCH, Ordering::SeqCst);
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        if previous != NO_EPOCH {
            log::info!("Unsubscribed from store notifications (epoch {})", previous);
        }
    }

    /// Apply every queued event. Returns how many were processed.
    pub fn pump(&mut self, grid: &mut VoxelGrid) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.apply(grid, event);
            processed += 1;
        }
        processed
    }

    /// Wait for the next event and apply it
    pub async fn apply_next(&mut self, grid: &mut VoxelGrid) -> Option<BridgeEvent> {
        let event = self.event_rx.recv().await?;
        self.apply(grid, event.clone());
        Some(event)
    }

    /// Apply one event to the grid
    pub fn apply(&mut self, grid: &mut VoxelGrid, event: BridgeEvent) {
        match event {
            BridgeEvent::InsertAcked { ticket, position, id } => self.on_insert_acked(grid, ticket, position, id),
            BridgeEvent::InsertFailed { ticket, position, error } => {
                self.on_insert_failed(grid, ticket, position, &error)
            }
            BridgeEvent::DeleteAcked { id } => {
                log::trace!("Store confirmed delete of {}", id);
            }
            BridgeEvent::DeleteFailed { id, error } => {
                self.stats.failed += 1;
                log::warn!("Store delete of {} failed: {}", id, error);
            }
            BridgeEvent::Loaded { records } => {
                let count = records.len();
                for record in records {
                    self.merge_remote_insert(grid, record);
                }
                log::info!("Initial load merged {} stored voxels ({} in grid)", count, grid.len());
            }
            BridgeEvent::LoadFailed { error } => {
                self.stats.failed += 1;
                log::warn!("Initial load failed, keeping local grid: {}", error);
            }
            BridgeEvent::Remote { epoch, notification } => {
                if !self.accepts(epoch) {
                    self.stats.discarded += 1;
                    log::trace!("Discarding notification from ended subscription {}", epoch);
                    return;
                }
                match notification {
                    StoreNotification::Inserted { record } => self.merge_remote_insert(grid, record),
                    StoreNotification::Deleted { id } => {
                        if grid.remove_by_identity(id) {
                            self.stats.applied += 1;
                        } else {
                            self.stats.deduplicated += 1;
                            log::trace!("Remote delete of {} already applied", id);
                        }
                    }
                }
            }
            BridgeEvent::Lagged { epoch, skipped } => {
                if !self.accepts(epoch) {
                    self.stats.discarded += 1;
                    return;
                }
                log::warn!("Realtime feed skipped {} notifications, reloading", skipped);
                self.request_reload(grid);
            }
            BridgeEvent::Reloaded { known, records } => {
                let stored: HashSet<VoxelId> = records.iter().map(|r| r.id).collect();
                for record in records {
                    self.merge_remote_insert(grid, record);
                }
                // Rows confirmed before the reload and missing from it were
                // deleted while the feed lagged
                let mut removed = 0;
                for id in known.into_iter().filter(|id| !stored.contains(id)) {
                    if grid.remove_by_identity(id) {
                        removed += 1;
                    }
                }
                self.stats.applied += removed;
                log::info!("Reload merged {} stored voxels, removed {} deleted meanwhile", stored.len(), removed);
            }
        }
    }

    /// Fetch every stored voxel again and drop confirmed voxels that are gone
    fn request_reload(&self, grid: &VoxelGrid) {
        let known: Vec<VoxelId> = grid.iter().filter_map(|v| v.id).collect();
        let store = self.store.clone();
        let tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let event = match store.load_all().await {
                Ok(records) => BridgeEvent::Reloaded { known, records },
                Err(e) => BridgeEvent::LoadFailed { error: e.to_string() },
            };
            let _ = tx.send(event);
        });
    }

    fn accepts(&self, epoch: u64) -> bool {
        epoch != NO_EPOCH && self.active_epoch.load(Ordering::SeqCst) == epoch
    }

    fn on_insert_acked(&mut self, grid: &mut VoxelGrid, ticket: u64, position: IVec3, id: VoxelId) {
        self.stats.acknowledged += 1;
        let Some(state) = self.inflight.remove(&ticket) else {
            log::warn!("Acknowledgment for unknown insert ticket {}", ticket);
            return;
        };

        match state {
            InflightState::Pending => {
                self.pending_by_position.remove(&position);
                if grid.assign_identity(position, id) {
                    log::debug!("Voxel at {} confirmed as {}", position, id);
                } else {
                    log::warn!("Confirmed voxel {} has no pending cell at {}, deleting", id, position);
                    self.spawn_delete(id);
                }
            }
            InflightState::Adopted(adopted) if adopted == id => {
                log::trace!("Insert {} already adopted from the realtime feed", id);
            }
            InflightState::Adopted(adopted) => {
                // Another viewer filled the cell first; our row is a duplicate
                log::debug!("Cell {} already holds {}, deleting duplicate {}", position, adopted, id);
                self.spawn_delete(id);
            }
            InflightState::Cancelled => {
                log::debug!("Voxel {} was removed before confirmation, deleting", id);
                self.spawn_delete(id);
            }
        }
    }

    fn on_insert_failed(&mut self, grid: &mut VoxelGrid, ticket: u64, position: IVec3, error: &str) {
        self.stats.failed += 1;
        let Some(state) = self.inflight.remove(&ticket) else {
            return;
        };
        if state != InflightState::Pending {
            log::warn!("Store insert at {} failed after local removal: {}", position, error);
            return;
        }

        self.pending_by_position.remove(&position);
        if self.rollback_failed_inserts {
            grid.remove_by_position(position);
            log::warn!("Store insert at {} failed, rolled back: {}", position, error);
        } else {
            log::warn!("Store insert at {} failed, keeping local voxel: {}", position, error);
        }
    }

    /// Position-deduplicated merge of a stored row
    fn merge_remote_insert(&mut self, grid: &mut VoxelGrid, record: VoxelRecord) {
        let position = record.position();

        if grid.get_by_identity(record.id).is_some() {
            self.stats.deduplicated += 1;
            log::trace!("Remote insert {} already present", record.id);
            return;
        }

        if let Some(existing) = grid.get(position) {
            self.stats.deduplicated += 1;
            if existing.id.is_none() && grid.assign_identity(position, record.id) {
                if let Some(ticket) = self.pending_by_position.remove(&position) {
                    if let Some(state) = self.inflight.get_mut(&ticket) {
                        *state = InflightState::Adopted(record.id);
                    }
                }
                log::trace!("Pending voxel at {} adopted {}", position, record.id);
            } else {
                log::trace!("Remote insert {} at occupied cell {} skipped", record.id, position);
            }
            return;
        }

        match grid.add(position, record.color, Some(record.id)) {
            Ok(_) => self.stats.applied += 1,
            Err(Error::CapacityExceeded { capacity }) => {
                log::warn!("Remote voxel {} dropped, grid full at {}", record.id, capacity);
            }
            Err(e) => log::warn!("Remote voxel {} not merged: {}", record.id, e),
        }
    }

    fn spawn_insert(&self, ticket: u64, voxel: NewVoxel) {
        let store = self.store.clone();
        let tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let position = voxel.position();
            let event = match store.insert(voxel).await {
                Ok(id) => BridgeEvent::InsertAcked { ticket, position, id },
                Err(e) => BridgeEvent::InsertFailed { ticket, position, error: e.to_string() },
            };
            let _ = tx.send(event);
        });
    }

    fn spawn_delete(&self, id: VoxelId) {
        let store = self.store.clone();
        let tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let event = match store.delete(id).await {
                Ok(()) => BridgeEvent::DeleteAcked { id },
                Err(e) => BridgeEvent::DeleteFailed { id, error: e.to_string() },
            };
            let _ = tx.send(event);
        });
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
