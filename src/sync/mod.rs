//! Store synchronization
//!
//! Local intents are applied to the grid immediately and pushed to the
//! `VoxelStore` in the background. Store completions and realtime
//! notifications come back as `BridgeEvent`s that the frame loop drains.

pub mod store;
pub mod bridge;

pub use store::{MemoryStore, NewVoxel, StoreFuture, StoreNotification, VoxelRecord, VoxelStore};
pub use bridge::{BridgeEvent, Subscription, SyncBridge, SyncStats};
