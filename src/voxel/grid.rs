//! Authoritative voxel grid.
//!
//! Voxels are kept in a dense vector whose order is the render slot order.
//! Appends go to the end and removals swap the last voxel into the hole, so
//! every mutation touches at most two slots. Each effective mutation bumps
//! the generation and is recorded in a bounded journal that the instance
//! projector replays instead of re-projecting the whole grid.

use std::cell::OnceCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use glam::IVec3;

use crate::core::error::Error;
use crate::core::types::Result;
use super::voxel::{HoverTarget, Voxel, VoxelColor, VoxelId};

/// Journal entries kept before older history is dropped
const JOURNAL_LIMIT: usize = 4096;

/// One slot-level change to the grid order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridChange {
    /// A voxel was pushed to `slot` (the new last slot)
    Appended { slot: usize },
    /// The voxel at `slot` was removed. If `moved_from` is set, the voxel that
    /// was there (the old last slot) now lives in `slot`.
    Removed { slot: usize, moved_from: Option<usize> },
    /// The voxel at `slot` changed in place (identity assigned)
    Modified { slot: usize },
}

/// Result of a successful add
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddOutcome {
    /// Slot the voxel was appended to
    pub slot: usize,
    /// True when the voxel has no store identity yet
    pub pending: bool,
}

/// Read-only point-in-time view of the grid
#[derive(Clone, Debug)]
pub struct GridSnapshot {
    generation: u64,
    voxels: Arc<[Voxel]>,
}

impl GridSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }
}

/// The set of placed voxels, unique by position
pub struct VoxelGrid {
    voxels: Vec<Voxel>,
    by_position: HashMap<IVec3, usize>,
    by_id: HashMap<VoxelId, usize>,
    capacity: usize,
    generation: u64,
    /// (generation after the change, change)
    journal: VecDeque<(u64, GridChange)>,
    /// Oldest generation the journal can replay from
    journal_base: u64,
    dirty: bool,
    snapshot: OnceCell<GridSnapshot>,
}

impl VoxelGrid {
    /// Create an empty grid holding at most `capacity` voxels
    pub fn new(capacity: usize) -> Self {
        Self {
            voxels: Vec::new(),
            by_position: HashMap::new(),
            by_id: HashMap::new(),
            capacity,
            generation: 0,
            journal: VecDeque::new(),
            journal_base: 0,
            dirty: false,
            snapshot: OnceCell::new(),
        }
    }

    /// Append a voxel.
    ///
    /// Conflict policy is reject: an occupied cell returns `Error::Occupied` and
    /// leaves the grid untouched. An identity already present elsewhere is
    /// reported as occupying that other cell.
    pub fn add(&mut self, position: IVec3, color: VoxelColor, id: Option<VoxelId>) -> Result<AddOutcome> {
        if self.by_position.contains_key(&position) {
            return Err(Error::Occupied(position));
        }
        if let Some(existing) = id.and_then(|id| self.by_id.get(&id)) {
            return Err(Error::Occupied(self.voxels[*existing].position));
        }
        if self.voxels.len() >= self.capacity {
            return Err(Error::CapacityExceeded { capacity: self.capacity });
        }

        let slot = self.voxels.len();
        self.voxels.push(Voxel::new(position, color, id));
        self.by_position.insert(position, slot);
        if let Some(id) = id {
            self.by_id.insert(id, slot);
        }
        self.record(GridChange::Appended { slot });

        log::debug!("Voxel added at {} (slot {}, id {:?})", position, slot, id);
        Ok(AddOutcome { slot, pending: id.is_none() })
    }

    /// Remove by store identity. Absent identities are a no-op.
    pub fn remove_by_identity(&mut self, id: VoxelId) -> bool {
        match self.by_id.get(&id) {
            Some(&slot) => {
                self.remove_slot(slot);
                true
            }
            None => false,
        }
    }

    /// Remove by coordinate; the path for voxels whose identity is not known yet
    pub fn remove_by_position(&mut self, position: IVec3) -> bool {
        self.take_at(position).is_some()
    }

    /// Remove a hovered voxel by identity, or by position while the identity
    /// is not known yet. A known identity that is gone removes nothing, even
    /// if another voxel now occupies the cell.
    pub fn remove(&mut self, target: &HoverTarget) -> Option<Voxel> {
        match target.id {
            Some(id) => {
                let slot = *self.by_id.get(&id)?;
                Some(self.remove_slot(slot))
            }
            None => self.take_at(target.position),
        }
    }

    /// Remove and return the voxel at a position
    pub fn take_at(&mut self, position: IVec3) -> Option<Voxel> {
        let slot = *self.by_position.get(&position)?;
        Some(self.remove_slot(slot))
    }

    /// Give a pending voxel its store identity. Existing identities are never replaced.
    pub fn assign_identity(&mut self, position: IVec3, id: VoxelId) -> bool {
        let Some(&slot) = self.by_position.get(&position) else {
            return false;
        };
        if self.voxels[slot].id.is_some() || self.by_id.contains_key(&id) {
            return false;
        }

        self.voxels[slot].id = Some(id);
        self.by_id.insert(id, slot);
        self.record(GridChange::Modified { slot });
        true
    }

    fn remove_slot(&mut self, slot: usize) -> Voxel {
        let removed = self.voxels.swap_remove(slot);
        self.by_position.remove(&removed.position);
        if let Some(id) = removed.id {
            self.by_id.remove(&id);
        }

        let moved_from = if slot < self.voxels.len() {
            let moved = self.voxels[slot];
            self.by_position.insert(moved.position, slot);
            if let Some(id) = moved.id {
                self.by_id.insert(id, slot);
            }
            Some(self.voxels.len())
        } else {
            None
        };
        self.record(GridChange::Removed { slot, moved_from });

        log::debug!("Voxel removed at {} (slot {})", removed.position, slot);
        removed
    }

    fn record(&mut self, change: GridChange) {
        self.generation += 1;
        self.dirty = true;
        self.snapshot = OnceCell::new();

        self.journal.push_back((self.generation, change));
        if self.journal.len() > JOURNAL_LIMIT {
            if let Some((generation, _)) = self.journal.pop_front() {
                self.journal_base = generation;
            }
        }
    }

    /// Consistent read-only view, cached until the next mutation
    pub fn snapshot(&self) -> GridSnapshot {
        self.snapshot
            .get_or_init(|| GridSnapshot {
                generation: self.generation,
                voxels: self.voxels.as_slice().into(),
            })
            .clone()
    }

    /// Changes applied after `generation`, or None if the journal no longer covers it
    pub fn changes_since(&self, generation: u64) -> Option<impl Iterator<Item = &GridChange> + '_> {
        if generation < self.journal_base || generation > self.generation {
            return None;
        }
        Some(
            self.journal
                .iter()
                .filter(move |(g, _)| *g > generation)
                .map(|(_, change)| change),
        )
    }

    /// Whether anything changed since the last `mark_clean`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Acknowledge that a consumer is synced up to `generation`; older journal entries are dropped
    pub fn mark_clean(&mut self, generation: u64) {
        if generation == self.generation {
            self.dirty = false;
        }
        while let Some(&(g, _)) = self.journal.front() {
            if g > generation {
                break;
            }
            self.journal.pop_front();
            self.journal_base = g;
        }
    }

    pub fn get(&self, position: IVec3) -> Option<&Voxel> {
        self.by_position.get(&position).map(|&slot| &self.voxels[slot])
    }

    pub fn get_by_identity(&self, id: VoxelId) -> Option<&Voxel> {
        self.by_id.get(&id).map(|&slot| &self.voxels[slot])
    }

    /// Voxel in render slot order
    pub fn get_slot(&self, slot: usize) -> Option<&Voxel> {
        self.voxels.get(slot)
    }

    pub fn contains(&self, position: IVec3) -> bool {
        self.by_position.contains_key(&position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voxel> {
        self.voxels.iter()
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.voxels.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of voxels still waiting for a store identity
    pub fn pending_count(&self) -> usize {
        self.voxels.len() - self.by_id.len()
    }
}
