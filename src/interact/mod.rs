//! Picking and placement
//!
//! `RaycastInteractor` turns the view ray into a `PlacementCandidate` once per
//! frame; `PlacementController` turns pointer edges plus that candidate into
//! add/remove intents.

pub mod raycast;
pub mod placement;

pub use raycast::{GroundPlane, InstanceBatch, PickHit, PickTarget, PlacementCandidate, RaycastInteractor, target_cell};
pub use placement::{Intent, PlacementController, PointerButton, PointerEdge};
