//! Pointer edges to add/remove intents

use crate::core::config::SandboxConfig;
use crate::core::types::IVec3;
use crate::voxel::{HoverTarget, VoxelColor};
use super::raycast::PlacementCandidate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Other,
}

/// A pointer button state change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerEdge {
    pub button: PointerButton,
    pub pressed: bool,
    /// Removal modifier (Shift or Alt) held at the time of the edge
    pub modifier: bool,
}

impl PointerEdge {
    pub fn press(button: PointerButton, modifier: bool) -> Self {
        Self { button, pressed: true, modifier }
    }

    pub fn release(button: PointerButton) -> Self {
        Self { button, pressed: false, modifier: false }
    }
}

/// A user request to change the grid
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Add { cell: IVec3, color: VoxelColor },
    Remove { target: HoverTarget },
}

/// Maps pointer presses onto the cached placement candidate
pub struct PlacementController {
    palette: Vec<VoxelColor>,
    selected: usize,
}

impl PlacementController {
    /// An empty palette falls back to the accent color
    pub fn new(palette: Vec<VoxelColor>) -> Self {
        let palette = if palette.is_empty() {
            vec![VoxelColor::ACCENT]
        } else {
            palette
        };
        Self { palette, selected: 0 }
    }

    /// Palette from config, starting on `default_color` (added in front if missing)
    pub fn from_config(config: &SandboxConfig) -> Self {
        let mut palette = config.palette.clone();
        let selected = match palette.iter().position(|c| *c == config.default_color) {
            Some(index) => index,
            None => {
                palette.insert(0, config.default_color);
                0
            }
        };
        Self { palette, selected }
    }

    /// Resolve a pointer edge. Only primary presses act; the candidate is
    /// whatever the interactor cached this frame.
    pub fn handle(&self, edge: PointerEdge, candidate: Option<&PlacementCandidate>) -> Option<Intent> {
        if !edge.pressed || edge.button != PointerButton::Primary {
            return None;
        }
        let candidate = candidate?;

        if edge.modifier {
            candidate.hovered.map(|target| Intent::Remove { target })
        } else {
            Some(Intent::Add {
                cell: candidate.target_cell,
                color: self.selected_color(),
            })
        }
    }

    pub fn selected_color(&self) -> VoxelColor {
        self.palette[self.selected]
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn palette(&self) -> &[VoxelColor] {
        &self.palette
    }

    /// Select a palette entry; out of range indices are ignored
    pub fn select_color(&mut self, index: usize) -> bool {
        if index < self.palette.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    /// Step through the palette, wrapping at both ends
    pub fn cycle_color(&mut self, delta: i32) {
        let len = self.palette.len() as i64;
        self.selected = (self.selected as i64 + delta as i64).rem_euclid(len) as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::VoxelId;

    fn candidate(hovered: Option<HoverTarget>) -> PlacementCandidate {
        PlacementCandidate {
            target_cell: IVec3::new(0, 0, 1),
            hovered,
            generation: 3,
        }
    }

    fn hover() -> HoverTarget {
        HoverTarget { position: IVec3::ZERO, id: Some(VoxelId(9)) }
    }

    #[test]
    fn test_primary_press_adds_at_target() {
        let controller = PlacementController::new(vec![VoxelColor::rgb(1, 2, 3)]);
        let intent = controller.handle(
            PointerEdge::press(PointerButton::Primary, false),
            Some(&candidate(Some(hover()))),
        );
        assert_eq!(intent, Some(Intent::Add { cell: IVec3::new(0, 0, 1), color: VoxelColor::rgb(1, 2, 3) }));
    }

    #[test]
    fn test_modifier_press_removes_hovered() {
        let controller = PlacementController::new(vec![]);
        let edge = PointerEdge::press(PointerButton::Primary, true);

        assert_eq!(
            controller.handle(edge, Some(&candidate(Some(hover())))),
            Some(Intent::Remove { target: hover() })
        );
        // Looking at the ground: nothing to remove
        assert_eq!(controller.handle(edge, Some(&candidate(None))), None);
    }

    #[test]
    fn test_ignored_edges() {
        let controller = PlacementController::new(vec![]);
        let c = candidate(Some(hover()));

        assert_eq!(controller.handle(PointerEdge::release(PointerButton::Primary), Some(&c)), None);
        assert_eq!(controller.handle(PointerEdge::press(PointerButton::Secondary, false), Some(&c)), None);
        assert_eq!(controller.handle(PointerEdge::press(PointerButton::Other, true), Some(&c)), None);
        assert_eq!(controller.handle(PointerEdge::press(PointerButton::Primary, false), None), None);
    }

    #[test]
    fn test_color_selection() {
        let palette = vec![VoxelColor::rgb(1, 0, 0), VoxelColor::rgb(0, 1, 0), VoxelColor::rgb(0, 0, 1)];
        let mut controller = PlacementController::new(palette);
        assert_eq!(controller.selected_color(), VoxelColor::rgb(1, 0, 0));

        assert!(controller.select_color(2));
        assert!(!controller.select_color(3));
        assert_eq!(controller.selected_index(), 2);

        controller.cycle_color(1);
        assert_eq!(controller.selected_index(), 0);
        controller.cycle_color(-1);
        assert_eq!(controller.selected_index(), 2);
        controller.cycle_color(-7);
        assert_eq!(controller.selected_index(), 1);
    }

    #[test]
    fn test_from_config_selects_default_color() {
        let config = SandboxConfig {
            palette: vec![VoxelColor::rgb(1, 0, 0)],
            default_color: VoxelColor::rgb(0, 0, 1),
            ..Default::default()
        };
        let controller = PlacementController::from_config(&config);
        assert_eq!(controller.palette().len(), 2);
        assert_eq!(controller.selected_color(), VoxelColor::rgb(0, 0, 1));

        let controller = PlacementController::from_config(&SandboxConfig::default());
        assert_eq!(controller.selected_color(), VoxelColor::ACCENT);
    }
}
