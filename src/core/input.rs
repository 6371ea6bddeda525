//! Input state tracking

use std::collections::HashSet;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::interact::placement::{PointerButton, PointerEdge};

const DIGIT_KEYS: [KeyCode; 9] = [
    KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3,
    KeyCode::Digit4, KeyCode::Digit5, KeyCode::Digit6,
    KeyCode::Digit7, KeyCode::Digit8, KeyCode::Digit9,
];

/// Tracks keyboard and mouse input state
pub struct InputState {
    /// Currently pressed keys
    keys_pressed: HashSet<KeyCode>,
    /// Keys pressed this frame
    keys_just_pressed: HashSet<KeyCode>,
    /// Mouse movement delta since last frame
    mouse_delta: (f32, f32),
    /// Accumulated raw motion while the cursor is grabbed
    mouse_delta_accumulated: (f32, f32),
    /// Currently pressed mouse buttons
    mouse_buttons: HashSet<MouseButton>,
    /// Whether mouse is captured
    mouse_captured: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_pressed: HashSet::new(),
            keys_just_pressed: HashSet::new(),
            mouse_delta: (0.0, 0.0),
            mouse_delta_accumulated: (0.0, 0.0),
            mouse_buttons: HashSet::new(),
            mouse_captured: false,
        }
    }

    /// Process a window event, returning a pointer edge for mouse button changes
    pub fn process_event(&mut self, event: &WindowEvent) -> Option<PointerEdge> {
        match event {
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(key_code),
                    state,
                    ..
                },
                ..
            } => {
                match state {
                    ElementState::Pressed => self.press_key(*key_code),
                    ElementState::Released => {
                        self.keys_pressed.remove(key_code);
                    }
                }
                None
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = state.is_pressed();
                if pressed {
                    self.mouse_buttons.insert(*button);
                } else {
                    self.mouse_buttons.remove(button);
                }
                Some(PointerEdge {
                    button: match button {
                        MouseButton::Left => PointerButton::Primary,
                        MouseButton::Right => PointerButton::Secondary,
                        _ => PointerButton::Other,
                    },
                    pressed,
                    modifier: self.is_modifier_held(),
                })
            }
            WindowEvent::Focused(false) => {
                // Releases are lost while unfocused; forget held keys
                self.keys_pressed.clear();
                self.mouse_buttons.clear();
                None
            }
            _ => None,
        }
    }

    pub(crate) fn press_key(&mut self, key: KeyCode) {
        if self.keys_pressed.insert(key) {
            self.keys_just_pressed.insert(key);
        }
    }

    /// Process device event for raw mouse motion (when cursor is grabbed)
    pub fn process_mouse_motion(&mut self, delta: (f64, f64)) {
        self.mouse_delta_accumulated.0 += delta.0 as f32;
        self.mouse_delta_accumulated.1 += delta.1 as f32;
    }

    /// Latch the accumulated motion for this frame. Call before reading `mouse_delta`.
    pub fn begin_frame(&mut self) {
        self.mouse_delta = if self.mouse_captured {
            self.mouse_delta_accumulated
        } else {
            (0.0, 0.0)
        };
        self.mouse_delta_accumulated = (0.0, 0.0);
    }

    /// Call at end of frame to reset per-frame state
    pub fn end_frame(&mut self) {
        self.keys_just_pressed.clear();
    }

    /// Check if key is currently pressed
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Check if key was just pressed this frame
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.keys_just_pressed.contains(&key)
    }

    /// Removal modifier (Shift or Alt)
    pub fn is_modifier_held(&self) -> bool {
        [KeyCode::ShiftLeft, KeyCode::ShiftRight, KeyCode::AltLeft, KeyCode::AltRight]
            .iter()
            .any(|key| self.keys_pressed.contains(key))
    }

    /// Palette index of a digit key pressed this frame (1 maps to 0)
    pub fn digit_just_pressed(&self) -> Option<usize> {
        DIGIT_KEYS.iter().position(|key| self.keys_just_pressed.contains(key))
    }

    /// Get mouse delta for this frame
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    /// Check if mouse button is pressed
    pub fn is_mouse_button_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons.contains(&button)
    }

    /// Set mouse captured state
    pub fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        self.mouse_delta = (0.0, 0.0);
        self.mouse_delta_accumulated = (0.0, 0.0);
    }

    /// Check if mouse is captured
    pub fn is_mouse_captured(&self) -> bool {
        self.mouse_captured
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}
