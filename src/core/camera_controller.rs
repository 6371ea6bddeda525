//! First-person fly camera controller

use crate::core::camera::Camera;
use crate::core::input::InputState;
use winit::keyboard::KeyCode;

/// Fly controller: WASD to move, Space/C for up/down, mouse look while captured
pub struct FpsCameraController {
    /// Movement speed in units per second
    pub speed: f32,
    /// Mouse sensitivity
    pub sensitivity: f32,
    yaw: f32,
    pitch: f32,
}

impl FpsCameraController {
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self {
            speed,
            sensitivity,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Update camera based on input
    pub fn update(&mut self, camera: &mut Camera, input: &InputState, dt: f32) {
        if input.is_mouse_captured() {
            let (dx, dy) = input.mouse_delta();
            self.yaw -= dx * self.sensitivity * 0.002;
            self.pitch -= dy * self.sensitivity * 0.002;
            self.pitch = self.pitch.clamp(-1.55, 1.55);
            camera.set_rotation_euler(self.yaw, self.pitch);
        }

        // Horizontal movement ignores pitch so looking down does not sink the camera
        let forward = glam::Vec3::new(-self.yaw.sin(), 0.0, -self.yaw.cos());
        let right = glam::Vec3::new(self.yaw.cos(), 0.0, -self.yaw.sin());

        let mut velocity = glam::Vec3::ZERO;
        if input.is_key_pressed(KeyCode::KeyW) {
            velocity += forward;
        }
        if input.is_key_pressed(KeyCode::KeyS) {
            velocity -= forward;
        }
        if input.is_key_pressed(KeyCode::KeyA) {
            velocity -= right;
        }
        if input.is_key_pressed(KeyCode::KeyD) {
            velocity += right;
        }
        if input.is_key_pressed(KeyCode::Space) {
            velocity.y += 1.0;
        }
        if input.is_key_pressed(KeyCode::KeyC) {
            velocity.y -= 1.0;
        }

        if velocity.length_squared() > 0.0 {
            camera.position += velocity.normalize() * self.speed * dt;
        }
    }

    /// Set orientation from angles (in radians) and apply it to the camera
    pub fn set_orientation(&mut self, camera: &mut Camera, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-1.55, 1.55);
        camera.set_rotation_euler(self.yaw, self.pitch);
    }

    /// Turn toward a world point, keeping the controller's angles in sync
    pub fn look_at(&mut self, camera: &mut Camera, target: glam::Vec3) {
        let dir = (target - camera.position).normalize_or_zero();
        if dir == glam::Vec3::ZERO {
            return;
        }
        let yaw = (-dir.x).atan2(-dir.z);
        let pitch = dir.y.clamp(-1.0, 1.0).asin();
        self.set_orientation(camera, yaw, pitch);
    }
}

impl Default for FpsCameraController {
    fn default() -> Self {
        Self::new(10.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_movement_stays_level() {
        let mut controller = FpsCameraController::new(2.0, 1.0);
        let mut camera = Camera::default();
        controller.set_orientation(&mut camera, 0.0, -1.0);

        let mut input = InputState::new();
        input.press_key(KeyCode::KeyW);
        controller.update(&mut camera, &input, 1.0);

        assert!((camera.position.y - 0.0).abs() < 0.001);
        assert!((camera.position.z - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_orientation_matches_camera_forward() {
        let mut controller = FpsCameraController::default();
        let mut camera = Camera::default();
        controller.set_orientation(&mut camera, std::f32::consts::FRAC_PI_2, 0.0);

        // Yaw of +90 degrees turns -Z towards -X
        assert!((camera.forward().x - (-1.0)).abs() < 0.001);
    }

    #[test]
    fn test_look_at_points_camera() {
        let mut controller = FpsCameraController::default();
        let mut camera = Camera::default();
        camera.position = glam::Vec3::new(0.0, 5.0, 0.0);
        controller.look_at(&mut camera, glam::Vec3::new(5.0, 0.0, 0.0));

        let expected = glam::Vec3::new(1.0, -1.0, 0.0).normalize();
        assert!(camera.forward().distance(expected) < 0.001);
    }
}
