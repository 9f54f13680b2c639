//! Discrete-step camera controller

use crate::core::camera::Camera;
use crate::core::input::InputState;
use crate::core::types::Vec3;
use winit::keyboard::KeyCode;

/// Moves the camera by a fixed step per key press, along world axes
///
/// W/S move along -z/+z, A/D along -x/+x, Space moves up and Shift+Space
/// moves down. Held keys move once per auto-repeat event.
pub struct StepCameraController {
    /// World units moved per key press
    pub step: f32,
}

impl StepCameraController {
    /// Create new controller
    pub fn new(step: f32) -> Self {
        Self { step }
    }

    /// Apply this frame's key presses to the camera
    ///
    /// Returns true if the camera moved.
    pub fn update(&self, camera: &mut Camera, input: &InputState) -> bool {
        let mut offset = Vec3::ZERO;
        for key in input.key_presses() {
            offset += match key {
                KeyCode::KeyW => -Vec3::Z,
                KeyCode::KeyS => Vec3::Z,
                KeyCode::KeyA => -Vec3::X,
                KeyCode::KeyD => Vec3::X,
                KeyCode::Space if input.is_shift_pressed() => -Vec3::Y,
                KeyCode::Space => Vec3::Y,
                _ => Vec3::ZERO,
            };
        }

        if offset == Vec3::ZERO {
            return false;
        }
        camera.position += offset * self.step;
        log::debug!("Camera moved to {:?}", camera.position);
        true
    }
}

impl Default for StepCameraController {
    fn default() -> Self {
        Self::new(1.0)
    }
}
