//! Keyboard input state tracking

use std::collections::HashSet;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Tracks keyboard state between frames
pub struct InputState {
    /// Currently held keys
    keys_pressed: HashSet<KeyCode>,
    /// Press events received this frame, auto-repeats included, in arrival order
    key_presses: Vec<KeyCode>,
}

impl InputState {
    /// Create new input state
    pub fn new() -> Self {
        Self {
            keys_pressed: HashSet::new(),
            key_presses: Vec::new(),
        }
    }

    /// Process a window event
    pub fn process_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::KeyboardInput {
            event: KeyEvent {
                physical_key: PhysicalKey::Code(key_code),
                state,
                ..
            },
            ..
        } = event
        {
            match state {
                ElementState::Pressed => self.press(*key_code),
                ElementState::Released => self.release(*key_code),
            }
        }
    }

    /// Record a key press (or auto-repeat)
    pub fn press(&mut self, key: KeyCode) {
        self.keys_pressed.insert(key);
        self.key_presses.push(key);
    }

    /// Record a key release
    pub fn release(&mut self, key: KeyCode) {
        self.keys_pressed.remove(&key);
    }

    /// Call at end of frame to reset per-frame state
    pub fn end_frame(&mut self) {
        self.key_presses.clear();
    }

    /// Check if key is currently held
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Whether either shift key is held
    pub fn is_shift_pressed(&self) -> bool {
        self.is_key_pressed(KeyCode::ShiftLeft) || self.is_key_pressed(KeyCode::ShiftRight)
    }

    /// Press events received this frame
    pub fn key_presses(&self) -> &[KeyCode] {
        &self.key_presses
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}
