//! Input state accumulated between two frames.

use glam::Vec2;
use hashbrown::HashSet;
use winit::event::{DeviceEvent, ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Key that toggles mouse capture.
pub const CAPTURE_TOGGLE: KeyCode = KeyCode::Escape;

/// Keys held, keys pressed since the last frame, raw mouse motion and
/// whether the mouse is captured for camera look.
#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
    raw_delta: Vec2,
    captured: bool,
    capture_changed: bool,
}

impl InputState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a window event. Returns `true` if the event was consumed.
    pub fn process_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.process_key(key, event.state);
                }
                true
            }
            WindowEvent::Focused(false) => {
                // Keys released while unfocused never reach us.
                self.held.clear();
                false
            }
            _ => false,
        }
    }

    /// Process a device event. Only raw mouse motion is used.
    pub fn process_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.add_mouse_motion(delta.0, delta.1);
        }
    }

    /// Record a key transition.
    pub fn process_key(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                // OS key repeat arrives as repeated presses.
                if self.held.insert(key) {
                    self.just_pressed.insert(key);
                    if key == CAPTURE_TOGGLE {
                        self.set_captured(!self.captured);
                    }
                }
            }
            ElementState::Released => {
                self.held.remove(&key);
            }
        }
    }

    /// Accumulate raw mouse motion.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.raw_delta += Vec2::new(dx as f32, dy as f32);
    }

    #[must_use]
    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// Whether `key` went down since the last [`Self::end_frame`].
    #[must_use]
    pub fn is_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    /// Raw mouse motion since the last frame.
    #[must_use]
    pub const fn mouse_delta(&self) -> Vec2 {
        self.raw_delta
    }

    /// Whether mouse motion should rotate the camera.
    #[must_use]
    pub const fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn set_captured(&mut self, captured: bool) {
        if self.captured != captured {
            self.captured = captured;
            self.capture_changed = true;
            tracing::debug!(captured, "Mouse capture changed");
        }
    }

    /// Returns the capture state if it changed since the last call, so the
    /// window can grab or release the cursor.
    pub fn take_capture_change(&mut self) -> Option<bool> {
        std::mem::take(&mut self.capture_changed).then_some(self.captured)
    }

    /// Reset per-frame state. Held keys and capture persist.
    pub fn end_frame(&mut self) {
        self.just_pressed.clear();
        self.raw_delta = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_hold_release() {
        let mut input = InputState::new();
        assert!(!input.is_held(KeyCode::KeyW));

        input.process_key(KeyCode::KeyW, ElementState::Pressed);
        assert!(input.is_held(KeyCode::KeyW));
        assert!(input.is_just_pressed(KeyCode::KeyW));

        input.end_frame();
        assert!(input.is_held(KeyCode::KeyW));
        assert!(!input.is_just_pressed(KeyCode::KeyW));

        input.process_key(KeyCode::KeyW, ElementState::Released);
        assert!(!input.is_held(KeyCode::KeyW));
    }

    #[test]
    fn key_repeat_is_not_a_new_press() {
        let mut input = InputState::new();
        input.process_key(KeyCode::KeyA, ElementState::Pressed);
        input.end_frame();

        input.process_key(KeyCode::KeyA, ElementState::Pressed);

        assert!(!input.is_just_pressed(KeyCode::KeyA));
    }

    #[test]
    fn mouse_delta_accumulates_until_end_of_frame() {
        let mut input = InputState::new();
        input.add_mouse_motion(3.0, -1.0);
        input.add_mouse_motion(2.0, 4.0);
        assert_eq!(input.mouse_delta(), Vec2::new(5.0, 3.0));

        input.end_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn escape_toggles_capture() {
        let mut input = InputState::new();
        assert!(!input.is_captured());
        assert_eq!(input.take_capture_change(), None);

        input.process_key(CAPTURE_TOGGLE, ElementState::Pressed);
        assert!(input.is_captured());
        assert_eq!(input.take_capture_change(), Some(true));
        assert_eq!(input.take_capture_change(), None);

        // Held Escape does not toggle again.
        input.process_key(CAPTURE_TOGGLE, ElementState::Pressed);
        assert!(input.is_captured());

        input.process_key(CAPTURE_TOGGLE, ElementState::Released);
        input.process_key(CAPTURE_TOGGLE, ElementState::Pressed);
        assert!(!input.is_captured());
        assert_eq!(input.take_capture_change(), Some(false));
    }
}
