//! Keyboard and mouse state for the physarum viewer.
//!
//! The window's event pump feeds events into an [`InputState`]. The frame loop
//! reads it once per frame, hands it to the camera by reference, and then calls
//! [`InputState::end_frame`]. Nothing is registered as a callback.
//!
//! ```ignore
//! // event pump
//! input.process_window_event(&event);
//! input.process_device_event(&device_event);
//!
//! // frame
//! let moved = camera.update(&input, dt);
//! input.end_frame();
//! ```

mod state;

pub use state::InputState;

pub use winit::event::{DeviceEvent, ElementState, WindowEvent};
pub use winit::keyboard::KeyCode;
