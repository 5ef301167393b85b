//! Window collaborator backed by winit.
//!
//! The event loop is pumped once per frame instead of owning the thread, so
//! the frame loop stays a plain `loop` in [`crate::FrameExecutor::run`].

use std::time::Duration;

use physarum_input::{DeviceEvent, InputState, WindowEvent};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::DeviceId;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{CursorGrabMode, Window, WindowAttributes, WindowId};

use crate::config::SimConfig;
use crate::error::RunError;
use crate::executor::FrameWindow;

const CREATE_ATTEMPTS: u32 = 100;
const CREATE_POLL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    create_error: Option<String>,
    close_requested: bool,
    zero_size: bool,
}

/// Borrows the executor's input state for the duration of one pump.
struct Pump<'a> {
    state: &'a mut WindowState,
    input: &'a mut InputState,
}

impl ApplicationHandler for Pump<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.window.is_some() {
            return;
        }
        match event_loop.create_window(self.state.attributes.clone()) {
            Ok(window) => self.state.window = Some(window),
            Err(e) => self.state.create_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.state.close_requested = true,
            WindowEvent::Resized(size) => {
                self.state.zero_size = size.width == 0 || size.height == 0;
            }
            event => {
                self.input.process_window_event(&event);
            }
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        self.input.process_device_event(&event);
    }
}

/// A fixed-size window and the event loop that feeds it.
pub struct WinitWindow {
    window: Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl WinitWindow {
    /// Open the window and wait for the platform to hand it over.
    ///
    /// The window is not resizable: the swapchain is never recreated.
    pub fn new(config: &SimConfig) -> Result<Self, RunError> {
        let mut event_loop = EventLoop::new().map_err(|e| RunError::Window(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut state = WindowState {
            attributes: Window::default_attributes()
                .with_title(&config.title)
                .with_inner_size(PhysicalSize::new(config.window_width, config.window_height))
                .with_resizable(false),
            ..WindowState::default()
        };

        let mut scratch = InputState::new();
        for _ in 0..CREATE_ATTEMPTS {
            let status = event_loop.pump_app_events(
                Some(CREATE_POLL),
                &mut Pump {
                    state: &mut state,
                    input: &mut scratch,
                },
            );
            if let Some(e) = state.create_error.take() {
                return Err(RunError::Window(e));
            }
            if let PumpStatus::Exit(code) = status {
                return Err(RunError::Window(format!(
                    "event loop exited with code {code} before the window opened"
                )));
            }
            if let Some(window) = state.window.take() {
                let size = window.inner_size();
                tracing::info!("Window created: {}x{}", size.width, size.height);
                return Ok(Self {
                    window,
                    state,
                    event_loop,
                });
            }
        }

        Err(RunError::Window(
            "platform never delivered the window".to_string(),
        ))
    }

    pub const fn window(&self) -> &Window {
        &self.window
    }
}

impl FrameWindow for WinitWindow {
    fn poll(&mut self, input: &mut InputState) {
        let status = self.event_loop.pump_app_events(
            Some(Duration::ZERO),
            &mut Pump {
                state: &mut self.state,
                input,
            },
        );
        if let PumpStatus::Exit(_) = status {
            self.state.close_requested = true;
        }
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn is_minimized(&self) -> bool {
        self.state.zero_size || self.window.is_minimized() == Some(true)
    }

    fn apply_capture(&mut self, captured: bool) {
        if captured {
            let grabbed = self
                .window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(e) = grabbed {
                tracing::warn!("Cursor grab failed: {e}");
            }
        } else if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
            tracing::warn!("Cursor release failed: {e}");
        }
        self.window.set_cursor_visible(!captured);
    }
}
