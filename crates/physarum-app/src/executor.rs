//! The single-in-flight frame loop.
//!
//! One command buffer, one fence and two semaphores serve every frame. The
//! loop blocks on the fence from the previous submission before it records
//! anything, so the descriptor sets rewritten during recording are never in
//! use by the GPU.
//!
//! [`FrameExecutor`] only sequences calls. The Vulkan work lives behind
//! [`FrameDevice`] and the window behind [`FrameWindow`], which lets the
//! ordering be checked without a GPU.

use physarum_gpu::{GpuError, Result};
use physarum_input::InputState;
use physarum_sim::{DisplayPushConstants, FlyCamera, FrameParams, PassKind, COMPUTE_SEQUENCE};

use crate::clock::{FrameClock, FrameSummary};
use crate::config::SimConfig;
use crate::error::RunError;

/// Where the executor is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames; the command buffer may still be executing.
    Idle,
    /// The fence has been observed and the command buffer is recording.
    Recording,
    /// Commands are queued.
    Submitted,
    /// The swapchain image was queued for presentation, or presentation was
    /// skipped because the window is minimized.
    Presented,
}

impl FrameState {
    /// The only state this one may move to.
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::Recording,
            Self::Recording => Self::Submitted,
            Self::Submitted => Self::Presented,
            Self::Presented => Self::Idle,
        }
    }
}

/// GPU side of a frame.
///
/// Calls arrive in the order documented on [`FrameExecutor::run_frame`].
pub trait FrameDevice {
    /// Block until the previous submission has finished.
    fn wait_for_fence(&mut self) -> Result<()>;
    /// Reset the command buffer and begin recording.
    fn begin_commands(&mut self) -> Result<()>;
    /// Record one compute pass over the current roles.
    fn record_pass(&mut self, pass: PassKind, frame: &FrameParams) -> Result<()>;
    /// Exchange the read and write roles.
    fn swap_roles(&mut self);
    /// Make the final read image ready for sampling.
    fn finish_compute(&mut self) -> Result<()>;
    /// Acquire a swapchain image, returning its index.
    fn acquire(&mut self) -> Result<u32>;
    /// Record the presentation draw into swapchain image `image_index`.
    fn record_present(&mut self, image_index: u32, push: &DisplayPushConstants) -> Result<()>;
    fn end_commands(&mut self) -> Result<()>;
    fn reset_fence(&mut self) -> Result<()>;
    /// Submit, waiting on the acquire semaphore and signalling render-finished
    /// only when `presenting`.
    fn submit(&mut self, presenting: bool) -> Result<()>;
    fn present(&mut self, image_index: u32) -> Result<()>;
    fn wait_idle(&mut self) -> Result<()>;
    /// Descriptor set updates issued so far.
    ///
    /// Every recorded pass must raise it: the images behind the read and
    /// write roles change between passes.
    fn descriptor_updates(&self) -> u64;
}

/// Window side of a frame, polled once per frame.
pub trait FrameWindow {
    /// Drain pending events into `input`.
    fn poll(&mut self, input: &mut InputState);
    fn should_close(&self) -> bool;
    fn is_minimized(&self) -> bool;
    /// Grab or release the cursor.
    fn apply_capture(&mut self, _captured: bool) {}
}

/// Drives frames until the window asks to close.
pub struct FrameExecutor {
    state: FrameState,
    camera: FlyCamera,
    input: InputState,
    clock: FrameClock,
    display_push: DisplayPushConstants,
    minimized: bool,
    frames: u64,
    presented: u64,
}

impl FrameExecutor {
    pub fn new(config: &SimConfig) -> Self {
        let camera = FlyCamera::new(config.render_aspect(), config.camera);
        let display_push = camera.push_constants();
        Self {
            state: FrameState::Idle,
            camera,
            input: InputState::new(),
            clock: FrameClock::new(config.fixed_timestep),
            display_push,
            minimized: false,
            frames: 0,
            presented: 0,
        }
    }

    pub const fn state(&self) -> FrameState {
        self.state
    }

    pub const fn camera(&self) -> &FlyCamera {
        &self.camera
    }

    pub const fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Frames fully submitted so far.
    pub const fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Frames that reached the presentation engine.
    pub const fn presented_count(&self) -> u64 {
        self.presented
    }

    /// Run until `window` asks to close, then wait for the device to go idle.
    ///
    /// Any device error ends the loop immediately.
    pub fn run<D, W>(
        &mut self,
        device: &mut D,
        window: &mut W,
    ) -> std::result::Result<FrameSummary, RunError>
    where
        D: FrameDevice,
        W: FrameWindow,
    {
        loop {
            window.poll(&mut self.input);
            if let Some(captured) = self.input.take_capture_change() {
                window.apply_capture(captured);
            }
            if window.should_close() {
                tracing::info!("Close requested");
                break;
            }

            let minimized = window.is_minimized();
            if minimized != self.minimized {
                if minimized {
                    tracing::debug!("Window minimized, presentation paused");
                } else {
                    tracing::debug!("Window restored, presentation resumed");
                }
                self.minimized = minimized;
            }

            let dt = self.clock.tick();
            if self.camera.update(&self.input, dt) {
                self.display_push = self.camera.push_constants();
            }
            self.input.end_frame();

            let params = FrameParams {
                time: self.clock.elapsed(),
                delta_time: dt,
            };
            let frame = self.frames;
            self.run_frame(device, minimized, &params)
                .map_err(|source| RunError::Frame { frame, source })?;
        }

        device.wait_idle().map_err(|source| RunError::Frame {
            frame: self.frames,
            source,
        })?;

        let summary = self.clock.summary();
        tracing::info!("Frame statistics: {summary}");
        Ok(summary)
    }

    /// Record, submit and (unless `minimized`) present one frame.
    ///
    /// 1. Wait for the previous frame's fence, then begin recording.
    /// 2. Record each compute pass, swapping roles after each.
    /// 3. Ready the final read image for sampling.
    /// 4. Unless minimized, acquire a swapchain image and record the draw.
    /// 5. End recording, reset the fence and submit.
    /// 6. Unless minimized, present.
    ///
    /// A pass that leaves its descriptors untouched fails the frame. On any
    /// error the executor returns to [`FrameState::Idle`].
    pub fn run_frame<D: FrameDevice>(
        &mut self,
        device: &mut D,
        minimized: bool,
        params: &FrameParams,
    ) -> Result<()> {
        let result = self.record_and_submit(device, minimized, params);
        if result.is_err() && self.state != FrameState::Idle {
            tracing::trace!(frame = self.frames, "{:?} -> Idle after error", self.state);
            self.state = FrameState::Idle;
        }
        result
    }

    fn record_and_submit<D: FrameDevice>(
        &mut self,
        device: &mut D,
        minimized: bool,
        params: &FrameParams,
    ) -> Result<()> {
        device.wait_for_fence()?;
        device.begin_commands()?;
        self.enter(FrameState::Recording);

        for pass in COMPUTE_SEQUENCE {
            let updates = device.descriptor_updates();
            device.record_pass(pass, params)?;
            check_rebound(device, updates, pass)?;
            device.swap_roles();
        }
        device.finish_compute()?;

        let image_index = if minimized {
            None
        } else {
            let index = device.acquire()?;
            let updates = device.descriptor_updates();
            device.record_present(index, &self.display_push)?;
            check_rebound(device, updates, PassKind::Display)?;
            Some(index)
        };

        device.end_commands()?;
        device.reset_fence()?;
        device.submit(image_index.is_some())?;
        self.enter(FrameState::Submitted);
        self.frames += 1;

        if let Some(index) = image_index {
            device.present(index)?;
            self.presented += 1;
        }
        self.enter(FrameState::Presented);
        self.enter(FrameState::Idle);
        Ok(())
    }

    fn enter(&mut self, state: FrameState) {
        debug_assert_eq!(self.state.next(), state, "illegal frame state change");
        tracing::trace!(frame = self.frames, "{:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

fn check_rebound<D: FrameDevice>(device: &D, before: u64, pass: PassKind) -> Result<()> {
    if device.descriptor_updates() > before {
        Ok(())
    } else {
        Err(GpuError::InvalidState(format!(
            "{pass} pass recorded without rebinding its descriptors"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physarum_input::{ElementState, KeyCode};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Call {
        Wait,
        Begin,
        Pass(PassKind),
        Swap,
        Finish,
        Acquire,
        RecordPresent(u32),
        End,
        ResetFence,
        Submit(bool),
        Present(u32),
        WaitIdle,
    }

    /// Device that records calls and tracks a fence and two role indices.
    #[derive(Default)]
    struct MockDevice {
        calls: Vec<Call>,
        fence_signaled: bool,
        read: usize,
        next_image: u32,
        fail_acquire: bool,
        fail_submit: bool,
        descriptor_updates: u64,
        /// Pass whose recording leaves its descriptors alone.
        stale_pass: Option<PassKind>,
    }

    impl MockDevice {
        fn new() -> Self {
            Self {
                fence_signaled: true,
                ..Self::default()
            }
        }

        fn count(&self, call: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| call(c)).count()
        }
    }

    impl FrameDevice for MockDevice {
        fn wait_for_fence(&mut self) -> Result<()> {
            assert!(self.fence_signaled, "waited on a fence that will never signal");
            self.calls.push(Call::Wait);
            Ok(())
        }

        fn begin_commands(&mut self) -> Result<()> {
            self.calls.push(Call::Begin);
            Ok(())
        }

        fn record_pass(&mut self, pass: PassKind, _frame: &FrameParams) -> Result<()> {
            self.calls.push(Call::Pass(pass));
            if self.stale_pass != Some(pass) {
                self.descriptor_updates += 1;
            }
            Ok(())
        }

        fn swap_roles(&mut self) {
            self.read = 1 - self.read;
            self.calls.push(Call::Swap);
        }

        fn finish_compute(&mut self) -> Result<()> {
            self.calls.push(Call::Finish);
            Ok(())
        }

        fn acquire(&mut self) -> Result<u32> {
            self.calls.push(Call::Acquire);
            if self.fail_acquire {
                return Err(GpuError::SwapchainOutOfDate("acquire reported out of date"));
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % 3;
            Ok(index)
        }

        fn record_present(&mut self, image_index: u32, _push: &DisplayPushConstants) -> Result<()> {
            self.calls.push(Call::RecordPresent(image_index));
            if self.stale_pass != Some(PassKind::Display) {
                self.descriptor_updates += 1;
            }
            Ok(())
        }

        fn end_commands(&mut self) -> Result<()> {
            self.calls.push(Call::End);
            Ok(())
        }

        fn reset_fence(&mut self) -> Result<()> {
            self.fence_signaled = false;
            self.calls.push(Call::ResetFence);
            Ok(())
        }

        fn submit(&mut self, presenting: bool) -> Result<()> {
            self.calls.push(Call::Submit(presenting));
            if self.fail_submit {
                return Err(GpuError::Vulkan(ash::vk::Result::ERROR_DEVICE_LOST));
            }
            // Completes instantly.
            self.fence_signaled = true;
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> Result<()> {
            self.calls.push(Call::Present(image_index));
            Ok(())
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.calls.push(Call::WaitIdle);
            Ok(())
        }

        fn descriptor_updates(&self) -> u64 {
            self.descriptor_updates
        }
    }

    /// Window that closes after a fixed number of polls.
    struct MockWindow {
        frames_left: usize,
        minimized: Vec<bool>,
        polls: usize,
        keys: Vec<(usize, KeyCode)>,
        captures: Vec<bool>,
    }

    impl MockWindow {
        fn frames(count: usize) -> Self {
            Self {
                frames_left: count,
                minimized: Vec::new(),
                polls: 0,
                keys: Vec::new(),
                captures: Vec::new(),
            }
        }

        fn minimized_on(mut self, pattern: &[bool]) -> Self {
            self.minimized = pattern.to_vec();
            self
        }
    }

    impl FrameWindow for MockWindow {
        fn poll(&mut self, input: &mut InputState) {
            for (_, key) in self.keys.iter().filter(|(at, _)| *at == self.polls) {
                input.process_key(*key, ElementState::Pressed);
                input.process_key(*key, ElementState::Released);
            }
            self.polls += 1;
        }

        fn should_close(&self) -> bool {
            self.polls > self.frames_left
        }

        fn is_minimized(&self) -> bool {
            self.minimized.get(self.polls - 1).copied().unwrap_or(false)
        }

        fn apply_capture(&mut self, captured: bool) {
            self.captures.push(captured);
        }
    }

    fn executor() -> FrameExecutor {
        FrameExecutor::new(&SimConfig::default().with_fixed_timestep(1.0 / 60.0))
    }

    fn frame_calls(presenting: bool) -> Vec<Call> {
        let mut calls = vec![
            Call::Wait,
            Call::Begin,
            Call::Pass(PassKind::Update),
            Call::Swap,
            Call::Pass(PassKind::Blur),
            Call::Swap,
            Call::Finish,
        ];
        if presenting {
            calls.extend([Call::Acquire, Call::RecordPresent(0)]);
        }
        calls.extend([Call::End, Call::ResetFence, Call::Submit(presenting)]);
        if presenting {
            calls.push(Call::Present(0));
        }
        calls
    }

    #[test]
    fn frame_follows_fixed_order() {
        let mut device = MockDevice::new();
        let mut exec = executor();

        exec.run_frame(&mut device, false, &FrameParams::default())
            .unwrap();

        assert_eq!(device.calls, frame_calls(true));
        assert_eq!(exec.state(), FrameState::Idle);
        assert_eq!(exec.presented_count(), 1);
    }

    #[test]
    fn fence_wait_precedes_reset_and_begin() {
        let mut device = MockDevice::new();
        let mut window = MockWindow::frames(5).minimized_on(&[false, true, false, true, true]);

        executor().run(&mut device, &mut window).unwrap();

        let mut waited = false;
        for call in &device.calls {
            match call {
                Call::Wait => waited = true,
                Call::Begin => assert!(waited, "began recording before waiting"),
                Call::ResetFence => {
                    assert!(waited, "reset the fence before waiting");
                    waited = false;
                }
                _ => {}
            }
        }
        assert_eq!(device.count(|c| *c == Call::Wait), 5);
    }

    #[test]
    fn minimized_frame_computes_without_presenting() {
        let mut device = MockDevice::new();
        let mut exec = executor();

        exec.run_frame(&mut device, true, &FrameParams::default())
            .unwrap();

        assert_eq!(device.calls, frame_calls(false));
        assert_eq!(device.count(|c| matches!(c, Call::Acquire | Call::Present(_))), 0);
        assert_eq!(device.count(|c| matches!(c, Call::Pass(_))), 2);
        assert_eq!(exec.frame_count(), 1);
        assert_eq!(exec.presented_count(), 0);
        assert_eq!(exec.state(), FrameState::Idle);
    }

    #[test]
    fn two_swaps_per_frame_restore_read_role() {
        let mut device = MockDevice::new();
        let mut window = MockWindow::frames(3);

        executor().run(&mut device, &mut window).unwrap();

        assert_eq!(device.count(|c| *c == Call::Swap), 6);
        assert_eq!(device.read, 0);
    }

    #[test]
    fn close_stops_loop_and_waits_idle() {
        let mut device = MockDevice::new();
        let mut window = MockWindow::frames(2);
        let mut exec = executor();

        let summary = exec.run(&mut device, &mut window).unwrap();

        assert_eq!(summary.frames, 2);
        assert_eq!(exec.frame_count(), 2);
        assert_eq!(device.calls.last(), Some(&Call::WaitIdle));
        assert_eq!(device.count(|c| *c == Call::WaitIdle), 1);
    }

    #[test]
    fn immediate_close_records_nothing() {
        let mut device = MockDevice::new();
        let mut window = MockWindow::frames(0);

        executor().run(&mut device, &mut window).unwrap();

        assert_eq!(device.calls, [Call::WaitIdle]);
    }

    #[test]
    fn acquire_failure_ends_loop_with_frame_index() {
        let mut device = MockDevice {
            fail_acquire: true,
            ..MockDevice::new()
        };
        let mut window = MockWindow::frames(3).minimized_on(&[true, false]);

        let err = executor().run(&mut device, &mut window).unwrap_err();

        assert!(matches!(
            err,
            RunError::Frame {
                frame: 1,
                source: GpuError::SwapchainOutOfDate(_)
            }
        ));
        assert_eq!(device.count(|c| *c == Call::Submit(false)), 1);
        assert_eq!(device.count(|c| *c == Call::WaitIdle), 0);
    }

    #[test]
    fn minimize_edges_are_per_frame() {
        let mut device = MockDevice::new();
        let mut window = MockWindow::frames(4).minimized_on(&[false, true, true, false]);
        let mut exec = executor();

        exec.run(&mut device, &mut window).unwrap();

        assert_eq!(exec.frame_count(), 4);
        assert_eq!(exec.presented_count(), 2);
        assert_eq!(device.count(|c| *c == Call::Acquire), 2);
        assert_eq!(device.count(|c| matches!(c, Call::Pass(PassKind::Update))), 4);
    }

    #[test]
    fn capture_toggle_reaches_window() {
        let mut device = MockDevice::new();
        let mut window = MockWindow::frames(3);
        window.keys = vec![(0, KeyCode::Escape), (2, KeyCode::Escape)];

        executor().run(&mut device, &mut window).unwrap();

        assert_eq!(window.captures, [true, false]);
    }

    #[test]
    fn every_pass_rebinds_each_frame() {
        let mut device = MockDevice::new();
        let mut exec = executor();

        exec.run_frame(&mut device, true, &FrameParams::default())
            .unwrap();
        assert_eq!(device.descriptor_updates, 2);

        exec.run_frame(&mut device, false, &FrameParams::default())
            .unwrap();
        assert_eq!(device.descriptor_updates, 5);
    }

    #[test]
    fn stale_descriptors_fail_the_frame() {
        for stale in [PassKind::Update, PassKind::Blur, PassKind::Display] {
            let mut device = MockDevice {
                stale_pass: Some(stale),
                ..MockDevice::new()
            };
            let mut exec = executor();

            let err = exec
                .run_frame(&mut device, false, &FrameParams::default())
                .unwrap_err();

            assert!(
                matches!(&err, GpuError::InvalidState(msg) if msg.contains(&stale.to_string())),
                "{stale}: {err}"
            );
            assert_eq!(device.count(|c| matches!(c, Call::Submit(_))), 0);
            assert_eq!(exec.state(), FrameState::Idle);
        }
    }

    #[test]
    fn failed_frame_leaves_executor_reusable() {
        let mut device = MockDevice {
            fail_acquire: true,
            ..MockDevice::new()
        };
        let mut exec = executor();

        assert!(exec
            .run_frame(&mut device, false, &FrameParams::default())
            .is_err());
        assert_eq!(exec.state(), FrameState::Idle);

        device.calls.clear();
        exec.run_frame(&mut device, true, &FrameParams::default())
            .unwrap();
        assert_eq!(device.calls, frame_calls(false));
        assert_eq!(exec.frame_count(), 1);
    }

    #[test]
    fn failed_submit_returns_to_idle() {
        let mut device = MockDevice {
            fail_submit: true,
            ..MockDevice::new()
        };
        let mut window = MockWindow::frames(2).minimized_on(&[true, true]);
        let mut exec = executor();

        let err = exec.run(&mut device, &mut window).unwrap_err();

        assert_eq!(err.frame(), Some(0));
        assert_eq!(exec.state(), FrameState::Idle);
        assert_eq!(exec.frame_count(), 0);
    }

    #[test]
    fn state_cycle_returns_to_idle() {
        let mut state = FrameState::Idle;
        for _ in 0..4 {
            state = state.next();
        }
        assert_eq!(state, FrameState::Idle);
        assert_eq!(FrameState::Recording.next(), FrameState::Submitted);
    }
}
