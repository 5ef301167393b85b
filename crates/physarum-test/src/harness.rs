//! Headless frame loop and trail readback.

use ash::vk;
use image::RgbaImage;
use physarum_app::{FrameExecutor, FrameSummary, FrameWindow, SimConfig, VulkanFrameDevice};
use physarum_gpu::{GpuContext, GpuContextBuilder};
use physarum_input::InputState;
use physarum_sim::{Agent, PassKind, SimDesc, BLUR_WORKGROUP};

use crate::{Result, TestError};

/// Create a GPU context without surface support.
pub fn headless_context() -> Result<GpuContext> {
    let gpu = GpuContextBuilder::new()
        .app_name("physarum-test")
        .windowed(false)
        .validation(true)
        .workgroup_invocations(BLUR_WORKGROUP.invocations())
        .build()?;
    Ok(gpu)
}

/// A window that is always minimized and closes after a set number of frames.
#[derive(Debug, Clone, Copy)]
pub struct HeadlessWindow {
    frames: u64,
    polls: u64,
}

impl HeadlessWindow {
    pub const fn frames(frames: u64) -> Self {
        Self { frames, polls: 0 }
    }
}

impl FrameWindow for HeadlessWindow {
    fn poll(&mut self, _input: &mut InputState) {
        self.polls += 1;
    }

    fn should_close(&self) -> bool {
        self.polls > self.frames
    }

    fn is_minimized(&self) -> bool {
        true
    }
}

/// The simulation driven by the real executor against a swapchain-less device.
pub struct HeadlessSim<'gpu> {
    device: VulkanFrameDevice<'gpu>,
    executor: FrameExecutor,
    extent: vk::Extent2D,
}

impl<'gpu> HeadlessSim<'gpu> {
    /// Set up `agents` on a trail of the config's render size.
    ///
    /// Use [`SimConfig::with_fixed_timestep`] for reproducible runs.
    pub fn new(gpu: &'gpu GpuContext, config: &SimConfig, agents: Vec<Agent>) -> Result<Self> {
        let extent = config.render_extent();
        let desc = SimDesc {
            extent,
            agents,
            params: config.sim,
            display_format: None,
        };
        Ok(Self {
            device: VulkanFrameDevice::headless(gpu, desc)?,
            executor: FrameExecutor::new(config),
            extent,
        })
    }

    /// Run `frames` frames and wait for the device to go idle.
    pub fn step(&mut self, frames: u64) -> Result<FrameSummary> {
        let mut window = HeadlessWindow::frames(frames);
        let summary = self.executor.run(&mut self.device, &mut window)?;
        Ok(summary)
    }

    /// Read the image currently holding the read role.
    pub fn read_image(&mut self) -> Result<RgbaImage> {
        let bytes = self.device.read_back()?;
        tracing::debug!(
            "Read back {}x{} trail ({} bytes)",
            self.extent.width,
            self.extent.height,
            bytes.len()
        );
        RgbaImage::from_raw(self.extent.width, self.extent.height, bytes)
            .ok_or_else(|| TestError::Image("readback smaller than the trail".to_string()))
    }

    /// Total role swaps since creation.
    pub fn swap_count(&self) -> u64 {
        self.device.sim().images().swap_count()
    }

    /// Slot index currently holding the read role.
    pub fn read_index(&self) -> usize {
        self.device.sim().images().read_index()
    }

    /// Descriptor set updates since creation; one per recorded pass.
    pub fn descriptor_updates(&self) -> u64 {
        self.device.sim().rebinder().update_count()
    }

    /// Dispatches recorded by `pass` since creation.
    pub fn dispatch_count(&self, pass: PassKind) -> u64 {
        self.device.sim().dispatch_count(pass)
    }

    pub const fn executor(&self) -> &FrameExecutor {
        &self.executor
    }

    pub const fn device(&self) -> &VulkanFrameDevice<'gpu> {
        &self.device
    }
}

/// Red channel at `(x, y)`; all three colour channels carry the same trail.
pub fn trail_at(image: &RgbaImage, x: u32, y: u32) -> u8 {
    image.get_pixel(x, y)[0]
}

/// Pixels whose red channel differs between `before` and `after`.
pub fn changed_pixels(before: &RgbaImage, after: &RgbaImage) -> Vec<(u32, u32)> {
    if before.dimensions() != after.dimensions() {
        return Vec::new();
    }
    before
        .enumerate_pixels()
        .filter(|(x, y, pixel)| pixel[0] != after.get_pixel(*x, *y)[0])
        .map(|(x, y, _)| (x, y))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use physarum_sim::{spawn_agents, COMPUTE_SEQUENCE, SWAPS_PER_FRAME};

    const REBINDS_PER_MINIMIZED_FRAME: u64 = COMPUTE_SEQUENCE.len() as u64;

    const SIZE: u32 = 64;

    fn config() -> SimConfig {
        SimConfig::new("physarum-test")
            .with_render_size(SIZE, SIZE)
            .with_fixed_timestep(1.0 / 60.0)
            .with_validation(true)
    }

    #[test]
    fn changed_pixels_reports_differences() {
        let before = RgbaImage::new(4, 4);
        let mut after = before.clone();
        after.put_pixel(1, 2, Rgba([9, 9, 9, 255]));

        assert_eq!(changed_pixels(&before, &after), [(1, 2)]);
        assert_eq!(trail_at(&after, 1, 2), 9);
    }

    #[test]
    fn changed_pixels_ignores_alpha() {
        let before = RgbaImage::new(2, 2);
        let mut after = before.clone();
        after.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        assert!(changed_pixels(&before, &after).is_empty());
    }

    #[test]
    fn headless_window_counts_down() {
        let mut window = HeadlessWindow::frames(2);
        let mut input = InputState::new();
        let mut frames = 0;
        loop {
            window.poll(&mut input);
            if window.should_close() {
                break;
            }
            assert!(window.is_minimized());
            frames += 1;
        }
        assert_eq!(frames, 2);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn headless_sim_creation() {
        let gpu = headless_context().unwrap();
        let agents = spawn_agents(128, config().render_extent(), 1);
        let sim = HeadlessSim::new(&gpu, &config(), agents).unwrap();
        assert_eq!(sim.device().sim().agent_count(), 128);
        assert!(sim.device().swapchain_extent().is_none());
        assert!(sim.device().owned_objects() > 0);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn single_agent_marks_its_texel() {
        let gpu = headless_context().unwrap();
        // Zero trail means every sensor reads the same value and the agent
        // keeps its heading: x moves by 30 px/s * 1/60 s.
        let agent = Agent::new(20.25, 40.5, 0.0);
        let mut sim = HeadlessSim::new(&gpu, &config(), vec![agent]).unwrap();

        let before = sim.read_image().unwrap();
        let read_at_start = sim.read_index();
        let swaps_at_start = sim.swap_count();
        let updates_at_start = sim.descriptor_updates();

        sim.step(1).unwrap();
        let after = sim.read_image().unwrap();

        assert_eq!(trail_at(&before, 20, 40), 0);
        assert!(trail_at(&after, 20, 40) > 0);
        assert_eq!(changed_pixels(&before, &after), [(20, 40)]);
        assert_eq!(sim.swap_count() - swaps_at_start, SWAPS_PER_FRAME);
        assert_eq!(sim.read_index(), read_at_start);
        assert_eq!(
            sim.descriptor_updates() - updates_at_start,
            REBINDS_PER_MINIMIZED_FRAME
        );
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn minimized_frames_keep_simulating() {
        let gpu = headless_context().unwrap();
        let agents = spawn_agents(256, config().render_extent(), 3);
        let mut sim = HeadlessSim::new(&gpu, &config(), agents).unwrap();

        let summary = sim.step(10).unwrap();
        let first = sim.read_image().unwrap();
        sim.step(10).unwrap();
        let second = sim.read_image().unwrap();

        assert_eq!(summary.frames, 10);
        assert_eq!(sim.executor().presented_count(), 0);
        assert_eq!(sim.executor().frame_count(), 20);
        assert_eq!(sim.dispatch_count(PassKind::Update), 20);
        assert_eq!(sim.dispatch_count(PassKind::Blur), 20);
        assert_eq!(sim.descriptor_updates(), 20 * REBINDS_PER_MINIMIZED_FRAME);
        assert!(!changed_pixels(&first, &second).is_empty());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn consecutive_runs_continue_the_same_trail() {
        let gpu = headless_context().unwrap();
        let mut sim =
            HeadlessSim::new(&gpu, &config(), vec![Agent::new(10.5, 10.5, 0.0)]).unwrap();

        sim.step(1).unwrap();
        assert_eq!(sim.descriptor_updates(), REBINDS_PER_MINIMIZED_FRAME);
        sim.step(1).unwrap();

        // Same images, same roles at frame start, yet every pass rebinds again.
        assert_eq!(sim.descriptor_updates(), 2 * REBINDS_PER_MINIMIZED_FRAME);
        assert_eq!(sim.swap_count(), 2 * SWAPS_PER_FRAME);
        assert_eq!(sim.executor().frame_count(), 2);
        // Both frames deposit at x = 11.
        assert!(trail_at(&sim.read_image().unwrap(), 11, 10) > 0);
    }
}
