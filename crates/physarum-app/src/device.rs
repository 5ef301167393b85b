//! Vulkan implementation of [`FrameDevice`].

use ash::vk;
use gpu_allocator::MemoryLocation;
use physarum_gpu::command::{
    allocate_command_buffer, begin_command_buffer, create_command_pool, end_command_buffer,
    execute_single_time_commands, submit_frame,
};
use physarum_gpu::{
    ArenaEntry, FrameSync, GpuContext, GpuError, ResourceArena, Result, SubmitSemaphores,
    SurfaceContext, Swapchain,
};
use physarum_sim::{
    DisplayPushConstants, FrameParams, PassKind, PresentTarget, SimDesc, SimPipeline,
};
use winit::window::Window;

use crate::executor::FrameDevice;

struct Presenter {
    surface: SurfaceContext,
    swapchain: Swapchain,
}

/// The command buffer, sync objects and simulation for one GPU context.
///
/// Without a window there is no swapchain and only minimized frames can run.
pub struct VulkanFrameDevice<'gpu> {
    gpu: &'gpu GpuContext,
    presenter: Option<Presenter>,
    command_pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    sync: FrameSync,
    sim: SimPipeline,
    arena: ResourceArena,
}

impl<'gpu> VulkanFrameDevice<'gpu> {
    /// Set up without a surface.
    pub fn headless(gpu: &'gpu GpuContext, mut desc: SimDesc) -> Result<Self> {
        desc.display_format = None;
        let arena = ResourceArena::new(gpu, "headless");
        Self::build(gpu, arena, None, &desc)
    }

    /// Set up presenting to `window`.
    pub fn windowed(
        gpu: &'gpu GpuContext,
        window: &Window,
        vsync: bool,
        mut desc: SimDesc,
    ) -> Result<Self> {
        let mut arena = ResourceArena::new(gpu, "frame");
        let size = window.inner_size();

        let presenter = unsafe {
            let surface = SurfaceContext::from_window(gpu, window, &mut arena)?;
            let swapchain = surface.create_swapchain(
                gpu,
                size.width.max(1),
                size.height.max(1),
                vsync,
                &mut arena,
            )?;
            Presenter { surface, swapchain }
        };
        desc.display_format = Some(presenter.swapchain.format);

        Self::build(gpu, arena, Some(presenter), &desc)
    }

    fn build(
        gpu: &'gpu GpuContext,
        mut arena: ResourceArena,
        presenter: Option<Presenter>,
        desc: &SimDesc,
    ) -> Result<Self> {
        let device = gpu.device();

        let command_pool = unsafe { create_command_pool(device, gpu.queue_family())? };
        arena.push(ArenaEntry::CommandPool(command_pool));
        let cmd = unsafe { allocate_command_buffer(device, command_pool)? };
        let sync = unsafe { FrameSync::new(device, &mut arena)? };

        let sim = SimPipeline::new(gpu, &mut arena, command_pool, desc)?;

        tracing::debug!("{} Vulkan objects owned by the frame loop", arena.len());
        Ok(Self {
            gpu,
            presenter,
            command_pool,
            cmd,
            sync,
            sim,
            arena,
        })
    }

    pub const fn sim(&self) -> &SimPipeline {
        &self.sim
    }

    /// Vulkan objects that will be released when this device drops.
    pub fn owned_objects(&self) -> usize {
        self.arena.len()
    }

    /// Swapchain extent, if presenting.
    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.presenter.as_ref().map(|p| p.swapchain.extent)
    }

    /// Copy the current read image to the host as tightly packed RGBA8.
    ///
    /// Waits for the in-flight frame first.
    pub fn read_back(&mut self) -> Result<Vec<u8>> {
        let device = self.gpu.device();
        unsafe { self.sync.wait(device)? };

        let mut staging = self.gpu.allocator().lock().create_buffer(
            self.sim.readback_size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "trail_readback",
        )?;

        let sim = &mut self.sim;
        let buffer = staging.buffer;
        let bytes = unsafe {
            execute_single_time_commands(device, self.command_pool, self.gpu.queue(), |cmd| {
                sim.record_readback(device, cmd, buffer);
            })
        }
        .and_then(|()| staging.read_bytes());

        self.gpu.allocator().lock().free_buffer(&mut staging)?;
        let mut bytes = bytes?;
        bytes.truncate(usize::try_from(self.sim.readback_size()).unwrap_or(usize::MAX));
        Ok(bytes)
    }

    fn presenter(&self) -> Result<&Presenter> {
        self.presenter.as_ref().ok_or_else(|| {
            GpuError::InvalidState("frame device has no swapchain to present to".to_string())
        })
    }
}

impl FrameDevice for VulkanFrameDevice<'_> {
    fn wait_for_fence(&mut self) -> Result<()> {
        unsafe { self.sync.wait(self.gpu.device()) }
    }

    fn begin_commands(&mut self) -> Result<()> {
        unsafe { begin_command_buffer(self.gpu.device(), self.cmd) }
    }

    fn record_pass(&mut self, pass: PassKind, frame: &FrameParams) -> Result<()> {
        unsafe { self.sim.record_pass(self.gpu.device(), self.cmd, pass, frame) }
    }

    fn swap_roles(&mut self) {
        self.sim.swap_roles();
    }

    fn finish_compute(&mut self) -> Result<()> {
        unsafe { self.sim.finish_compute(self.gpu.device(), self.cmd) };
        Ok(())
    }

    fn acquire(&mut self) -> Result<u32> {
        let presenter = self.presenter()?;
        unsafe {
            presenter
                .swapchain
                .acquire_next_image(&presenter.surface.swapchain_loader, self.sync.image_available)
        }
    }

    fn record_present(&mut self, image_index: u32, push: &DisplayPushConstants) -> Result<()> {
        let presenter = self.presenter()?;
        let swapchain = &presenter.swapchain;
        let index = image_index as usize;
        let (Some(&image), Some(&view)) =
            (swapchain.images.get(index), swapchain.image_views.get(index))
        else {
            return Err(GpuError::InvalidState(format!(
                "swapchain image {image_index} out of range"
            )));
        };
        let target = PresentTarget {
            image,
            view,
            extent: swapchain.extent,
        };
        unsafe {
            self.sim
                .record_display(self.gpu.device(), self.cmd, target, push)
        }
    }

    fn end_commands(&mut self) -> Result<()> {
        unsafe { end_command_buffer(self.gpu.device(), self.cmd) }
    }

    fn reset_fence(&mut self) -> Result<()> {
        unsafe { self.sync.reset(self.gpu.device()) }
    }

    fn submit(&mut self, presenting: bool) -> Result<()> {
        let semaphores = if presenting {
            SubmitSemaphores {
                wait: Some(self.sync.image_available),
                signal: Some(self.sync.render_finished),
            }
        } else {
            SubmitSemaphores::default()
        };
        unsafe {
            submit_frame(
                self.gpu.device(),
                self.gpu.queue(),
                self.cmd,
                semaphores,
                self.sync.in_flight,
            )
        }
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        let presenter = self.presenter()?;
        unsafe {
            presenter.swapchain.present(
                &presenter.surface.swapchain_loader,
                self.gpu.queue(),
                image_index,
                self.sync.render_finished,
            )
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.wait_idle()
    }

    fn descriptor_updates(&self) -> u64 {
        self.sim.rebinder().update_count()
    }
}
