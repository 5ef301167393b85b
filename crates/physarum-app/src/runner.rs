//! Blocking entry point.

use physarum_gpu::GpuContextBuilder;
use physarum_sim::{spawn_agents, SimDesc, BLUR_WORKGROUP};
use tracing_subscriber::EnvFilter;

use crate::clock::FrameSummary;
use crate::config::SimConfig;
use crate::device::VulkanFrameDevice;
use crate::error::RunError;
use crate::executor::FrameExecutor;
use crate::window::WinitWindow;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the `info` default. Calling this more than
/// once is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Open a window and run the simulation until it is closed.
///
/// Objects are released in reverse creation order on every exit path: the
/// frame device drops before the GPU context, which drops before the window.
pub fn run(config: &SimConfig) -> Result<FrameSummary, RunError> {
    init_tracing();
    tracing::info!("{} starting...", config.title);

    let mut window = WinitWindow::new(config)?;

    let gpu = GpuContextBuilder::new()
        .app_name(&config.title)
        .validation(config.validation)
        .workgroup_invocations(BLUR_WORKGROUP.invocations())
        .build()?;

    let extent = config.render_extent();
    let desc = SimDesc {
        extent,
        agents: spawn_agents(config.agent_count, extent, config.seed),
        params: config.sim,
        display_format: None,
    };
    let mut device = VulkanFrameDevice::windowed(&gpu, window.window(), config.vsync, desc)?;
    if let Some(target) = device.swapchain_extent() {
        tracing::info!(
            "Rendering {}x{} into {}x{}",
            extent.width,
            extent.height,
            target.width,
            target.height
        );
    }

    let mut executor = FrameExecutor::new(config);
    executor.run(&mut device, &mut window)
}
