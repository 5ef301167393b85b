//! Frame loop for the physarum simulation.
//!
//! [`run`] opens a window, builds the GPU resources and drives
//! [`FrameExecutor`] until the window closes. The executor is generic over
//! [`FrameDevice`] and [`FrameWindow`], so the same loop also runs headless.
//!
//! # Example
//!
//! ```no_run
//! use physarum_app::{run, SimConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     run(&SimConfig::new("Physarum").from_env())?;
//!     Ok(())
//! }
//! ```

mod clock;
mod config;
mod device;
mod error;
mod executor;
mod runner;
mod window;

pub use clock::{FrameClock, FrameSummary};
pub use config::SimConfig;
pub use device::VulkanFrameDevice;
pub use error::RunError;
pub use executor::{FrameDevice, FrameExecutor, FrameState, FrameWindow};
pub use runner::{init_tracing, run};
pub use window::WinitWindow;

pub use physarum_gpu::{GpuContext, GpuContextBuilder};
pub use physarum_sim::{CameraParams, SimParams};
