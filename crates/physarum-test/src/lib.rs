//! Test harness for the physarum simulation.
//!
//! Runs whole frames through the real frame loop without a window and reads
//! the trail back to the CPU.

pub mod harness;

pub use harness::{changed_pixels, headless_context, trail_at, HeadlessSim, HeadlessWindow};

use physarum_app::RunError;
use physarum_gpu::GpuError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    #[error("Frame loop error: {0}")]
    Run(#[from] RunError),
    #[error("Image error: {0}")]
    Image(String),
}

pub type Result<T> = std::result::Result<T, TestError>;
