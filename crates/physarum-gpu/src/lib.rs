//! Vulkan layer for the physarum simulation.
//!
//! This crate provides:
//! - Instance, device and queue setup with optional validation
//! - Memory allocation via gpu-allocator
//! - A resource arena that tears objects down in reverse creation order
//! - Per-image layout tracking and barrier generation
//! - Pipelines, descriptors, command buffers and frame synchronization
//! - Surface and swapchain handling

pub mod arena;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod debug;
pub mod descriptors;
pub mod error;
pub mod image_state;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use arena::{ArenaEntry, ResourceArena};
pub use capabilities::{GpuCapabilities, GpuVendor, TRAIL_FORMAT};
pub use command::SubmitSemaphores;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::DescriptorSetLayoutBuilder;
pub use error::{GpuError, Result};
pub use image_state::{ImageAccess, ResourceState, TrackedImage};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::FrameSync;
