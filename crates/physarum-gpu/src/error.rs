//! GPU error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the Vulkan layer.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Raw Vulkan error code.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loader(String),

    /// No physical device satisfies the requirements.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A required instance or device extension is missing.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// The swapchain no longer matches the surface. There is no recreation
    /// path, so this ends the frame loop.
    #[error("Swapchain no longer matches the surface: {0}")]
    SwapchainOutOfDate(&'static str),

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderModule(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A descriptor layout or binding declaration is malformed.
    #[error("Descriptor setup failed: {0}")]
    DescriptorSetup(String),

    /// An operation was attempted in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
