//! Errors returned by [`crate::run`].

use physarum_gpu::GpuError;
use thiserror::Error;

/// Why the frame loop did not run to completion.
///
/// Setup errors mean nothing was ever presented; frame errors mean the loop
/// started and stopped mid-flight. Neither is retried.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to create window: {0}")]
    Window(String),

    #[error("Setup failed: {0}")]
    Setup(#[from] GpuError),

    #[error("Frame {frame} failed: {source}")]
    Frame {
        frame: u64,
        #[source]
        source: GpuError,
    },
}

impl RunError {
    /// Whether the loop never started.
    pub const fn is_setup(&self) -> bool {
        matches!(self, Self::Window(_) | Self::Setup(_))
    }

    /// Index of the failed frame, if the loop had started.
    pub const fn frame(&self) -> Option<u64> {
        match self {
            Self::Frame { frame, .. } => Some(*frame),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_and_frame_errors_are_distinct() {
        let setup = RunError::from(GpuError::NoSuitableDevice);
        assert!(setup.is_setup());
        assert_eq!(setup.frame(), None);

        let frame = RunError::Frame {
            frame: 12,
            source: GpuError::SwapchainOutOfDate("acquire reported out of date"),
        };
        assert!(!frame.is_setup());
        assert_eq!(frame.frame(), Some(12));
        assert!(frame.to_string().contains("Frame 12"));
    }
}
