//! The fixed per-frame pass order.

use std::fmt;

/// A pass in the frame sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Agents sense, steer, move and deposit.
    Update,
    /// Trail diffuses and decays.
    Blur,
    /// Final read image is drawn to the swapchain.
    Display,
}

impl PassKind {
    /// Compute passes swap the image roles once each; presentation only reads.
    pub const fn swaps_roles(self) -> bool {
        matches!(self, Self::Update | Self::Blur)
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "update",
            Self::Blur => "blur",
            Self::Display => "display",
        };
        f.write_str(name)
    }
}

/// Compute passes, in recording order.
pub const COMPUTE_SEQUENCE: [PassKind; 2] = [PassKind::Update, PassKind::Blur];

/// Role swaps per frame.
pub const SWAPS_PER_FRAME: u64 = COMPUTE_SEQUENCE.len() as u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_precedes_blur() {
        assert_eq!(COMPUTE_SEQUENCE, [PassKind::Update, PassKind::Blur]);
        assert!(COMPUTE_SEQUENCE.iter().all(|pass| pass.swaps_roles()));
        assert!(!PassKind::Display.swaps_roles());
    }

    #[test]
    fn two_swaps_leave_read_where_it_started() {
        assert_eq!(SWAPS_PER_FRAME % 2, 0);
    }
}
