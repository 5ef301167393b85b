//! Run configuration.

use ash::vk;
use physarum_sim::{CameraParams, SimParams};

/// Everything [`crate::run`] needs to know before opening a window.
///
/// The window size and the trail resolution are independent; the display
/// pass letterboxes the trail inside the window.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Window title.
    pub title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Trail image width in pixels.
    pub render_width: u32,
    /// Trail image height in pixels.
    pub render_height: u32,
    pub agent_count: u32,
    /// Seed for agent placement.
    pub seed: u64,
    /// FIFO presentation when set, otherwise mailbox or immediate.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Simulate this many seconds per frame instead of wall-clock time.
    pub fixed_timestep: Option<f32>,
    pub sim: SimParams,
    pub camera: CameraParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            title: "Physarum".to_string(),
            window_width: 1280,
            window_height: 800,
            render_width: 800,
            render_height: 800,
            agent_count: 250_000,
            seed: 0x5EED,
            vsync: true,
            validation: cfg!(debug_assertions),
            fixed_timestep: None,
            sim: SimParams::default(),
            camera: CameraParams::default(),
        }
    }
}

impl SimConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    /// Set the trail image dimensions.
    #[must_use]
    pub fn with_render_size(mut self, width: u32, height: u32) -> Self {
        self.render_width = width;
        self.render_height = height;
        self
    }

    #[must_use]
    pub fn with_agent_count(mut self, count: u32) -> Self {
        self.agent_count = count;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable vsync.
    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_fixed_timestep(mut self, seconds: f32) -> Self {
        self.fixed_timestep = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_sim_params(mut self, params: SimParams) -> Self {
        self.sim = params;
        self
    }

    #[must_use]
    pub fn with_camera_params(mut self, params: CameraParams) -> Self {
        self.camera = params;
        self
    }

    /// Trail image extent.
    pub const fn render_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.render_width,
            height: self.render_height,
        }
    }

    /// Width over height of the trail image.
    #[allow(clippy::cast_precision_loss)]
    pub fn render_aspect(&self) -> f32 {
        self.render_width as f32 / self.render_height.max(1) as f32
    }

    /// Apply `PHYSARUM_AGENTS`, `PHYSARUM_SEED` and `PHYSARUM_VALIDATION`
    /// from the process environment.
    #[must_use]
    pub fn from_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Values that fail to parse are logged
    /// and ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(count) = parse_var::<u32>(&lookup, "PHYSARUM_AGENTS") {
            if count == 0 {
                tracing::warn!("Ignoring PHYSARUM_AGENTS=0: at least one agent is required");
            } else {
                self.agent_count = count;
            }
        }
        if let Some(seed) = parse_var::<u64>(&lookup, "PHYSARUM_SEED") {
            self.seed = seed;
        }
        if let Some(raw) = lookup("PHYSARUM_VALIDATION") {
            match parse_flag(&raw) {
                Some(validation) => self.validation = validation,
                None => tracing::warn!("Ignoring PHYSARUM_VALIDATION={raw:?}: expected 0/1"),
            }
        }
        self
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {key}={raw:?}: not a number");
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn defaults_keep_window_and_render_independent() {
        let config = SimConfig::default();
        assert_eq!((config.window_width, config.window_height), (1280, 800));
        assert_eq!(config.render_extent(), vk::Extent2D { width: 800, height: 800 });
        assert_eq!(config.agent_count, 250_000);
        assert!(config.vsync);
    }

    #[test]
    fn overrides_apply() {
        let config = SimConfig::default().with_overrides(env(&[
            ("PHYSARUM_AGENTS", "1024"),
            ("PHYSARUM_SEED", "42"),
            ("PHYSARUM_VALIDATION", "off"),
        ]));
        assert_eq!(config.agent_count, 1024);
        assert_eq!(config.seed, 42);
        assert!(!config.validation);
    }

    #[test]
    fn malformed_overrides_are_ignored() {
        let base = SimConfig::default();
        let config = base.clone().with_overrides(env(&[
            ("PHYSARUM_AGENTS", "lots"),
            ("PHYSARUM_SEED", "-1"),
            ("PHYSARUM_VALIDATION", "maybe"),
        ]));
        assert_eq!(config.agent_count, base.agent_count);
        assert_eq!(config.seed, base.seed);
        assert_eq!(config.validation, base.validation);
    }

    #[test]
    fn zero_agents_rejected() {
        let config = SimConfig::default().with_overrides(env(&[("PHYSARUM_AGENTS", "0")]));
        assert_eq!(config.agent_count, 250_000);
    }

    #[test]
    fn builder_sets_fields() {
        let config = SimConfig::new("test")
            .with_render_size(1600, 900)
            .with_window_size(640, 480)
            .with_fixed_timestep(0.5);
        assert_eq!(config.title, "test");
        assert_eq!(config.fixed_timestep, Some(0.5));
        approx::assert_relative_eq!(config.render_aspect(), 16.0 / 9.0);
    }
}
