//! Physarum viewer.
//!
//! Agents leave trails that diffuse and decay; the trail is drawn onto a
//! plane seen through a fly camera.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p physarum-viewer --release
//! ```
//!
//! ## Controls
//!
//! - `Escape`: capture or release the mouse
//! - `W/A/S/D`, `Space`, `Left Ctrl`: move the camera
//! - Mouse (while captured): look around
//!
//! ## Environment Variables
//!
//! - `PHYSARUM_AGENTS`: number of agents (default: 250000)
//! - `PHYSARUM_SEED`: agent placement seed
//! - `PHYSARUM_VALIDATION`: `1` or `0` to force Vulkan validation on or off
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use physarum_app::{run, SimConfig};

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 800;
const RENDER_SIZE: u32 = 800;

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let config = SimConfig::new("Physarum")
        .with_window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
        .with_render_size(RENDER_SIZE, RENDER_SIZE)
        .from_env();

    let summary = run(&config)?;
    tracing::info!("Exited after {} frames", summary.frames);
    Ok(())
}

fn print_help() {
    eprintln!(
        "Physarum viewer

USAGE:
    cargo run -p physarum-viewer --release

CONTROLS:
    Escape                  Capture or release the mouse
    W/A/S/D                 Move the camera
    Space / Left Ctrl       Move up / down
    Mouse                   Look around while captured

ENVIRONMENT VARIABLES:
    PHYSARUM_AGENTS         Number of agents (default: 250000)
    PHYSARUM_SEED           Agent placement seed
    PHYSARUM_VALIDATION     1 or 0 to force Vulkan validation on or off
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
