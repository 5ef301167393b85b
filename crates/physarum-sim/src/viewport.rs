//! Fitting the render image into the window.
//!
//! The simulation renders at a fixed resolution chosen independently of the
//! window. Rather than stretching to the swapchain extent, the image is shown
//! in the largest centred rectangle of its own aspect ratio; the rest of the
//! window keeps the clear colour.

use ash::vk;

/// Viewport and matching scissor for drawing `render` into `target`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn fit_viewport(render: vk::Extent2D, target: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let render_aspect = render.width.max(1) as f32 / render.height.max(1) as f32;
    let target_w = target.width as f32;
    let target_h = target.height as f32;

    let (width, height) = if target_w / target_h.max(1.0) > render_aspect {
        // Window is wider: pillar-box.
        (target_h * render_aspect, target_h)
    } else {
        // Window is taller: letter-box.
        (target_w, target_w / render_aspect)
    };

    let width_px = (width.round() as u32).min(target.width);
    let height_px = (height.round() as u32).min(target.height);
    let x = (target.width - width_px) / 2;
    let y = (target.height - height_px) / 2;

    let viewport = vk::Viewport {
        x: x as f32,
        y: y as f32,
        width: width_px as f32,
        height: height_px as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D {
            x: x as i32,
            y: y as i32,
        },
        extent: vk::Extent2D {
            width: width_px,
            height: height_px,
        },
    };
    (viewport, scissor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn same_aspect_fills_target() {
        let (viewport, scissor) = fit_viewport(extent(800, 800), extent(1000, 1000));
        assert_relative_eq!(viewport.width, 1000.0);
        assert_relative_eq!(viewport.x, 0.0);
        assert_eq!(scissor.extent, extent(1000, 1000));
    }

    #[test]
    fn wide_window_is_pillarboxed() {
        let (viewport, scissor) = fit_viewport(extent(800, 800), extent(1280, 800));
        assert_relative_eq!(viewport.width, 800.0);
        assert_relative_eq!(viewport.height, 800.0);
        assert_relative_eq!(viewport.x, 240.0);
        assert_relative_eq!(viewport.y, 0.0);
        assert_eq!(scissor.offset, vk::Offset2D { x: 240, y: 0 });
    }

    #[test]
    fn tall_window_is_letterboxed() {
        let (viewport, scissor) = fit_viewport(extent(1600, 900), extent(800, 800));
        assert_relative_eq!(viewport.width, 800.0);
        assert_relative_eq!(viewport.height, 450.0);
        assert_relative_eq!(viewport.y, 175.0);
        assert_eq!(scissor.extent, extent(800, 450));
    }

    #[test]
    fn viewport_keeps_render_aspect() {
        let (viewport, _) = fit_viewport(extent(640, 480), extent(1920, 1080));
        assert_relative_eq!(viewport.width / viewport.height, 4.0 / 3.0, epsilon = 1e-2);
    }

    #[test]
    fn scissor_stays_inside_target() {
        for target in [extent(1, 1), extent(3, 1000), extent(1000, 3)] {
            let (_, scissor) = fit_viewport(extent(800, 600), target);
            assert!(scissor.offset.x as u32 + scissor.extent.width <= target.width);
            assert!(scissor.offset.y as u32 + scissor.extent.height <= target.height);
        }
    }
}
