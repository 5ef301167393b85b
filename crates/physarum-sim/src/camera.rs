//! Fly camera looking at the trail plane.

use glam::{Mat4, Vec3};
use physarum_input::{InputState, KeyCode};

use crate::push::DisplayPushConstants;

/// Camera settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    /// Vertical field of view in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// World units per second.
    pub move_speed: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_sensitivity: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            fov: std::f32::consts::FRAC_PI_3,
            near: 0.01,
            far: 100.0,
            move_speed: 1.0,
            mouse_sensitivity: 0.002,
        }
    }
}

const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// Free-flying perspective camera.
///
/// Yaw 0 and pitch 0 look down -Z onto the trail plane at z = 0, which spans
/// `[-aspect, aspect] x [-1, 1]`.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub aspect: f32,
    pub params: CameraParams,
}

impl FlyCamera {
    /// Camera framing the whole plane for a render target of `aspect`.
    pub fn new(aspect: f32, params: CameraParams) -> Self {
        let distance = 1.0 / (params.fov * 0.5).tan();
        Self {
            position: Vec3::new(0.0, 0.0, distance),
            yaw: 0.0,
            pitch: 0.0,
            aspect,
            params,
        }
    }

    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch)
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Perspective projection with Y flipped for Vulkan clip space.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection =
            Mat4::perspective_rh(self.params.fov, self.aspect, self.params.near, self.params.far);
        projection.y_axis.y *= -1.0;
        projection
    }

    pub fn inverse_view_matrix(&self) -> Mat4 {
        self.view_matrix().inverse()
    }

    pub fn inverse_projection_matrix(&self) -> Mat4 {
        self.projection_matrix().inverse()
    }

    pub fn push_constants(&self) -> DisplayPushConstants {
        DisplayPushConstants::new(self.inverse_view_matrix(), self.inverse_projection_matrix())
    }

    /// Apply one frame of input. Returns `true` if the matrices changed.
    pub fn update(&mut self, input: &InputState, dt: f32) -> bool {
        let mut changed = false;

        if input.is_captured() {
            let delta = input.mouse_delta();
            if delta.x != 0.0 || delta.y != 0.0 {
                self.yaw += delta.x * self.params.mouse_sensitivity;
                self.pitch = (self.pitch - delta.y * self.params.mouse_sensitivity)
                    .clamp(-PITCH_LIMIT, PITCH_LIMIT);
                changed = true;
            }
        }

        let forward = self.forward();
        let right = self.right();
        let mut motion = Vec3::ZERO;
        for (key, direction) in [
            (KeyCode::KeyW, forward),
            (KeyCode::KeyS, -forward),
            (KeyCode::KeyD, right),
            (KeyCode::KeyA, -right),
            (KeyCode::Space, Vec3::Y),
            (KeyCode::ControlLeft, -Vec3::Y),
        ] {
            if input.is_held(key) {
                motion += direction;
            }
        }

        if motion != Vec3::ZERO {
            self.position += motion.normalize() * self.params.move_speed * dt;
            changed = true;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;
    use physarum_input::ElementState;

    fn camera() -> FlyCamera {
        FlyCamera::new(1.0, CameraParams::default())
    }

    #[test]
    fn default_camera_looks_down_negative_z() {
        let cam = camera();
        assert_relative_eq!(cam.forward().z, -1.0);
        assert!(cam.position.z > 0.0);
    }

    #[test]
    fn plane_fills_view_vertically() {
        let cam = camera();
        // The top edge of the plane projects to the top of clip space (y = -1 in Vulkan).
        let clip = cam.projection_matrix() * cam.view_matrix() * Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert_relative_eq!(clip.y / clip.w, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn inverses_round_trip() {
        let mut cam = camera();
        cam.yaw = 0.3;
        cam.pitch = -0.2;
        let identity = cam.view_matrix() * cam.inverse_view_matrix();
        assert!(identity.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn no_input_no_change() {
        let mut cam = camera();
        let input = InputState::new();
        assert!(!cam.update(&input, 0.016));
    }

    #[test]
    fn held_key_moves_forward() {
        let mut cam = camera();
        let start = cam.position;
        let mut input = InputState::new();
        input.process_key(KeyCode::KeyW, ElementState::Pressed);

        assert!(cam.update(&input, 0.5));

        assert_relative_eq!(cam.position.z, start.z - 0.5 * cam.params.move_speed, epsilon = 1e-5);
    }

    #[test]
    fn mouse_ignored_unless_captured() {
        let mut cam = camera();
        let mut input = InputState::new();
        input.add_mouse_motion(100.0, 0.0);
        assert!(!cam.update(&input, 0.016));

        input.set_captured(true);
        assert!(cam.update(&input, 0.016));
        assert_relative_eq!(cam.yaw, 100.0 * cam.params.mouse_sensitivity);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = camera();
        let mut input = InputState::new();
        input.set_captured(true);
        input.add_mouse_motion(0.0, -1.0e6);

        cam.update(&input, 0.016);

        assert_relative_eq!(cam.pitch, PITCH_LIMIT);
    }
}
