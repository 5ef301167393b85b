//! Tunable simulation parameters.

/// Agent behaviour and trail evolution.
///
/// Speeds and rates are per second; distances are in trail pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    pub move_speed: f32,
    /// Radians per second.
    pub turn_speed: f32,
    /// Radians between the forward sensor and each side sensor.
    pub sensor_angle: f32,
    pub sensor_distance: f32,
    pub deposit_amount: f32,
    pub diffuse_rate: f32,
    pub decay_rate: f32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            move_speed: 30.0,
            turn_speed: 12.0,
            sensor_angle: std::f32::consts::FRAC_PI_4,
            sensor_distance: 9.0,
            deposit_amount: 5.0,
            diffuse_rate: 3.0,
            decay_rate: 0.2,
        }
    }
}
