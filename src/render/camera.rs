use glam::{Mat4, Vec3};

use super::{CameraKey, KeyState};
use crate::config::CameraConfig;

const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
const NEAR_PLANE: f32 = 0.1;

/// Eye on a sphere around the origin, always looking at the origin with +Y up.
///
/// Angles are in degrees. Inclination is measured from +Y and kept strictly
/// inside (0, 180) so the view never flips over the pole.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    pub radius: f32,
    pub inclination: f32,
    pub azimuth: f32,
    angle_step: f32,
    distance_step: f32,
    draw_distance: f32,
}

impl OrbitCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            radius: 3.0,
            inclination: 45.0,
            azimuth: 0.0,
            angle_step: config.angle_step_degrees,
            distance_step: config.distance_step,
            draw_distance: config.draw_distance,
        }
    }

    /// Apply one step for `key`. A step that would leave the allowed range is
    /// undone rather than clamped.
    pub fn apply(&mut self, key: CameraKey) {
        match key {
            CameraKey::Left => self.azimuth -= self.angle_step,
            CameraKey::Right => self.azimuth += self.angle_step,
            CameraKey::Up => {
                self.inclination -= self.angle_step;
                if self.inclination <= 0.0 {
                    self.inclination += self.angle_step;
                }
            }
            CameraKey::Down => {
                self.inclination += self.angle_step;
                if self.inclination >= 180.0 {
                    self.inclination -= self.angle_step;
                }
            }
            CameraKey::ZoomIn => {
                if self.radius > self.distance_step {
                    self.radius -= self.distance_step;
                }
            }
            CameraKey::ZoomOut => {
                self.radius += self.distance_step;
                if self.radius > self.draw_distance - 2.0 {
                    self.radius -= self.distance_step;
                }
            }
        }
    }

    pub fn handle_input(&mut self, keys: &KeyState) {
        for key in CameraKey::ALL {
            if keys.is_held(key) {
                self.apply(key);
            }
        }
    }

    pub fn eye(&self) -> Vec3 {
        let azimuth = self.azimuth.to_radians();
        let inclination = self.inclination.to_radians();
        Vec3::new(
            self.radius * azimuth.cos() * inclination.sin(),
            self.radius * inclination.cos(),
            self.radius * azimuth.sin() * inclination.sin(),
        )
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(
            FIELD_OF_VIEW_DEGREES.to_radians(),
            aspect.max(f32::EPSILON),
            NEAR_PLANE,
            self.draw_distance,
        );
        projection * view
    }
}
