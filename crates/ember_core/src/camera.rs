//! Pinhole camera producing unnormalized primary directions.

use ember_math::{Mat3, Quat, Vec3};

/// Camera state consumed by the primary generation kernel.
///
/// `bottom_left_corner`, `x_axis` and `y_axis` span the view plane in world
/// space at unit focal distance. Primary directions are left unnormalized so
/// the bounce-0 ray-differential LOD can recover the pixel footprint from
/// their length.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,

    /// Vertical field of view in radians.
    fov: f32,

    // Derived by resize()
    pub bottom_left_corner: Vec3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,

    /// Angle subtended by one pixel, for ray-cone texture LOD.
    pub pixel_spread_angle: f32,
}

impl Camera {
    /// Create a camera with the given vertical field of view (radians).
    /// Call `resize` before generating rays.
    pub fn new(fov: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov,
            bottom_left_corner: Vec3::new(0.0, 0.0, -1.0),
            x_axis: Vec3::X,
            y_axis: Vec3::Y,
            pixel_spread_angle: 0.0,
        }
    }

    /// Orient the camera to look at `target`.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize();
        let right = forward.cross(up).normalize();
        let true_up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward));
    }

    /// Recompute the view-plane basis for a screen size.
    pub fn resize(&mut self, width: u32, height: u32) {
        let half_height = (0.5 * self.fov).tan();
        let half_width = half_height * width as f32 / height as f32;

        // Camera space looks down -Z; rotate the plane into world space
        self.bottom_left_corner =
            self.rotation * Vec3::new(-half_width, -half_height, -1.0);
        self.x_axis = self.rotation * Vec3::new(2.0 * half_width / width as f32, 0.0, 0.0);
        self.y_axis = self.rotation * Vec3::new(0.0, 2.0 * half_height / height as f32, 0.0);

        self.pixel_spread_angle = (2.0 * half_height / height as f32).atan();
    }

    /// Unnormalized direction through screen position (x, y), where x and y
    /// carry the sub-pixel jitter.
    #[inline]
    pub fn ray_direction(&self, x: f32, y: f32) -> Vec3 {
        self.bottom_left_corner + x * self.x_axis + y * self.y_axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_center_ray() {
        let mut camera = Camera::new(110f32.to_radians());
        camera.resize(100, 100);

        // Center of the screen should look straight down -Z
        let dir = camera.ray_direction(50.0, 50.0);
        assert!(dir.x.abs() < 1e-4);
        assert!(dir.y.abs() < 1e-4);
        assert!(dir.z < 0.0);
    }

    #[test]
    fn test_camera_look_at() {
        let mut camera = Camera::new(90f32.to_radians());
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera.look_at(Vec3::ZERO, Vec3::Y);
        camera.resize(64, 64);

        let dir = camera.ray_direction(32.0, 32.0).normalize();
        assert!((dir - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);
    }

    #[test]
    fn test_pixel_spread_angle() {
        let mut camera = Camera::new(90f32.to_radians());
        camera.resize(100, 100);

        // 90 degrees over 100 pixels: roughly 0.02 radians per pixel
        assert!(camera.pixel_spread_angle > 0.0);
        assert!(camera.pixel_spread_angle < 0.1);
    }
}
