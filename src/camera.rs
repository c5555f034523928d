//! Orbit camera, pointer-ray generation, and screen projection.
//!
//! The simulation core is render-agnostic, but picking and hover
//! anchors need a view: rays are unprojected from pointer pixels and
//! agent positions are projected back to screen space for UI anchors.

use glam::{Mat4, Vec2, Vec3, Vec4};

const FOV_Y: f32 = 45.0_f32;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 200.0;

/// A world-space ray with normalized direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pub target: Vec3,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.6,
            distance: 40.0,
            target: Vec3::ZERO,
        }
    }

    pub fn position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = self.distance * self.pitch.sin();
        let z = self.distance * self.pitch.cos() * self.yaw.cos();
        self.target + Vec3::new(x, y, z)
    }

    pub fn view_proj(&self, viewport: (f32, f32)) -> Mat4 {
        let aspect = viewport.0 / viewport.1.max(1.0);
        let view = Mat4::look_at_rh(self.position(), self.target, Vec3::Y);
        let proj = Mat4::perspective_rh(FOV_Y.to_radians(), aspect, Z_NEAR, Z_FAR);
        proj * view
    }

    /// Unproject a pointer position in pixels into a world-space ray.
    pub fn screen_ray(&self, pixel: Vec2, viewport: (f32, f32)) -> Ray {
        let ndc = Vec2::new(
            (pixel.x / viewport.0) * 2.0 - 1.0,
            1.0 - (pixel.y / viewport.1) * 2.0,
        );
        let inv = self.view_proj(viewport).inverse();

        let near = inv * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        let far = inv * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;

        Ray {
            origin: near,
            dir: (far - near).normalize(),
        }
    }

    /// Project a world position to pixel coordinates. `None` when the
    /// point is behind the camera.
    pub fn project(&self, world: Vec3, viewport: (f32, f32)) -> Option<Vec2> {
        let clip = self.view_proj(viewport) * world.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * viewport.0,
            (1.0 - ndc.y) * 0.5 * viewport.1,
        ))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: (f32, f32) = (800.0, 600.0);

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = Camera::new();
        let ray = camera.screen_ray(Vec2::new(400.0, 300.0), VIEWPORT);

        // The center ray must pass very close to the orbit target.
        let to_target = camera.target - ray.origin;
        let along = to_target.dot(ray.dir);
        let closest = ray.origin + ray.dir * along;
        assert!(closest.distance(camera.target) < 0.1);
    }

    #[test]
    fn test_project_unproject_agree() {
        let camera = Camera::new();
        let world = Vec3::new(3.0, 0.0, -2.0);

        let pixel = camera.project(world, VIEWPORT).unwrap();
        let ray = camera.screen_ray(pixel, VIEWPORT);

        let to_point = world - ray.origin;
        let along = to_point.dot(ray.dir);
        let closest = ray.origin + ray.dir * along;
        assert!(closest.distance(world) < 0.05);
    }

    #[test]
    fn test_point_behind_camera_is_rejected() {
        let camera = Camera::new();
        let behind = camera.position() + (camera.position() - camera.target);
        assert_eq!(camera.project(behind, VIEWPORT), None);
    }
}
