use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 5000.0;
const MAX_PITCH: f32 = 89.0;
const MIN_ZOOM: f32 = 1.0;
const MAX_ZOOM: f32 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Free-flying Euler-angle camera.
///
/// Angles are kept in degrees; yaw -90 looks down -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub zoom: f32,
    pub speed: f32,
    pub sensitivity: f32,
    front: Vec3,
    right: Vec3,
    up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::from(&CameraConfig::default())
    }
}

impl From<&CameraConfig> for Camera {
    fn from(config: &CameraConfig) -> Self {
        let mut camera = Self {
            position: config.position,
            yaw: config.yaw,
            pitch: config.pitch.clamp(-MAX_PITCH, MAX_PITCH),
            zoom: config.zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            speed: config.speed,
            sensitivity: config.sensitivity,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
        };
        camera.update_vectors();
        camera
    }
}

impl Camera {
    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.zoom.to_radians(),
            aspect.max(1e-3),
            NEAR_PLANE,
            FAR_PLANE,
        )
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn process_movement(&mut self, movement: Movement, dt: f32) {
        let velocity = self.speed * dt;
        let offset = match movement {
            Movement::Forward => self.front,
            Movement::Backward => -self.front,
            Movement::Left => -self.right,
            Movement::Right => self.right,
            Movement::Up => self.up,
            Movement::Down => -self.up,
        };
        self.position += offset * velocity;
    }

    /// Applies a pointer delta in pixels; positive y looks up.
    pub fn process_pointer(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch + dy * self.sensitivity).clamp(-MAX_PITCH, MAX_PITCH);
        self.update_vectors();
    }

    pub fn process_scroll(&mut self, amount: f32) {
        self.zoom = (self.zoom - amount).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(Vec3::Y).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}
