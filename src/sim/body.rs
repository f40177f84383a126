// Kinematic bodies - axis-aligned rectangles in normalized space
//
// Simulation space matches Vulkan clip space: both axes span [-1, 1] and
// +y points DOWN the screen, so a positive `ay` behaves like gravity.

/// Lower edge of the simulation space on both axes
pub const SPACE_MIN: f32 = -1.0;
/// Upper edge of the simulation space on both axes
pub const SPACE_MAX: f32 = 1.0;

/// A rectangle with position, size, velocity and acceleration.
///
/// `x`/`y` is the center; `width`/`height` are full extents, so the box
/// spans `x ± width/2` and `y ± height/2`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicBody {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub vx: f32,
    pub vy: f32,
    pub ax: f32,
    pub ay: f32,
}

impl KinematicBody {
    /// A body at rest
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_velocity(mut self, vx: f32, vy: f32) -> Self {
        self.vx = vx;
        self.vy = vy;
        self
    }

    pub fn with_acceleration(mut self, ax: f32, ay: f32) -> Self {
        self.ax = ax;
        self.ay = ay;
        self
    }

    pub fn half_width(&self) -> f32 {
        self.width / 2.0
    }

    pub fn half_height(&self) -> f32 {
        self.height / 2.0
    }

    pub fn left(&self) -> f32 {
        self.x - self.half_width()
    }

    pub fn right(&self) -> f32 {
        self.x + self.half_width()
    }

    /// Edge with the smaller y (top of the screen)
    pub fn top(&self) -> f32 {
        self.y - self.half_height()
    }

    /// Edge with the larger y (bottom of the screen)
    pub fn bottom(&self) -> f32 {
        self.y + self.half_height()
    }

    /// True once no part of the box overlaps the simulation space
    pub fn is_fully_outside(&self) -> bool {
        self.right() < SPACE_MIN
            || self.left() > SPACE_MAX
            || self.bottom() < SPACE_MIN
            || self.top() > SPACE_MAX
    }

    /// Apply an instantaneous upward velocity change
    pub fn jump(&mut self, speed: f32) {
        self.vy = -speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges() {
        let body = KinematicBody::new(-0.8, -0.5, 0.2, 0.4);
        assert!((body.left() - -0.9).abs() < 1e-6);
        assert!((body.right() - -0.7).abs() < 1e-6);
        assert!((body.top() - -0.7).abs() < 1e-6);
        assert!((body.bottom() - -0.3).abs() < 1e-6);
    }

    #[test]
    fn test_fully_outside() {
        let inside = KinematicBody::new(0.0, 0.0, 0.2, 0.2);
        assert!(!inside.is_fully_outside());

        // Straddling the left edge still counts as on screen
        let straddling = KinematicBody::new(-1.05, 0.0, 0.2, 0.2);
        assert!(!straddling.is_fully_outside());

        let gone = KinematicBody::new(-1.2, 0.0, 0.2, 0.2);
        assert!(gone.is_fully_outside());
    }

    #[test]
    fn test_jump_points_up() {
        let mut body = KinematicBody::new(0.0, 0.9, 0.2, 0.2);
        body.jump(1.2);
        assert_eq!(body.vy, -1.2);
    }
}
