// Physics stepper - semi-implicit integration plus boundary collision
//
// `step` is a pure function of (dt, body). dt is whatever the caller measured
// (wall-clock between frames, or a fixed tick from `FixedTimestep`), so tests
// inject dt directly instead of touching a clock.

use super::body::{KinematicBody, SPACE_MAX, SPACE_MIN};

/// Gain applied to the x acceleration when updating vx.
///
/// The x axis does NOT integrate `ax * dt`; it adds `ax * X_ACCEL_GAIN`
/// regardless of the frame time. The y axis uses the regular `ay * dt`.
pub const X_ACCEL_GAIN: f32 = 0.01;

/// Advance a body by `dt` seconds without any collision handling.
pub fn integrate(dt: f32, body: KinematicBody) -> KinematicBody {
    let mut next = body;
    next.y += body.vy * dt + 0.5 * body.ay * dt * dt;
    next.vy += body.ay * dt;
    next.x += body.vx * dt + 0.5 * body.ax * dt * dt;
    next.vx += body.ax * X_ACCEL_GAIN;
    next
}

/// Correct a body against the [-1, 1] boundary.
///
/// Only ONE correction is applied per call (x first, then top, then bottom).
/// A body outside on both axes gets its vx zeroed and keeps its y overshoot
/// until the next call.
pub fn resolve_boundary(body: KinematicBody) -> KinematicBody {
    let mut next = body;

    if body.right() > SPACE_MAX || body.left() < SPACE_MIN {
        // x stays where it is, only the motion stops
        next.vx = 0.0;
    } else if body.top() < SPACE_MIN {
        next.vy = 0.0;
        next.y = SPACE_MIN + body.half_height();
    } else if body.bottom() > SPACE_MAX {
        next.vy = 0.0;
        next.y = SPACE_MAX - body.half_height();
    }

    next
}

/// Integrate then collide - the full per-tick update for boundary-bound bodies.
pub fn step(dt: f32, body: KinematicBody) -> KinematicBody {
    resolve_boundary(integrate(dt, body))
}

/// Fixed-timestep accumulator.
///
/// Feeds variable frame times in and hands back how many fixed ticks to run,
/// carrying the remainder into the next frame.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: f32,
    accumulator: f32,
    max_steps: u32,
}

impl FixedTimestep {
    /// Upper bound of ticks per frame before excess time is dropped
    pub const DEFAULT_MAX_STEPS: u32 = 8;

    pub fn new(step: f32) -> Self {
        Self {
            step,
            accumulator: 0.0,
            max_steps: Self::DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// Time banked but not yet simulated
    #[cfg(test)]
    pub fn pending(&self) -> f32 {
        self.accumulator
    }

    /// Add `dt` seconds and return the number of fixed ticks due.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.max(0.0);

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }

        if self.accumulator >= self.step {
            log::warn!(
                "Physics falling behind, dropping {:.3}s of simulation time",
                self.accumulator - self.accumulator % self.step
            );
            self.accumulator %= self.step;
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_player_scenario() {
        let player = KinematicBody::new(-0.8, -0.5, 0.2, 0.2).with_acceleration(0.0, 1.3);
        let next = step(0.1, player);

        assert!(approx(next.vy, 0.13));
        assert!(approx(next.y, -0.4935));
        assert_eq!(next.x, -0.8);
        assert_eq!(next.vx, 0.0);
    }

    #[test]
    fn test_step_is_deterministic() {
        let body = KinematicBody::new(0.1, 0.2, 0.3, 0.1)
            .with_velocity(0.4, -0.2)
            .with_acceleration(0.5, 1.3);
        assert_eq!(step(0.016, body), step(0.016, body));
    }

    #[test]
    fn test_moves_along_velocity() {
        let body = KinematicBody::new(0.0, 0.0, 0.1, 0.1)
            .with_velocity(0.5, 0.25)
            .with_acceleration(0.0, 1.0);
        let next = step(0.05, body);
        assert!(next.x > body.x);
        assert!(next.y > body.y);

        let still = step(0.0, body);
        assert_eq!(still.x, body.x);
        assert_eq!(still.y, body.y);
    }

    #[test]
    fn test_x_acceleration_ignores_dt() {
        let body = KinematicBody::new(0.0, 0.0, 0.1, 0.1).with_acceleration(2.0, 0.0);
        let short = integrate(0.001, body);
        let long = integrate(0.05, body);
        assert!(approx(short.vx, 2.0 * X_ACCEL_GAIN));
        assert!(approx(long.vx, 2.0 * X_ACCEL_GAIN));
    }

    #[test]
    fn test_top_clamp() {
        let body = KinematicBody::new(0.0, -0.95, 0.2, 0.2).with_velocity(0.0, -0.7);
        let next = step(0.0, body);
        assert_eq!(next.y, -1.0 + 0.2 / 2.0);
        assert_eq!(next.vy, 0.0);
    }

    #[test]
    fn test_bottom_clamp() {
        let body = KinematicBody::new(0.0, 0.85, 0.4, 0.4)
            .with_velocity(0.0, 0.5)
            .with_acceleration(0.0, 1.3);
        let next = step(0.1, body);
        assert_eq!(next.y, 1.0 - 0.4 / 2.0);
        assert_eq!(next.vy, 0.0);
    }

    #[test]
    fn test_x_boundary_zeroes_velocity() {
        for vx in [0.6f32, -0.6] {
            let body = KinematicBody::new(0.95 * vx.signum(), 0.0, 0.2, 0.2).with_velocity(vx, 0.0);
            let next = step(0.0, body);
            assert_eq!(next.vx, 0.0);
            // No positional correction on this axis
            assert_eq!(next.x, body.x);
        }
    }

    #[test]
    fn test_only_one_axis_corrected() {
        // Out on the right AND below the bottom
        let body = KinematicBody::new(0.98, 0.98, 0.2, 0.2).with_velocity(0.3, 0.3);
        let next = step(0.0, body);
        assert_eq!(next.vx, 0.0);
        assert_eq!(next.vy, 0.3);
        assert_eq!(next.y, 0.98);
    }

    #[test]
    fn test_resting_on_floor_stays_put() {
        let mut body = KinematicBody::new(0.0, 0.9, 0.2, 0.2).with_acceleration(0.0, 1.3);
        for _ in 0..100 {
            body = step(1.0 / 60.0, body);
        }
        assert_eq!(body.y, 1.0 - body.half_height());
        assert_eq!(body.vy, 0.0);
    }

    #[test]
    fn test_fixed_timestep_carries_remainder() {
        let mut clock = FixedTimestep::new(0.25);
        assert_eq!(clock.advance(0.6), 2);
        assert!(approx(clock.pending(), 0.1));
        assert_eq!(clock.advance(0.2), 1);
        assert!(approx(clock.pending(), 0.05));
        assert_eq!(clock.advance(-1.0), 0);
    }

    #[test]
    fn test_fixed_timestep_caps_steps() {
        let mut clock = FixedTimestep::new(0.25).with_max_steps(3);
        assert_eq!(clock.advance(10.0), 3);
        assert!(clock.pending() < clock.step());
    }
}
