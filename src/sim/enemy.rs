// Enemy spawning and lifecycle
//
// Enemies enter from the right edge moving left, fly freely (no boundary
// clamping, otherwise they would pin themselves to the left wall) and are
// despawned once they have completely left the screen.

use rand::Rng;
use std::ops::RangeInclusive;

use super::body::KinematicBody;

/// Spawn column, right side of the screen
pub const SPAWN_X: f32 = 0.8;
pub const SIZE_RANGE: RangeInclusive<f32> = 0.05..=0.3;
pub const SPAWN_Y_RANGE: RangeInclusive<f32> = -0.7..=-0.5;
/// Always leftward
pub const SPAWN_VX_RANGE: RangeInclusive<f32> = -1.0..=-0.5;

/// Roll a fresh enemy body.
///
/// Width and height are drawn independently.
pub fn spawn_enemy<R: Rng + ?Sized>(rng: &mut R) -> KinematicBody {
    let width = rng.gen_range(SIZE_RANGE);
    let height = rng.gen_range(SIZE_RANGE);
    let y = rng.gen_range(SPAWN_Y_RANGE);
    let vx = rng.gen_range(SPAWN_VX_RANGE);

    KinematicBody::new(SPAWN_X, y, width, height).with_velocity(vx, 0.0)
}

/// Where an enemy is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyState {
    /// Visible and moving
    Active,
    /// Fully off-screen, will be dropped on the next sweep
    Despawned,
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: u64,
    pub body: KinematicBody,
    pub state: EnemyState,
}

impl Enemy {
    pub fn new(id: u64, body: KinematicBody) -> Self {
        Self {
            id,
            body,
            state: EnemyState::Active,
        }
    }

    /// Move the enemy and update its lifecycle state
    pub fn advance(&mut self, dt: f32) {
        if self.state != EnemyState::Active {
            return;
        }

        self.body = super::stepper::integrate(dt, self.body);

        if self.body.is_fully_outside() {
            self.state = EnemyState::Despawned;
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == EnemyState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_spawn_bounds() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            let enemy = spawn_enemy(&mut rng);
            assert!(SIZE_RANGE.contains(&enemy.width));
            assert!(SIZE_RANGE.contains(&enemy.height));
            assert!(SPAWN_Y_RANGE.contains(&enemy.y));
            assert!(SPAWN_VX_RANGE.contains(&enemy.vx));
            assert_eq!(enemy.x, 0.8);
            assert_eq!(enemy.vy, 0.0);
            assert_eq!(enemy.ax, 0.0);
            assert_eq!(enemy.ay, 0.0);
        }
    }

    #[test]
    fn test_enemy_despawns_off_left_edge() {
        let body = KinematicBody::new(SPAWN_X, -0.6, 0.2, 0.2).with_velocity(-1.0, 0.0);
        let mut enemy = Enemy::new(1, body);

        // 1.9 units of travel at 1 unit/s puts the right edge past -1
        for _ in 0..20 {
            enemy.advance(0.1);
        }

        assert_eq!(enemy.state, EnemyState::Despawned);
        assert!(enemy.body.right() < -1.0);
    }

    #[test]
    fn test_enemy_stays_active_while_visible() {
        let body = KinematicBody::new(SPAWN_X, -0.6, 0.2, 0.2).with_velocity(-0.5, 0.0);
        let mut enemy = Enemy::new(1, body);
        enemy.advance(0.1);

        assert!(enemy.is_active());
        assert!(enemy.body.x < SPAWN_X);
        // Free flight keeps vx, no wall contact
        assert_eq!(enemy.body.vx, -0.5);
    }
}
