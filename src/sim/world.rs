// Simulation context - owns every piece of mutable game state
//
// The main loop owns one of these and hands it to the physics update and the
// scene composer. Nothing here is global.

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::body::KinematicBody;
use super::enemy::{spawn_enemy, Enemy};
use super::stepper::{self, FixedTimestep};
use crate::config::Config;

/// Tuning values copied out of the config at startup
#[derive(Debug, Clone, Copy)]
pub struct SimulationParams {
    /// Upward speed applied by a jump
    pub jump_velocity: f32,
    /// Longest variable dt accepted before clamping
    pub max_frame_dt: f32,
    pub spawn_enemies: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            jump_velocity: 1.2,
            max_frame_dt: 0.1,
            spawn_enemies: true,
        }
    }
}

pub struct SimulationContext {
    pub player: KinematicBody,
    enemies: Vec<Enemy>,
    next_enemy_id: u64,
    rng: StdRng,
    params: SimulationParams,
    /// None = integrate with the measured frame time
    timestep: Option<FixedTimestep>,
}

impl SimulationContext {
    pub fn new(player: KinematicBody, params: SimulationParams, rng: StdRng) -> Self {
        Self {
            player,
            enemies: Vec::new(),
            next_enemy_id: 0,
            rng,
            params,
            timestep: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let player = KinematicBody::new(
            config.player.x,
            config.player.y,
            config.player.width,
            config.player.height,
        )
        .with_acceleration(0.0, config.physics.gravity);

        let params = SimulationParams {
            jump_velocity: config.physics.jump_velocity,
            max_frame_dt: config.physics.max_frame_dt,
            spawn_enemies: config.enemies.enabled,
        };

        let rng = match config.enemies.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut sim = Self::new(player, params, rng);
        if let Some(step) = config.physics.fixed_timestep {
            log::info!("Physics: fixed timestep {:.4}s", step);
            let timestep =
                FixedTimestep::new(step).with_max_steps(config.physics.max_steps_per_frame);
            sim = sim.with_fixed_timestep(timestep);
        } else {
            log::info!("Physics: variable timestep");
        }
        sim
    }

    pub fn with_fixed_timestep(mut self, timestep: FixedTimestep) -> Self {
        self.timestep = Some(timestep);
        self
    }

    /// Enemies still in play
    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.iter().filter(|e| e.is_active())
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies().count()
    }

    /// Jump key handler
    pub fn jump(&mut self) {
        self.player.jump(self.params.jump_velocity);
    }

    /// Advance the whole world by the measured frame time.
    pub fn update(&mut self, frame_dt: f32) {
        // min/max rather than clamp: a bad max must not panic mid-game
        let frame_dt = frame_dt.min(self.params.max_frame_dt).max(0.0);

        match self.timestep.as_mut() {
            Some(timestep) => {
                let ticks = timestep.advance(frame_dt);
                let dt = timestep.step();
                for _ in 0..ticks {
                    self.tick(dt);
                }
            }
            None => self.tick(frame_dt),
        }
    }

    fn tick(&mut self, dt: f32) {
        self.player = stepper::step(dt, self.player);

        for enemy in &mut self.enemies {
            enemy.advance(dt);
        }

        self.enemies.retain(|enemy| {
            if !enemy.is_active() {
                log::debug!("Enemy {} left the screen, despawning", enemy.id);
            }
            enemy.is_active()
        });

        if self.params.spawn_enemies && self.enemies.is_empty() {
            self.spawn();
        }
    }

    fn spawn(&mut self) {
        let body = spawn_enemy(&mut self.rng);
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;

        log::debug!(
            "Spawned enemy {} at ({:.2}, {:.2}) size {:.2}x{:.2} vx {:.2}",
            id, body.x, body.y, body.width, body.height, body.vx
        );
        self.enemies.push(Enemy::new(id, body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context(spawn_enemies: bool) -> SimulationContext {
        let player = KinematicBody::new(-0.8, -0.5, 0.2, 0.2).with_acceleration(0.0, 1.3);
        let params = SimulationParams {
            spawn_enemies,
            ..Default::default()
        };
        SimulationContext::new(player, params, StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_update_moves_player() {
        let mut sim = test_context(false);
        sim.update(0.1);
        assert!((sim.player.y - -0.4935).abs() < 1e-6);
        assert_eq!(sim.enemy_count(), 0);
    }

    #[test]
    fn test_spawns_one_enemy_when_empty() {
        let mut sim = test_context(true);
        sim.update(0.016);
        assert_eq!(sim.enemy_count(), 1);

        // Still exactly one while it crosses the screen
        sim.update(0.016);
        assert_eq!(sim.enemy_count(), 1);
        let first = sim.enemies().next().map(|e| e.id);
        assert_eq!(first, Some(0));
    }

    #[test]
    fn test_respawns_after_despawn() {
        let mut sim = test_context(true);
        sim.update(0.016);

        // Slowest enemy needs (0.8 + 1 + 0.15) / 0.5 = 3.9s to leave
        for _ in 0..60 {
            sim.update(0.1);
        }

        let ids: Vec<u64> = sim.enemies().map(|e| e.id).collect();
        assert_eq!(ids.len(), 1);
        assert!(ids[0] > 0);
    }

    #[test]
    fn test_frame_dt_is_clamped() {
        let mut sim = test_context(false);
        let mut reference = test_context(false);
        sim.update(5.0);
        reference.update(0.1);
        assert_eq!(sim.player, reference.player);
    }

    #[test]
    fn test_bad_max_frame_dt_does_not_panic() {
        let player = KinematicBody::new(-0.8, -0.5, 0.2, 0.2).with_acceleration(0.0, 1.3);
        for max_frame_dt in [-0.1, f32::NAN] {
            let params = SimulationParams {
                max_frame_dt,
                spawn_enemies: false,
                ..Default::default()
            };
            let mut sim = SimulationContext::new(player, params, StdRng::seed_from_u64(1));
            sim.update(0.016);
            assert!(sim.player.y.is_finite());
        }
    }

    #[test]
    fn test_fixed_timestep_from_config() {
        let config = Config::from_toml(
            "[physics]\nfixed_timestep = 0.01\nmax_steps_per_frame = 2\n[enemies]\nenabled = false",
        )
        .unwrap();
        let mut sim = SimulationContext::from_config(&config);
        let mut manual = sim.player;

        // 0.1s due, only two ticks allowed
        sim.update(0.1);
        for _ in 0..2 {
            manual = stepper::step(0.01, manual);
        }
        assert_eq!(sim.player, manual);
    }

    #[test]
    fn test_fixed_timestep_ticks() {
        let mut sim = test_context(false).with_fixed_timestep(FixedTimestep::new(0.05));
        let mut manual = test_context(false).player;

        sim.update(0.1);
        for _ in 0..2 {
            manual = stepper::step(0.05, manual);
        }
        assert_eq!(sim.player, manual);
    }

    #[test]
    fn test_jump_sets_upward_velocity() {
        let mut sim = test_context(false);
        sim.jump();
        assert_eq!(sim.player.vy, -1.2);
        sim.update(0.05);
        assert!(sim.player.y < -0.5);
    }
}
