// Simulation - bodies, physics stepper, enemies
//
// Pure CPU code with no Vulkan dependency; everything here is unit tested
// with injected time deltas.

pub mod body;
pub mod enemy;
pub mod stepper;
pub mod world;

pub use body::KinematicBody;
pub use world::SimulationContext;
