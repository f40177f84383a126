// Scene composer - turns simulation bodies into a vertex stream
//
// Every sprite is one quad = 6 vertices after triangulation. Body quads are
// authored around the origin; the body position travels separately through
// the transform uniform (one vec4 per quad, picked in the vertex shader with
// gl_VertexIndex / 6). Static quads are baked in world space and get a zero
// offset.

use glam::Vec4;

use crate::sim::{KinematicBody, SimulationContext};

/// Length of the offset array in the vertex shader's uniform block
pub const MAX_QUADS: usize = 256;
pub const VERTICES_PER_QUAD: usize = 6;
/// Ground, player and the one live enemy drawn by `SceneComposer::with_ground`
pub const MIN_QUADS: usize = 3;

pub const PLAYER_COLOR: [f32; 3] = [0.2, 0.6, 1.0];
pub const ENEMY_COLOR: [f32; 3] = [1.0, 0.25, 0.2];
pub const GROUND_COLOR: [f32; 3] = [0.3, 0.3, 0.3];

// Depth values, lower is closer
const PLAYER_DEPTH: f32 = 0.1;
const ENEMY_DEPTH: f32 = 0.2;
const GROUND_DEPTH: f32 = 0.5;

/// Interleaved vertex, must match the pipeline's vertex input description
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// Four corners in drawing order
pub type Quad = [Vertex; 4];

/// Split a quad into two triangles.
///
/// Drops the last corner, then appends corner 0, corner 2 and the dropped
/// corner: [A, B, C, D] -> [A, B, C, A, C, D]. The pipeline treats clockwise
/// as front-facing, so the corner order going in must be clockwise on screen.
pub fn triangulate(quad: Quad) -> [Vertex; VERTICES_PER_QUAD] {
    let [a, b, c, d] = quad;
    [a, b, c, a, c, d]
}

/// Body-local quad: corners at (±w/2, ±h/2), ordered TL, TR, BR, BL.
///
/// With +y pointing down the screen this order is clockwise.
pub fn body_quad(body: &KinematicBody, color: [f32; 3], depth: f32) -> Quad {
    let hw = body.half_width();
    let hh = body.half_height();
    [
        Vertex::new([-hw, -hh, depth], color),
        Vertex::new([hw, -hh, depth], color),
        Vertex::new([hw, hh, depth], color),
        Vertex::new([-hw, hh, depth], color),
    ]
}

/// World-space axis-aligned quad from two opposite corners
pub fn world_quad(min: [f32; 2], max: [f32; 2], color: [f32; 3], depth: f32) -> Quad {
    [
        Vertex::new([min[0], min[1], depth], color),
        Vertex::new([max[0], min[1], depth], color),
        Vertex::new([max[0], max[1], depth], color),
        Vertex::new([min[0], max[1], depth], color),
    ]
}

/// Something to draw this frame
#[derive(Debug, Clone, Copy)]
pub struct Sprite {
    pub body: KinematicBody,
    pub color: [f32; 3],
    pub depth: f32,
}

/// The CPU-side result of composing one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneFrame {
    pub vertices: Vec<Vertex>,
    /// One translation per quad, xy used, zw padding for std140
    pub offsets: Vec<Vec4>,
}

impl SceneFrame {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn quad_count(&self) -> usize {
        self.offsets.len()
    }

    fn push_quad(&mut self, quad: Quad, offset: Vec4) {
        self.vertices.extend_from_slice(&triangulate(quad));
        self.offsets.push(offset);
    }
}

/// Build the vertex stream: static quads first, then one quad per sprite.
pub fn compose<'a>(
    static_quads: &[Quad],
    sprites: impl IntoIterator<Item = &'a Sprite>,
) -> SceneFrame {
    let mut frame = SceneFrame::default();

    for &quad in static_quads {
        frame.push_quad(quad, Vec4::ZERO);
    }

    for sprite in sprites {
        let quad = body_quad(&sprite.body, sprite.color, sprite.depth);
        frame.push_quad(quad, Vec4::new(sprite.body.x, sprite.body.y, 0.0, 0.0));
    }

    frame
}

/// Holds the static geometry and knows how to dress up a simulation
pub struct SceneComposer {
    static_quads: Vec<Quad>,
    sprites: Vec<Sprite>,
}

impl SceneComposer {
    pub fn new() -> Self {
        Self {
            static_quads: Vec::new(),
            sprites: Vec::new(),
        }
    }

    /// Default scene: a thin ground strip along the bottom edge
    pub fn with_ground() -> Self {
        Self::new().with_static_quad(world_quad([-1.0, 0.97], [1.0, 1.0], GROUND_COLOR, GROUND_DEPTH))
    }

    pub fn with_static_quad(mut self, quad: Quad) -> Self {
        self.static_quads.push(quad);
        self
    }

    pub fn compose(&mut self, sim: &SimulationContext) -> SceneFrame {
        // Reuse the sprite list between frames
        self.sprites.clear();
        self.sprites.push(Sprite {
            body: sim.player,
            color: PLAYER_COLOR,
            depth: PLAYER_DEPTH,
        });
        self.sprites.extend(sim.enemies().map(|enemy| Sprite {
            body: enemy.body,
            color: ENEMY_COLOR,
            depth: ENEMY_DEPTH,
        }));

        compose(&self.static_quads, &self.sprites)
    }
}

impl Default for SceneComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::world::SimulationParams;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tagged(tag: f32) -> Vertex {
        Vertex::new([tag, 0.0, 0.0], [0.0; 3])
    }

    #[test]
    fn test_triangulation_order() {
        let (a, b, c, d) = (tagged(1.0), tagged(2.0), tagged(3.0), tagged(4.0));
        assert_eq!(triangulate([a, b, c, d]), [a, b, c, a, c, d]);
    }

    #[test]
    fn test_body_quad_is_local() {
        let body = KinematicBody::new(0.5, -0.25, 0.2, 0.4);
        let quad = body_quad(&body, PLAYER_COLOR, 0.1);
        let corners: Vec<[f32; 2]> = quad.iter().map(|v| [v.position[0], v.position[1]]).collect();
        assert_eq!(
            corners,
            vec![[-0.1, -0.2], [0.1, -0.2], [0.1, 0.2], [-0.1, 0.2]]
        );
    }

    #[test]
    fn test_body_quad_winding_is_clockwise_on_screen() {
        // Screen y points down, so a positive cross product means clockwise
        let quad = body_quad(&KinematicBody::new(0.0, 0.0, 0.3, 0.3), PLAYER_COLOR, 0.0);
        let tris = triangulate(quad);
        for tri in tris.chunks(3) {
            let (p0, p1, p2) = (tri[0].position, tri[1].position, tri[2].position);
            let cross = (p1[0] - p0[0]) * (p2[1] - p0[1]) - (p1[1] - p0[1]) * (p2[0] - p0[0]);
            assert!(cross > 0.0);
        }
    }

    #[test]
    fn test_compose_offsets_per_quad() {
        let ground = world_quad([-1.0, 0.9], [1.0, 1.0], GROUND_COLOR, 0.5);
        let sprites = [
            Sprite {
                body: KinematicBody::new(-0.8, -0.5, 0.2, 0.2),
                color: PLAYER_COLOR,
                depth: 0.1,
            },
            Sprite {
                body: KinematicBody::new(0.8, -0.6, 0.1, 0.1),
                color: ENEMY_COLOR,
                depth: 0.2,
            },
        ];

        let frame = compose(&[ground], &sprites);

        assert_eq!(frame.vertex_count(), 18);
        assert_eq!(frame.quad_count(), 3);
        assert_eq!(frame.offsets[0], Vec4::ZERO);
        assert_eq!(frame.offsets[1], Vec4::new(-0.8, -0.5, 0.0, 0.0));
        assert_eq!(frame.offsets[2], Vec4::new(0.8, -0.6, 0.0, 0.0));
        // Static geometry keeps its world coordinates
        assert_eq!(frame.vertices[0].position, [-1.0, 0.9, 0.5]);
        assert_eq!(frame.vertices[6].color, PLAYER_COLOR);
        assert_eq!(frame.vertices[12].color, ENEMY_COLOR);
    }

    #[test]
    fn test_composer_tracks_simulation() {
        let player = KinematicBody::new(-0.8, -0.5, 0.2, 0.2).with_acceleration(0.0, 1.3);
        let mut sim = SimulationContext::new(player, SimulationParams::default(), StdRng::seed_from_u64(3));
        let mut composer = SceneComposer::with_ground();

        let before = composer.compose(&sim);
        assert_eq!(before.quad_count(), 2); // ground + player

        sim.update(0.016);
        let after = composer.compose(&sim);
        assert_eq!(after.quad_count(), 3); // ground + player + enemy
        assert_eq!(after.offsets[1].x, sim.player.x);
        assert_eq!(after.offsets[1].y, sim.player.y);
    }
}
