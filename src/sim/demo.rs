//! Demo scenes
//!
//! A `Demo` is the serializable token that crosses the worker boundary; the
//! thread running the simulation turns it into a `Scene`.

use std::f32::consts::PI;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    BodyDef, DebugDraw, JointId, ParticleSystemDef, PhysicsWorld, SandboxWorld, SceneArena,
    StepIterations,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Demo {
    #[default]
    WaveMachine,
    DamBreak,
}

impl Demo {
    pub const ALL: [Demo; 2] = [Demo::WaveMachine, Demo::DamBreak];

    pub fn as_str(&self) -> &'static str {
        match self {
            Demo::WaveMachine => "waveMachine",
            Demo::DamBreak => "damBreak",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }

    pub fn build(self) -> Box<dyn Scene> {
        log::info!("building demo {}", self.as_str());
        match self {
            Demo::WaveMachine => Box::new(WaveMachine::new()),
            Demo::DamBreak => Box::new(DamBreak::new()),
        }
    }
}

/// Region of the world a demo wants on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub centre: Vec2,
    /// Full width and height in meters
    pub extent: Vec2,
}

/// A live demo: the world, its handles and any per-demo driving logic
pub trait Scene {
    fn demo(&self) -> Demo;

    fn step(&mut self, dt: f32, iterations: StepIterations);

    fn debug_draw(&self, sink: &mut dyn DebugDraw);

    fn view(&self) -> View;

    /// Engine handles still alive (0 once torn down)
    fn live_handles(&self) -> usize;
}

/// Rocking tank of liquid, driven by a motor whose speed follows a cosine
pub struct WaveMachine {
    arena: SceneArena<SandboxWorld>,
    joint: JointId,
    elapsed: f32,
}

impl WaveMachine {
    const WALLS: [[f32; 4]; 4] = [
        [0.05, 1.0, 2.0, 0.0],
        [0.05, 1.0, -2.0, 0.0],
        [2.0, 0.05, 0.0, 1.0],
        [2.0, 0.05, 0.0, -1.0],
    ];

    pub fn new() -> Self {
        let mut arena = SceneArena::new(SandboxWorld::new(Vec2::new(0.0, 10.0)));

        let ground = arena.world_mut().create_body(BodyDef::default());
        arena.track(ground);

        let body = arena
            .world_mut()
            .create_body(BodyDef::dynamic(Vec2::new(0.0, 1.0)));
        arena.track(body);
        for [hx, hy, x, y] in Self::WALLS {
            arena
                .world_mut()
                .create_box_fixture(body, Vec2::new(hx, hy), Vec2::new(x, y), 0.0);
        }

        let joint = arena
            .world_mut()
            .create_revolute_motor(ground, body, Vec2::new(0.0, 1.0), 0.05 * PI);
        arena.track(joint);

        let system = arena.world_mut().create_particle_system(ParticleSystemDef {
            radius: 0.025,
            damping: 0.2,
        });
        arena.track(system);
        arena
            .world_mut()
            .create_particle_group(system, Vec2::new(0.9, 0.9), Vec2::new(0.0, 1.0));

        Self {
            arena,
            joint,
            elapsed: 0.0,
        }
    }

    pub fn motor_speed(&self) -> Option<f32> {
        self.arena.world().motor_speed(self.joint)
    }
}

impl Default for WaveMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for WaveMachine {
    fn demo(&self) -> Demo {
        Demo::WaveMachine
    }

    fn step(&mut self, dt: f32, iterations: StepIterations) {
        self.elapsed += dt;
        let speed = 0.05 * self.elapsed.cos() * PI;
        let world = self.arena.world_mut();
        world.set_motor_speed(self.joint, speed);
        world.step(dt, iterations);
    }

    fn debug_draw(&self, sink: &mut dyn DebugDraw) {
        self.arena.world().debug_draw(sink);
    }

    fn view(&self) -> View {
        // Tank corners sweep a circle of radius ~2.25 around (0, 1)
        View {
            centre: Vec2::new(0.0, 1.0),
            extent: Vec2::new(4.6, 4.6),
        }
    }

    fn live_handles(&self) -> usize {
        self.arena.world().live_handles()
    }
}

/// A column of liquid released into a static basin with a tilted shelf
pub struct DamBreak {
    arena: SceneArena<SandboxWorld>,
}

impl DamBreak {
    pub fn new() -> Self {
        let mut arena = SceneArena::new(SandboxWorld::new(Vec2::new(0.0, 10.0)));

        let basin = arena
            .world_mut()
            .create_body(BodyDef::fixed(Vec2::new(0.0, 1.0)));
        arena.track(basin);
        for [hx, hy, x, y] in [
            [2.0, 0.05, 0.0, 1.0],
            [0.05, 1.0, -2.0, 0.0],
            [0.05, 1.0, 2.0, 0.0],
        ] {
            arena
                .world_mut()
                .create_box_fixture(basin, Vec2::new(hx, hy), Vec2::new(x, y), 0.0);
        }
        arena
            .world_mut()
            .create_box_fixture(basin, Vec2::new(0.4, 0.05), Vec2::new(0.8, 0.5), -0.4);

        let system = arena
            .world_mut()
            .create_particle_system(ParticleSystemDef::default());
        arena.track(system);
        arena
            .world_mut()
            .create_particle_group(system, Vec2::new(0.4, 0.8), Vec2::new(-1.5, 1.1));

        Self { arena }
    }
}

impl Default for DamBreak {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for DamBreak {
    fn demo(&self) -> Demo {
        Demo::DamBreak
    }

    fn step(&mut self, dt: f32, iterations: StepIterations) {
        self.arena.world_mut().step(dt, iterations);
    }

    fn debug_draw(&self, sink: &mut dyn DebugDraw) {
        self.arena.world().debug_draw(sink);
    }

    fn view(&self) -> View {
        View {
            centre: Vec2::new(0.0, 1.0),
            extent: Vec2::new(4.4, 2.4),
        }
    }

    fn live_handles(&self) -> usize {
        self.arena.world().live_handles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::DrawBuffer;

    #[test]
    fn test_demo_wire_names() {
        assert_eq!(
            serde_json::to_string(&Demo::WaveMachine).unwrap(),
            "\"waveMachine\""
        );
        assert_eq!(
            serde_json::from_str::<Demo>("\"damBreak\"").unwrap(),
            Demo::DamBreak
        );
        assert!(serde_json::from_str::<Demo>("\"nope\"").is_err());
    }

    #[test]
    fn test_from_str_matches_as_str() {
        for demo in Demo::ALL {
            assert_eq!(Demo::from_str(demo.as_str()), Some(demo));
        }
        assert_eq!(Demo::from_str("waves"), None);
    }

    #[test]
    fn test_wave_machine_layout() {
        let scene = WaveMachine::new();
        let mut draw = DrawBuffer::new();
        scene.debug_draw(&mut draw);
        // Four tank walls, one joint, 36 x 36 particles
        assert_eq!(draw.boxes.len(), 4);
        assert_eq!(draw.line_vertices.len(), 4);
        assert_eq!(draw.circles.centres.len(), 2 * 36 * 36);
        assert_eq!(scene.live_handles(), 4);
    }

    #[test]
    fn test_wave_machine_motor_follows_cosine() {
        let mut scene = WaveMachine::new();
        scene.step(PI, StepIterations::default());
        let speed = scene.motor_speed().unwrap();
        assert!((speed - 0.05 * PI * PI.cos()).abs() < 1e-5);
    }

    #[test]
    fn test_scenes_step_without_escaping_view() {
        for demo in Demo::ALL {
            let mut scene = demo.build();
            for _ in 0..120 {
                scene.step(1.0 / 60.0, StepIterations::default());
            }
            let view = scene.view();
            let mut draw = DrawBuffer::new();
            scene.debug_draw(&mut draw);
            let half = view.extent / 2.0;
            for c in draw.circles.centres.as_slice().chunks_exact(2) {
                let offset = Vec2::new(c[0], c[1]) - view.centre;
                assert!(
                    offset.x.abs() <= half.x && offset.y.abs() <= half.y,
                    "{} particle left the view: {:?}",
                    demo.as_str(),
                    c
                );
            }
        }
    }
}
