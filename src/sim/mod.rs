//! Simulation engine boundary
//!
//! The physics engine is a black box behind `PhysicsWorld`: it steps, emits
//! debug-draw primitives and hands out handles that must each be destroyed
//! explicitly. `SceneArena` owns a world plus every handle created while
//! building a scene and releases them together on teardown.
//!
//! `SandboxWorld` is the built-in engine so demos run without native
//! bindings; `demo` builds the scenes.

pub mod arena;
pub mod demo;
pub mod world;

pub use arena::SceneArena;
pub use demo::{Demo, Scene, View};
pub use world::{BodyDef, BodyKind, ParticleSystemDef, SandboxWorld};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Primitive sink the engine draws into after a step
pub trait DebugDraw {
    /// A box fixture as 4 world-space corners, wound in order
    fn draw_box(&mut self, corners: [Vec2; 4]);
    fn draw_segment(&mut self, from: Vec2, to: Vec2);
    /// A batch of particle centres sharing one radius
    fn draw_circles(&mut self, centres: &[Vec2], radius: f32);

    /// Announce how many primitives this pass will emit, before the first
    /// draw call
    fn reserve(&mut self, _boxes: usize, _segments: usize, _circles: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleSystemId(pub(crate) u32);

/// Any engine-owned resource that needs an explicit destroy call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Body(BodyId),
    Joint(JointId),
    ParticleSystem(ParticleSystemId),
}

impl From<BodyId> for Handle {
    fn from(id: BodyId) -> Self {
        Handle::Body(id)
    }
}

impl From<JointId> for Handle {
    fn from(id: JointId) -> Self {
        Handle::Joint(id)
    }
}

impl From<ParticleSystemId> for Handle {
    fn from(id: ParticleSystemId) -> Self {
        Handle::ParticleSystem(id)
    }
}

/// Solver iteration counts passed to every `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepIterations {
    pub velocity: u32,
    pub position: u32,
    pub particle: u32,
}

impl Default for StepIterations {
    fn default() -> Self {
        Self {
            velocity: 1,
            position: 1,
            particle: 3,
        }
    }
}

pub trait PhysicsWorld {
    fn step(&mut self, dt: f32, iterations: StepIterations);

    fn debug_draw(&self, sink: &mut dyn DebugDraw);

    /// Release one engine-owned handle
    fn destroy(&mut self, handle: Handle);

    /// Handles created and not yet destroyed
    fn live_handles(&self) -> usize;
}
