//! Built-in sandbox physics world
//!
//! Box fixtures on bodies, motorised revolute joints that
//! drive their body kinematically, and particle systems that fall under
//! gravity and collide with every box fixture. Particles do not interact
//! with each other and bodies do not collide with each other.
//!
//! Handles follow the manual destroy model of native engines: every body,
//! joint and particle system stays alive until destroyed explicitly.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::{BodyId, DebugDraw, Handle, JointId, ParticleSystemId, PhysicsWorld, StepIterations};

/// Normal velocity kept after a particle hits a fixture
const RESTITUTION: f32 = 0.1;
/// Jitter applied to particle spawn positions, as a fraction of radius
const SPAWN_JITTER: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    #[default]
    Static,
    /// Falls under gravity unless a motor joint drives it
    Dynamic,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BodyDef {
    pub kind: BodyKind,
    pub position: Vec2,
    pub angle: f32,
}

impl BodyDef {
    pub fn fixed(position: Vec2) -> Self {
        Self {
            kind: BodyKind::Static,
            position,
            angle: 0.0,
        }
    }

    pub fn dynamic(position: Vec2) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            position,
            angle: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParticleSystemDef {
    pub radius: f32,
    /// Fraction of velocity removed per second
    pub damping: f32,
}

impl Default for ParticleSystemDef {
    fn default() -> Self {
        Self {
            radius: 0.025,
            damping: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BoxFixture {
    half_extents: Vec2,
    centre: Vec2,
    angle: f32,
}

#[derive(Debug, Clone)]
struct Body {
    kind: BodyKind,
    position: Vec2,
    angle: f32,
    velocity: Vec2,
    angular_velocity: f32,
    driven: bool,
    fixtures: Vec<BoxFixture>,
}

impl Body {
    /// Velocity of a world-space point rigidly attached to this body
    fn point_velocity(&self, point: Vec2) -> Vec2 {
        self.velocity + self.angular_velocity * (point - self.position).perp()
    }
}

#[derive(Debug, Clone, Copy)]
struct RevoluteMotor {
    ground: BodyId,
    body: BodyId,
    anchor: Vec2,
    motor_speed: f32,
}

#[derive(Debug, Clone)]
struct ParticleSystem {
    radius: f32,
    damping: f32,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
}

pub struct SandboxWorld {
    gravity: Vec2,
    bodies: Vec<Option<Body>>,
    joints: Vec<Option<RevoluteMotor>>,
    particle_systems: Vec<Option<ParticleSystem>>,
    rng: Pcg32,
}

impl SandboxWorld {
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity,
            bodies: Vec::new(),
            joints: Vec::new(),
            particle_systems: Vec::new(),
            rng: Pcg32::seed_from_u64(0x5eed),
        }
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn create_body(&mut self, def: BodyDef) -> BodyId {
        self.bodies.push(Some(Body {
            kind: def.kind,
            position: def.position,
            angle: def.angle,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            driven: false,
            fixtures: Vec::new(),
        }));
        BodyId(self.bodies.len() as u32 - 1)
    }

    /// Attach a box of `half_extents` centred at `centre` in body space
    pub fn create_box_fixture(&mut self, body: BodyId, half_extents: Vec2, centre: Vec2, angle: f32) {
        match self.body_mut(body) {
            Some(body) => body.fixtures.push(BoxFixture {
                half_extents,
                centre,
                angle,
            }),
            None => log::warn!("fixture on destroyed body {:?}", body),
        }
    }

    pub fn body_position(&self, body: BodyId) -> Option<(Vec2, f32)> {
        self.body(body).map(|b| (b.position, b.angle))
    }

    /// Revolute joint pinning `body` to `ground` at the world-space `anchor`,
    /// driven at `motor_speed` rad/s
    pub fn create_revolute_motor(
        &mut self,
        ground: BodyId,
        body: BodyId,
        anchor: Vec2,
        motor_speed: f32,
    ) -> JointId {
        if let Some(b) = self.body_mut(body) {
            b.driven = true;
        }
        self.joints.push(Some(RevoluteMotor {
            ground,
            body,
            anchor,
            motor_speed,
        }));
        JointId(self.joints.len() as u32 - 1)
    }

    pub fn set_motor_speed(&mut self, joint: JointId, speed: f32) {
        if let Some(Some(motor)) = self.joints.get_mut(joint.0 as usize) {
            motor.motor_speed = speed;
        }
    }

    pub fn motor_speed(&self, joint: JointId) -> Option<f32> {
        self.joints
            .get(joint.0 as usize)
            .and_then(Option::as_ref)
            .map(|m| m.motor_speed)
    }

    pub fn create_particle_system(&mut self, def: ParticleSystemDef) -> ParticleSystemId {
        self.particle_systems.push(Some(ParticleSystem {
            radius: def.radius,
            damping: def.damping,
            positions: Vec::new(),
            velocities: Vec::new(),
        }));
        ParticleSystemId(self.particle_systems.len() as u32 - 1)
    }

    /// Fill an axis-aligned box with particles on a grid of one diameter.
    /// Returns the number of particles created.
    pub fn create_particle_group(
        &mut self,
        system: ParticleSystemId,
        half_extents: Vec2,
        centre: Vec2,
    ) -> usize {
        let Some(Some(ps)) = self.particle_systems.get_mut(system.0 as usize) else {
            log::warn!("particle group on destroyed system {:?}", system);
            return 0;
        };
        let spacing = ps.radius * 2.0;
        let cols = ((half_extents.x * 2.0) / spacing + 1e-4).floor() as usize;
        let rows = ((half_extents.y * 2.0) / spacing + 1e-4).floor() as usize;
        let origin = centre - half_extents + Vec2::splat(ps.radius);
        let jitter = ps.radius * SPAWN_JITTER;

        for row in 0..rows {
            for col in 0..cols {
                let offset = Vec2::new(
                    self.rng.random_range(-jitter..=jitter),
                    self.rng.random_range(-jitter..=jitter),
                );
                ps.positions
                    .push(origin + Vec2::new(col as f32, row as f32) * spacing + offset);
                ps.velocities.push(Vec2::ZERO);
            }
        }
        rows * cols
    }

    pub fn particle_count(&self, system: ParticleSystemId) -> usize {
        self.particle_systems
            .get(system.0 as usize)
            .and_then(Option::as_ref)
            .map_or(0, |ps| ps.positions.len())
    }

    pub fn particle_positions(&self, system: ParticleSystemId) -> &[Vec2] {
        self.particle_systems
            .get(system.0 as usize)
            .and_then(Option::as_ref)
            .map(|ps| ps.positions.as_slice())
            .unwrap_or(&[])
    }

    pub fn destroy_body(&mut self, body: BodyId) {
        release_slot(&mut self.bodies, body.0, "body");
    }

    pub fn destroy_joint(&mut self, joint: JointId) {
        if let Some(Some(motor)) = self.joints.get(joint.0 as usize) {
            let driven = motor.body;
            if let Some(body) = self.body_mut(driven) {
                body.driven = false;
                body.angular_velocity = 0.0;
            }
        }
        release_slot(&mut self.joints, joint.0, "joint");
    }

    pub fn destroy_particle_system(&mut self, system: ParticleSystemId) {
        release_slot(&mut self.particle_systems, system.0, "particle system");
    }

    fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn drive_joints(&mut self, dt: f32) {
        for i in 0..self.joints.len() {
            let Some(motor) = self.joints[i] else {
                continue;
            };
            if self.body(motor.ground).is_none() {
                continue;
            }
            if let Some(body) = self.body_mut(motor.body) {
                let rotation = Vec2::from_angle(motor.motor_speed * dt);
                body.position = motor.anchor + rotation.rotate(body.position - motor.anchor);
                body.angle += motor.motor_speed * dt;
                body.angular_velocity = motor.motor_speed;
                body.velocity = motor.motor_speed * (body.position - motor.anchor).perp();
            }
        }
    }

    fn integrate_free_bodies(&mut self, dt: f32) {
        let gravity = self.gravity;
        for body in self.bodies.iter_mut().flatten() {
            if body.kind == BodyKind::Dynamic && !body.driven {
                body.velocity += gravity * dt;
                body.position += body.velocity * dt;
                body.angle += body.angular_velocity * dt;
            }
        }
    }

    fn step_particles(&mut self, dt: f32, substeps: u32) {
        let h = dt / substeps as f32;
        let gravity = self.gravity;
        let bodies = &self.bodies;

        for ps in self.particle_systems.iter_mut().flatten() {
            let keep = (1.0 - ps.damping * h).max(0.0);
            for _ in 0..substeps {
                for (p, v) in ps.positions.iter_mut().zip(ps.velocities.iter_mut()) {
                    *v = (*v + gravity * h) * keep;
                    *p += *v * h;
                    for body in bodies.iter().flatten() {
                        for fixture in &body.fixtures {
                            resolve_against_box(p, v, ps.radius, body, fixture);
                        }
                    }
                }
            }
        }
    }
}

/// Corners of a fixture in world space, counter-clockwise from bottom-left
fn fixture_corners(body: &Body, fixture: &BoxFixture) -> [Vec2; 4] {
    let body_rot = Vec2::from_angle(body.angle);
    let rot = Vec2::from_angle(body.angle + fixture.angle);
    let centre = body.position + body_rot.rotate(fixture.centre);
    let h = fixture.half_extents;
    [
        Vec2::new(-h.x, -h.y),
        Vec2::new(h.x, -h.y),
        Vec2::new(h.x, h.y),
        Vec2::new(-h.x, h.y),
    ]
    .map(|c| centre + rot.rotate(c))
}

/// Push a particle out of a box along the shallowest axis and reflect its
/// velocity relative to the body
fn resolve_against_box(p: &mut Vec2, v: &mut Vec2, radius: f32, body: &Body, fixture: &BoxFixture) {
    let body_rot = Vec2::from_angle(body.angle);
    let rot = Vec2::from_angle(body.angle + fixture.angle);
    let centre = body.position + body_rot.rotate(fixture.centre);
    let inv = Vec2::new(rot.x, -rot.y);

    let local = inv.rotate(*p - centre);
    let half = fixture.half_extents + Vec2::splat(radius);
    if local.x.abs() >= half.x || local.y.abs() >= half.y {
        return;
    }

    let dx = half.x - local.x.abs();
    let dy = half.y - local.y.abs();
    let (pushed, normal_local) = if dx < dy {
        let sign = if local.x >= 0.0 { 1.0 } else { -1.0 };
        (Vec2::new(sign * half.x, local.y), Vec2::new(sign, 0.0))
    } else {
        let sign = if local.y >= 0.0 { 1.0 } else { -1.0 };
        (Vec2::new(local.x, sign * half.y), Vec2::new(0.0, sign))
    };

    *p = centre + rot.rotate(pushed);
    let normal = rot.rotate(normal_local);
    let surface = body.point_velocity(*p);
    let relative = *v - surface;
    let vn = relative.dot(normal);
    if vn < 0.0 {
        *v = relative - (1.0 + RESTITUTION) * vn * normal + surface;
    }
}

fn release_slot<T>(slots: &mut [Option<T>], id: u32, what: &str) {
    match slots.get_mut(id as usize) {
        Some(slot) if slot.is_some() => *slot = None,
        _ => log::warn!("{} {} destroyed twice or never created", what, id),
    }
}

impl PhysicsWorld for SandboxWorld {
    fn step(&mut self, dt: f32, iterations: StepIterations) {
        if dt <= 0.0 {
            return;
        }
        self.drive_joints(dt);
        self.integrate_free_bodies(dt);
        self.step_particles(dt, iterations.particle.max(1));
    }

    fn debug_draw(&self, sink: &mut dyn DebugDraw) {
        let boxes = self.bodies.iter().flatten().map(|b| b.fixtures.len()).sum();
        let segments = self.joints.iter().flatten().count();
        let circles = self
            .particle_systems
            .iter()
            .flatten()
            .map(|ps| ps.positions.len())
            .sum();
        sink.reserve(boxes, segments, circles);

        for body in self.bodies.iter().flatten() {
            for fixture in &body.fixtures {
                sink.draw_box(fixture_corners(body, fixture));
            }
        }
        for motor in self.joints.iter().flatten() {
            if let Some(body) = self.body(motor.body) {
                sink.draw_segment(motor.anchor, body.position);
            }
        }
        for ps in self.particle_systems.iter().flatten() {
            if !ps.positions.is_empty() {
                sink.draw_circles(&ps.positions, ps.radius);
            }
        }
    }

    fn destroy(&mut self, handle: Handle) {
        match handle {
            Handle::Body(id) => self.destroy_body(id),
            Handle::Joint(id) => self.destroy_joint(id),
            Handle::ParticleSystem(id) => self.destroy_particle_system(id),
        }
    }

    fn live_handles(&self) -> usize {
        self.bodies.iter().flatten().count()
            + self.joints.iter().flatten().count()
            + self.particle_systems.iter().flatten().count()
    }
}
