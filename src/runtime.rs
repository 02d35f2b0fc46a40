//! Render loops
//!
//! `SimulationLoop` owns everything one thread needs to run a scene: the
//! scene, a `DrawBuffer`, a `QuadIndexBuffer`, a scheduler and a renderer.
//! Each instance owns its own buffers, so the in-process and worker loops
//! never share geometry storage.
//!
//! `Runtime` wraps a loop that may not exist yet (GPU setup is async) and
//! applies queued demo switches. `WorkerRuntime` is the worker end of the
//! transport.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::QuadIndexBuffer;
use crate::draw::DrawBuffer;
use crate::error::{ProtocolError, RenderError};
use crate::protocol::{Envelope, FromWorker, LogLevel, ToWorker};
use crate::renderer::{Camera, FrameRenderer};
use crate::scheduler::{
    AlwaysRun, FrameDriver, FrameHandler, FrameLoop, FrameScheduler, ShouldRun, Tick, schedule,
};
use crate::settings::Settings;
use crate::sim::{Demo, Scene, StepIterations};

struct FrameState<R> {
    renderer: R,
    scene: Option<Box<dyn Scene>>,
    draw: DrawBuffer,
    indices: QuadIndexBuffer,
    iterations: StepIterations,
}

impl<R: FrameRenderer> FrameState<R> {
    fn draw_frame(&mut self) -> Result<(), RenderError> {
        let Some(scene) = &self.scene else {
            return Ok(());
        };
        self.indices.fill(self.draw.boxes.len())?;
        let (width, height) = self.renderer.surface_size();
        let camera = Camera::fit(&scene.view(), width, height);
        let geometry = self.draw.geometry(&self.indices);
        self.renderer.render(&camera, geometry)
    }
}

impl<R: FrameRenderer> FrameHandler for FrameState<R> {
    fn advance(&mut self, step_seconds: f32) {
        if let Some(scene) = self.scene.as_mut() {
            scene.step(step_seconds, self.iterations);
            scene.debug_draw(&mut self.draw);
        }
    }

    fn render(&mut self) -> Result<(), RenderError> {
        let result = self.draw_frame();
        // Consumed or not, this frame's geometry is gone
        self.draw.flush();
        self.indices.reset();
        result
    }
}

pub struct SimulationLoop<R, P: ShouldRun = AlwaysRun> {
    scheduler: FrameScheduler<P>,
    frame: FrameState<R>,
}

impl<R: FrameRenderer> SimulationLoop<R> {
    pub fn new(renderer: R, settings: &Settings, start_ms: f64) -> Self {
        Self::with_policy(renderer, settings, start_ms, AlwaysRun)
    }
}

impl<R: FrameRenderer, P: ShouldRun> SimulationLoop<R, P> {
    pub fn with_policy(renderer: R, settings: &Settings, start_ms: f64, policy: P) -> Self {
        Self {
            scheduler: FrameScheduler::with_policy(start_ms, settings.frame_limit, policy),
            frame: FrameState {
                renderer,
                scene: None,
                draw: DrawBuffer::new(),
                indices: QuadIndexBuffer::new(),
                iterations: settings.iterations,
            },
        }
    }

    /// Tear down the current scene, then build `demo`
    pub fn change_demo(&mut self, demo: Demo) {
        if let Some(old) = self.frame.scene.take() {
            log::info!("tearing down {}", old.demo().as_str());
        }
        self.frame.scene = Some(demo.build());
    }

    pub fn demo(&self) -> Option<Demo> {
        self.frame.scene.as_ref().map(|scene| scene.demo())
    }

    pub fn tick(&mut self, now_ms: f64) -> Result<Tick, RenderError> {
        self.scheduler.tick(now_ms, &mut self.frame)
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Backing-store replacements in the draw and index buffers so far
    pub fn buffer_reallocations(&self) -> usize {
        self.frame.draw.reallocations() + self.frame.indices.reallocations()
    }

    /// Stop ticking and release the scene. Idempotent.
    pub fn destroy(&mut self) {
        self.scheduler.destroy();
        self.frame.scene = None;
    }
}

/// A render loop plus its pending demo switches
pub struct Runtime<R> {
    settings: Settings,
    sim: Option<SimulationLoop<R>>,
    pending: Option<(u64, Demo)>,
    applied_seq: u64,
    on_fatal: Option<Box<dyn FnMut(&str)>>,
    destroyed: bool,
}

impl<R: FrameRenderer> Runtime<R> {
    pub fn new(settings: Settings, on_fatal: Box<dyn FnMut(&str)>) -> Self {
        Self {
            settings,
            sim: None,
            pending: None,
            applied_seq: 0,
            on_fatal: Some(on_fatal),
            destroyed: false,
        }
    }

    /// Start drawing with `renderer`; a demo queued earlier is built now
    pub fn attach_renderer(&mut self, renderer: R, now_ms: f64) {
        if self.destroyed {
            log::debug!("renderer arrived after destroy, dropping it");
            return;
        }
        self.sim = Some(SimulationLoop::new(renderer, &self.settings, now_ms));
        self.apply_pending();
    }

    pub fn has_renderer(&self) -> bool {
        self.sim.is_some()
    }

    pub fn sim(&self) -> Option<&SimulationLoop<R>> {
        self.sim.as_ref()
    }

    /// Queue a switch for the next frame. Newest `seq` wins; anything not
    /// newer than what is applied or queued is dropped.
    pub fn queue_switch(&mut self, seq: u64, demo: Demo) {
        let newest = self.pending.map_or(self.applied_seq, |(pending, _)| pending);
        if seq <= newest {
            log::debug!(
                "dropping stale switch to {} (seq {} <= {})",
                demo.as_str(),
                seq,
                newest
            );
            return;
        }
        if let Some((superseded, old)) = self.pending.replace((seq, demo)) {
            log::debug!("switch to {} (seq {}) superseded", old.as_str(), superseded);
        }
    }

    /// Switch immediately if a loop is running, otherwise on attach
    pub fn switch_now(&mut self, demo: Demo) {
        let seq = self.pending.map_or(self.applied_seq, |(pending, _)| pending) + 1;
        self.queue_switch(seq, demo);
        self.apply_pending();
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    fn apply_pending(&mut self) {
        let Some(sim) = self.sim.as_mut() else {
            return;
        };
        if let Some((seq, demo)) = self.pending.take() {
            log::info!("switching to {} (seq {})", demo.as_str(), seq);
            sim.change_demo(demo);
            self.applied_seq = seq;
        }
    }

    /// Report `message` to the fatal callback (first time only) and stop
    pub fn fail(&mut self, message: &str) {
        log::error!("fatal: {}", message);
        if let Some(mut on_fatal) = self.on_fatal.take() {
            on_fatal(message);
        }
        self.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Stop the loop and drop scene and renderer. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.pending = None;
        if let Some(mut sim) = self.sim.take() {
            sim.destroy();
        }
    }
}

impl<R: FrameRenderer> FrameLoop for Runtime<R> {
    fn on_frame(&mut self, now_ms: f64) -> bool {
        if self.destroyed {
            return false;
        }
        self.apply_pending();
        let Some(sim) = self.sim.as_mut() else {
            return true;
        };
        match sim.tick(now_ms) {
            Ok(_) => sim.is_running(),
            Err(e) => {
                self.fail(&e.to_string());
                false
            }
        }
    }
}

/// Sends a message back to the main thread
pub type Reply = Rc<dyn Fn(FromWorker)>;

/// Worker end of the transport: decodes main-thread messages and drives a
/// `Runtime` once the canvas has arrived.
pub struct WorkerRuntime<R> {
    runtime: Rc<RefCell<Runtime<R>>>,
    reply: Reply,
    canvas_received: bool,
}

impl<R: FrameRenderer + 'static> WorkerRuntime<R> {
    pub fn new(settings: Settings, reply: Reply) -> Self {
        let fatal_reply = Rc::clone(&reply);
        let on_fatal = Box::new(move |message: &str| {
            fatal_reply(FromWorker::FatalError {
                message: message.to_string(),
            })
        });
        Self {
            runtime: Rc::new(RefCell::new(Runtime::new(settings, on_fatal))),
            reply,
            canvas_received: false,
        }
    }

    pub fn runtime(&self) -> &Rc<RefCell<Runtime<R>>> {
        &self.runtime
    }

    /// Announce that the canvas can be transferred
    pub fn ready(&self) {
        (self.reply)(FromWorker::Ready);
    }

    /// Handle one main-thread message. Returns the transferred surface when
    /// the message was the canvas; the caller builds a renderer from it and
    /// calls `attach`.
    pub fn receive<S>(&mut self, json: &str, transfer: Option<S>) -> Result<Option<S>, ProtocolError> {
        let envelope = Envelope::decode(json, transfer)?;
        match envelope.message {
            ToWorker::OffscreenCanvas => {
                if self.canvas_received {
                    return Err(ProtocolError::UnexpectedMessage {
                        state: "CanvasTransferred",
                        message: "offscreenCanvas",
                    });
                }
                self.canvas_received = true;
                log::info!("canvas received");
                Ok(envelope.transfer)
            }
            ToWorker::SwitchDemo { demo, seq } => {
                self.runtime.borrow_mut().queue_switch(seq, demo);
                Ok(None)
            }
        }
    }

    /// Start the render loop on `renderer`
    pub fn attach<D: FrameDriver + 'static>(&self, renderer: R, frames: Rc<D>) {
        let now_ms = frames.now_ms();
        self.runtime.borrow_mut().attach_renderer(renderer, now_ms);
        schedule(frames, Rc::clone(&self.runtime));
        (self.reply)(FromWorker::log(LogLevel::Info, "worker render loop started"));
    }

    /// Send a non-fatal diagnostic for a message that could not be handled
    pub fn diagnose(&self, error: &ProtocolError) {
        log::warn!("{}", error);
        (self.reply)(FromWorker::log(LogLevel::Warn, error.to_string()));
    }

    pub fn fail(&self, message: &str) {
        self.runtime.borrow_mut().fail(message);
    }

    pub fn is_destroyed(&self) -> bool {
        self.runtime.borrow().is_destroyed()
    }
}
