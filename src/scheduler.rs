//! Frame scheduling
//!
//! `FrameScheduler` decides per display tick whether to advance the
//! simulation and by how much: the wall-clock interval since the last render,
//! clamped to `1 / frame_limit` seconds so a stalled or backgrounded tab
//! never feeds the integrator a huge step.
//!
//! `FrameDriver` abstracts the host's display-sync primitive
//! (`requestAnimationFrame` in browsers, `ManualFrames` natively and in
//! tests). `schedule` re-requests a frame after every tick until the loop
//! reports it was destroyed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::RenderError;

/// Whether to advance the simulation on a tick, given ms since last render
pub trait ShouldRun {
    fn should_run(&mut self, interval_ms: f64) -> bool;
}

/// Advance on every tick
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRun;

impl ShouldRun for AlwaysRun {
    fn should_run(&mut self, _interval_ms: f64) -> bool {
        true
    }
}

/// Advance at most `frame_limit` times per second on faster displays
#[derive(Debug, Clone, Copy)]
pub struct FrameCap {
    min_interval_ms: f64,
}

impl FrameCap {
    /// Display refresh jitter tolerated before a tick counts as early
    const SLACK_MS: f64 = 1.0;

    pub fn new(frame_limit: u32) -> Self {
        Self {
            min_interval_ms: 1000.0 / frame_limit.max(1) as f64 - Self::SLACK_MS,
        }
    }
}

impl ShouldRun for FrameCap {
    fn should_run(&mut self, interval_ms: f64) -> bool {
        interval_ms >= self.min_interval_ms
    }
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Advanced { step_seconds: f32 },
    Skipped,
    Stopped,
}

/// Work performed on ticks where the simulation advances
pub trait FrameHandler {
    fn advance(&mut self, step_seconds: f32);

    fn render(&mut self) -> Result<(), RenderError>;
}

pub struct FrameScheduler<P: ShouldRun = AlwaysRun> {
    last_render_ms: f64,
    max_step_seconds: f32,
    policy: P,
    destroyed: bool,
}

impl FrameScheduler<AlwaysRun> {
    pub fn new(start_ms: f64, frame_limit: u32) -> Self {
        Self::with_policy(start_ms, frame_limit, AlwaysRun)
    }
}

impl<P: ShouldRun> FrameScheduler<P> {
    pub fn with_policy(start_ms: f64, frame_limit: u32, policy: P) -> Self {
        Self {
            last_render_ms: start_ms,
            max_step_seconds: 1.0 / frame_limit.max(1) as f32,
            policy,
            destroyed: false,
        }
    }

    pub fn max_step_seconds(&self) -> f32 {
        self.max_step_seconds
    }

    pub fn last_render_ms(&self) -> f64 {
        self.last_render_ms
    }

    /// Seconds to advance for an interval, bounded by the step cap
    pub fn clamp_step(&self, interval_ms: f64) -> f32 {
        ((interval_ms.max(0.0) / 1000.0) as f32).min(self.max_step_seconds)
    }

    pub fn tick<H: FrameHandler + ?Sized>(
        &mut self,
        now_ms: f64,
        handler: &mut H,
    ) -> Result<Tick, RenderError> {
        if self.destroyed {
            return Ok(Tick::Stopped);
        }
        let interval_ms = now_ms - self.last_render_ms;
        if !self.policy.should_run(interval_ms) {
            return Ok(Tick::Skipped);
        }
        let step_seconds = self.clamp_step(interval_ms);
        handler.advance(step_seconds);
        self.last_render_ms = now_ms;
        handler.render()?;
        Ok(Tick::Advanced { step_seconds })
    }

    pub fn is_running(&self) -> bool {
        !self.destroyed
    }

    /// Stop future ticks. Idempotent.
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }
}

pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// The host's display-synchronisation primitive
pub trait FrameDriver {
    fn now_ms(&self) -> f64;

    /// Run `callback` with a timestamp on the next display frame
    fn request_frame(&self, callback: FrameCallback);
}

/// Something ticked once per display frame
pub trait FrameLoop {
    /// Handle one frame; return `false` once destroyed
    fn on_frame(&mut self, now_ms: f64) -> bool;
}

/// Request the next frame for `target`, and keep re-requesting after every
/// frame until `target` reports it was destroyed.
pub fn schedule<D, L>(driver: Rc<D>, target: Rc<RefCell<L>>)
where
    D: FrameDriver + 'static,
    L: FrameLoop + 'static,
{
    let next = Rc::clone(&driver);
    driver.request_frame(Box::new(move |now_ms| {
        let keep_going = target.borrow_mut().on_frame(now_ms);
        if keep_going {
            schedule(next, target);
        }
    }));
}

/// Frame driver pumped by hand: native loops and tests call `fire`
pub struct ManualFrames {
    now: Cell<f64>,
    pending: RefCell<Vec<FrameCallback>>,
}

impl ManualFrames {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Cell::new(start_ms),
            pending: RefCell::new(Vec::new()),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Advance the clock to `now_ms` and run the callbacks requested before
    /// this call. Returns how many ran.
    pub fn fire(&self, now_ms: f64) -> usize {
        self.now.set(now_ms);
        let callbacks = std::mem::take(&mut *self.pending.borrow_mut());
        let count = callbacks.len();
        for callback in callbacks {
            callback(now_ms);
        }
        count
    }
}

impl FrameDriver for ManualFrames {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn request_frame(&self, callback: FrameCallback) {
        self.pending.borrow_mut().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        steps: Vec<f32>,
        renders: usize,
    }

    impl FrameHandler for Recorder {
        fn advance(&mut self, step_seconds: f32) {
            self.steps.push(step_seconds);
        }

        fn render(&mut self) -> Result<(), RenderError> {
            self.renders += 1;
            Ok(())
        }
    }

    struct Never;

    impl ShouldRun for Never {
        fn should_run(&mut self, _interval_ms: f64) -> bool {
            false
        }
    }

    #[test]
    fn test_long_interval_is_clamped() {
        let mut scheduler = FrameScheduler::new(0.0, 60);
        let mut recorder = Recorder::default();
        let tick = scheduler.tick(500.0, &mut recorder).unwrap();
        assert_eq!(tick, Tick::Advanced { step_seconds: 1.0 / 60.0 });
        assert_eq!(recorder.steps, vec![1.0 / 60.0]);
        assert_eq!(recorder.renders, 1);
        assert_eq!(scheduler.last_render_ms(), 500.0);
    }

    #[test]
    fn test_short_interval_passes_through() {
        let mut scheduler = FrameScheduler::new(1000.0, 30);
        let mut recorder = Recorder::default();
        scheduler.tick(1010.0, &mut recorder).unwrap();
        assert!((recorder.steps[0] - 0.010).abs() < 1e-6);
    }

    #[test]
    fn test_skipped_tick_keeps_last_render_time() {
        let mut scheduler = FrameScheduler::with_policy(0.0, 60, Never);
        let mut recorder = Recorder::default();
        assert_eq!(scheduler.tick(16.0, &mut recorder).unwrap(), Tick::Skipped);
        assert_eq!(scheduler.last_render_ms(), 0.0);
        assert_eq!(recorder.renders, 0);
    }

    #[test]
    fn test_frame_cap_skips_early_ticks() {
        let mut scheduler = FrameScheduler::with_policy(0.0, 60, FrameCap::new(60));
        let mut recorder = Recorder::default();
        // 120 Hz display: every other tick advances
        for i in 1..=8 {
            scheduler.tick(i as f64 * 8.33, &mut recorder).unwrap();
        }
        assert_eq!(recorder.renders, 4);
    }

    #[test]
    fn test_destroyed_scheduler_stops() {
        let mut scheduler = FrameScheduler::new(0.0, 60);
        let mut recorder = Recorder::default();
        scheduler.destroy();
        scheduler.destroy();
        assert_eq!(scheduler.tick(16.0, &mut recorder).unwrap(), Tick::Stopped);
        assert!(recorder.steps.is_empty());
    }

    struct Looped<P: ShouldRun> {
        scheduler: FrameScheduler<P>,
        recorder: Recorder,
    }

    impl<P: ShouldRun> FrameLoop for Looped<P> {
        fn on_frame(&mut self, now_ms: f64) -> bool {
            let _ = self.scheduler.tick(now_ms, &mut self.recorder);
            self.scheduler.is_running()
        }
    }

    #[test]
    fn test_loop_reschedules_even_when_not_running_sim() {
        let frames = Rc::new(ManualFrames::new(0.0));
        let looped = Rc::new(RefCell::new(Looped {
            scheduler: FrameScheduler::with_policy(0.0, 60, Never),
            recorder: Recorder::default(),
        }));
        schedule(Rc::clone(&frames), Rc::clone(&looped));

        for i in 1..=10 {
            assert_eq!(frames.fire(i as f64 * 16.0), 1);
            assert_eq!(frames.pending(), 1);
        }
        assert_eq!(looped.borrow().recorder.renders, 0);
    }

    #[test]
    fn test_loop_stops_after_destroy() {
        let frames = Rc::new(ManualFrames::new(0.0));
        let looped = Rc::new(RefCell::new(Looped {
            scheduler: FrameScheduler::new(0.0, 60),
            recorder: Recorder::default(),
        }));
        schedule(Rc::clone(&frames), Rc::clone(&looped));
        frames.fire(16.0);
        looped.borrow_mut().scheduler.destroy();
        // The already-requested frame still runs, then nothing is requested
        assert_eq!(frames.fire(32.0), 1);
        assert_eq!(frames.pending(), 0);
        assert_eq!(looped.borrow().recorder.renders, 1);
    }
}
