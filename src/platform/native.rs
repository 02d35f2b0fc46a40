//! Native host: std threads stand in for web workers
//!
//! The "canvas" is any `FrameRenderer + Send`. Transferring it moves the
//! boxed renderer through the worker's channel, after which this side no
//! longer holds it. Worker messages still go over the wire as JSON.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{LocalHost, RendererReady, WorkerHost};
use crate::error::{ProtocolError, RenderError, StrategyError};
use crate::protocol::{Envelope, EventHandler, FromWorker, WorkerEvent, WorkerPort};
use crate::renderer::FrameRenderer;
use crate::runtime::{Reply, WorkerRuntime};
use crate::scheduler::ManualFrames;
use crate::settings::Settings;

/// A drawable surface that can move to another thread
pub type NativeSurface = Box<dyn FrameRenderer + Send>;

type Inbound = (String, Option<NativeSurface>);

/// Main-side handle to a worker thread
pub struct ThreadPort {
    sender: Sender<Inbound>,
    terminated: Arc<AtomicBool>,
}

impl WorkerPort for ThreadPort {
    type Surface = NativeSurface;

    fn post(&mut self, envelope: Envelope<NativeSurface>) -> Result<(), ProtocolError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(ProtocolError::Disconnected);
        }
        let json = envelope.to_json();
        self.sender
            .send((json, envelope.transfer))
            .map_err(|_| ProtocolError::Disconnected)
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::Release);
    }
}

pub struct ThreadHost {
    surface: Option<NativeSurface>,
    transfer_supported: bool,
    frames: Rc<ManualFrames>,
    started: Instant,
    frame_interval: Duration,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadHost {
    pub fn new(surface: NativeSurface) -> Self {
        Self {
            surface: Some(surface),
            transfer_supported: true,
            frames: Rc::new(ManualFrames::new(0.0)),
            started: Instant::now(),
            frame_interval: Duration::from_millis(16),
            threads: Vec::new(),
        }
    }

    /// A host whose canvas cannot leave the current thread
    pub fn without_surface_transfer(mut self) -> Self {
        self.transfer_supported = false;
        self
    }

    /// Sleep between worker frames (display refresh stand-in)
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Run the frames requested on this thread. Returns how many ran.
    pub fn pump(&self) -> usize {
        self.frames.fire(self.now_ms())
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Wait for every spawned thread. Call after the strategy is destroyed.
    pub fn join(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                log::warn!("worker thread panicked outside the frame loop");
            }
        }
    }
}

impl LocalHost for ThreadHost {
    type Renderer = NativeSurface;
    type Frames = ManualFrames;

    fn frames(&self) -> Rc<ManualFrames> {
        Rc::clone(&self.frames)
    }

    fn create_renderer(&mut self, _settings: &Settings, ready: RendererReady<NativeSurface>) {
        match self.surface.take() {
            Some(surface) => ready(Ok(surface)),
            None => ready(Err(RenderError::Surface("canvas already transferred".into()))),
        }
    }
}

impl WorkerHost for ThreadHost {
    type Port = ThreadPort;
    type Events = Receiver<String>;

    fn supports_surface_transfer(&self) -> bool {
        self.transfer_supported
    }

    fn take_surface(&mut self) -> Option<NativeSurface> {
        self.surface.take()
    }

    fn spawn_worker(&mut self, settings: &Settings) -> Result<(ThreadPort, Receiver<String>), StrategyError> {
        let (sender, inbox) = mpsc::channel::<Inbound>();
        let (outbox, events) = mpsc::channel::<String>();
        let terminated = Arc::new(AtomicBool::new(false));

        let worker_terminated = Arc::clone(&terminated);
        let settings = settings.clone();
        let interval = self.frame_interval;
        let handle = thread::Builder::new()
            .name("sim-worker".into())
            .spawn(move || worker_thread(settings, inbox, outbox, worker_terminated, interval))
            .map_err(|e| StrategyError::Spawn(e.to_string()))?;
        self.threads.push(handle);

        Ok((ThreadPort { sender, terminated }, events))
    }

    fn listen(&mut self, events: Receiver<String>, mut handler: Box<dyn EventHandler>) {
        let spawned = thread::Builder::new()
            .name("worker-events".into())
            .spawn(move || {
                for json in events {
                    handler(WorkerEvent::from_json(&json));
                }
                log::debug!("worker event channel closed");
            });
        match spawned {
            Ok(handle) => self.threads.push(handle),
            Err(e) => log::error!("cannot listen to worker: {}", e),
        }
    }
}

fn send(outbox: &Sender<String>, message: &FromWorker) {
    match serde_json::to_string(message) {
        Ok(json) => {
            // The main side may already be gone
            let _ = outbox.send(json);
        }
        Err(e) => log::error!("cannot encode {}: {}", message.kind(), e),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

fn worker_thread(
    settings: Settings,
    inbox: Receiver<Inbound>,
    outbox: Sender<String>,
    terminated: Arc<AtomicBool>,
    interval: Duration,
) {
    let fatal_outbox = outbox.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        run_worker(settings, inbox, outbox, &terminated, interval)
    }));
    if let Err(payload) = result {
        send(
            &fatal_outbox,
            &FromWorker::FatalError {
                message: panic_message(payload.as_ref()),
            },
        );
    }
}

fn run_worker(
    settings: Settings,
    inbox: Receiver<Inbound>,
    outbox: Sender<String>,
    terminated: &AtomicBool,
    interval: Duration,
) {
    let started = Instant::now();
    let frames = Rc::new(ManualFrames::new(0.0));
    let reply: Reply = Rc::new(move |message: FromWorker| send(&outbox, &message));
    let mut worker = WorkerRuntime::<NativeSurface>::new(settings, reply);
    worker.ready();

    while !terminated.load(Ordering::Acquire) {
        loop {
            match inbox.try_recv() {
                Ok((json, transfer)) => match worker.receive(&json, transfer) {
                    Ok(Some(surface)) => worker.attach(surface, Rc::clone(&frames)),
                    Ok(None) => {}
                    Err(e) => worker.diagnose(&e),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::debug!("main thread hung up");
                    return;
                }
            }
        }
        frames.fire(started.elapsed().as_secs_f64() * 1000.0);
        if worker.is_destroyed() {
            return;
        }
        thread::sleep(interval);
    }
    log::info!("worker stopped");
}
