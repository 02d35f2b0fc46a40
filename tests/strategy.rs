//! Strategy behaviour against a host that records every message

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use offscreen_sim::error::{ProtocolError, RenderError, StrategyError};
use offscreen_sim::platform::{LocalHost, RendererReady, WorkerHost};
use offscreen_sim::protocol::{
    Envelope, EventHandler, FromWorker, LinkState, LogLevel, WorkerEvent, WorkerPort,
};
use offscreen_sim::renderer::{RenderStats, StatsRenderer};
use offscreen_sim::scheduler::ManualFrames;
use offscreen_sim::strategy::{self, InProcess, Offloaded};
use offscreen_sim::{Demo, ExecutionStrategy, ExecutionStrategyKind, Settings, StartOptions};

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    json: String,
    transferred: bool,
}

#[derive(Clone, Default)]
struct Wire {
    sent: Arc<Mutex<Vec<Sent>>>,
    terminated: Arc<Mutex<usize>>,
}

impl Wire {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn terminated(&self) -> usize {
        *self.terminated.lock().unwrap()
    }
}

struct RecordingPort(Wire);

impl WorkerPort for RecordingPort {
    type Surface = &'static str;

    fn post(&mut self, envelope: Envelope<&'static str>) -> Result<(), ProtocolError> {
        self.0.sent.lock().unwrap().push(Sent {
            json: envelope.to_json(),
            transferred: envelope.transfer.is_some(),
        });
        Ok(())
    }

    fn terminate(&mut self) {
        *self.0.terminated.lock().unwrap() += 1;
    }
}

struct RecordingHost {
    wire: Wire,
    transfer_supported: bool,
    spawn_fails: bool,
    surface: Option<&'static str>,
    spawned: usize,
    handler: Option<Box<dyn EventHandler>>,
    frames: Rc<ManualFrames>,
    renderer: Option<StatsRenderer>,
}

impl RecordingHost {
    fn new() -> Self {
        Self {
            wire: Wire::default(),
            transfer_supported: true,
            spawn_fails: false,
            surface: Some("canvas"),
            spawned: 0,
            handler: None,
            frames: Rc::new(ManualFrames::new(0.0)),
            renderer: Some(StatsRenderer::new(400, 400)),
        }
    }

    fn emit(&mut self, event: WorkerEvent) {
        let handler = self.handler.as_mut().expect("not listening");
        handler(event);
    }

    fn emit_json(&mut self, json: &str) {
        self.emit(WorkerEvent::from_json(json));
    }
}

impl LocalHost for RecordingHost {
    type Renderer = StatsRenderer;
    type Frames = ManualFrames;

    fn frames(&self) -> Rc<ManualFrames> {
        Rc::clone(&self.frames)
    }

    fn create_renderer(&mut self, _settings: &Settings, ready: RendererReady<StatsRenderer>) {
        match self.renderer.take() {
            Some(renderer) => ready(Ok(renderer)),
            None => ready(Err(RenderError::Surface("taken".into()))),
        }
    }
}

impl WorkerHost for RecordingHost {
    type Port = RecordingPort;
    type Events = ();

    fn supports_surface_transfer(&self) -> bool {
        self.transfer_supported
    }

    fn take_surface(&mut self) -> Option<&'static str> {
        self.surface.take()
    }

    fn spawn_worker(&mut self, _settings: &Settings) -> Result<(RecordingPort, ()), StrategyError> {
        if self.spawn_fails {
            return Err(StrategyError::Spawn("worker script not found".into()));
        }
        self.spawned += 1;
        Ok((RecordingPort(self.wire.clone()), ()))
    }

    fn listen(&mut self, _events: (), handler: Box<dyn EventHandler>) {
        self.handler = Some(handler);
    }
}

fn fatal_log() -> (Arc<Mutex<Vec<String>>>, StartOptions) {
    let fatals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fatals);
    let options = StartOptions {
        settings: Settings::default(),
        set_fatal_error: Box::new(move |message: &str| sink.lock().unwrap().push(message.to_string())),
    };
    (fatals, options)
}

const READY: &str = r#"{"type":"ready"}"#;

#[test]
fn test_end_to_end_wave_machine_handshake() {
    let mut host = RecordingHost::new();
    let (fatals, options) = fatal_log();
    let strategy = strategy::start(&mut host, options).unwrap();
    assert_eq!(strategy.kind(), ExecutionStrategyKind::OffloadToWorker);
    assert_eq!(host.spawned, 1);
    assert!(host.wire.sent().is_empty());

    host.emit_json(READY);

    let sent = host.wire.sent();
    assert_eq!(
        sent,
        vec![
            Sent {
                json: r#"{"type":"offscreenCanvas"}"#.into(),
                transferred: true,
            },
            Sent {
                json: r#"{"type":"switchDemo","demo":"waveMachine","seq":1}"#.into(),
                transferred: false,
            },
        ]
    );
    assert!(fatals.lock().unwrap().is_empty());
}

#[test]
fn test_no_canvas_or_switch_before_ready() {
    let mut host = RecordingHost::new();
    let (_, options) = fatal_log();
    let mut offloaded = Offloaded::start(&mut host, options).unwrap();
    assert_eq!(offloaded.state(), LinkState::AwaitingReady);

    offloaded.change_demo(Demo::DamBreak);
    host.emit_json(r#"{"type":"log","level":"info","message":"booting"}"#);
    assert!(host.wire.sent().is_empty());

    host.emit_json(READY);
    offloaded.change_demo(Demo::WaveMachine);

    let sent: Vec<String> = host.wire.sent().into_iter().map(|s| s.json).collect();
    assert_eq!(sent[0], r#"{"type":"offscreenCanvas"}"#);
    assert_eq!(sent[1], r#"{"type":"switchDemo","demo":"damBreak","seq":1}"#);
    assert_eq!(sent[2], r#"{"type":"switchDemo","demo":"waveMachine","seq":2}"#);
    assert_eq!(offloaded.state(), LinkState::Running);
}

#[test]
fn test_unsupported_capability_fails_before_spawn() {
    let mut host = RecordingHost::new();
    host.transfer_supported = false;
    let (_, options) = fatal_log();
    let result = strategy::start(&mut host, options);
    assert!(matches!(result, Err(StrategyError::UnsupportedCapability(_))));
    assert_eq!(host.spawned, 0);
    assert_eq!(host.surface, Some("canvas"));
}

#[test]
fn test_failed_spawn_keeps_canvas_for_fallback() {
    let mut host = RecordingHost::new();
    host.spawn_fails = true;
    let (fatals, options) = fatal_log();
    let result = strategy::start(&mut host, options);
    assert!(matches!(result, Err(StrategyError::Spawn(_))));
    assert_eq!(host.surface, Some("canvas"));
    assert!(host.wire.sent().is_empty());

    let (_, mut fallback) = fatal_log();
    fallback.settings.strategy = ExecutionStrategyKind::RunOnMainThread;
    let stats = host.renderer.as_ref().unwrap().stats_handle();
    let _strategy = strategy::start(&mut host, fallback).unwrap();
    host.frames.fire(16.0);
    assert_eq!(stats.lock().unwrap().frames, 1);
    assert!(fatals.lock().unwrap().is_empty());
}

#[test]
fn test_destroy_from_fatal_callback() {
    let mut host = RecordingHost::new();
    let slot: Arc<Mutex<Option<Offloaded<RecordingPort>>>> = Arc::new(Mutex::new(None));
    let reported = Arc::new(Mutex::new(Vec::new()));
    let options = StartOptions {
        settings: Settings::default(),
        set_fatal_error: {
            let slot = Arc::clone(&slot);
            let reported = Arc::clone(&reported);
            Box::new(move |message: &str| {
                reported.lock().unwrap().push(message.to_string());
                if let Some(offloaded) = slot.lock().unwrap().as_mut() {
                    offloaded.destroy();
                    assert_eq!(offloaded.state(), LinkState::Terminated);
                }
            })
        },
    };
    let offloaded = Offloaded::start(&mut host, options).unwrap();
    *slot.lock().unwrap() = Some(offloaded);
    host.emit_json(READY);

    host.emit(WorkerEvent::Error("boom".into()));

    assert_eq!(*reported.lock().unwrap(), vec!["boom".to_string()]);
    assert_eq!(host.wire.terminated(), 1);
    let state = slot.lock().unwrap().as_ref().map(|o| o.state());
    assert_eq!(state, Some(LinkState::Terminated));
}

#[test]
fn test_destroy_twice_sends_nothing() {
    let mut host = RecordingHost::new();
    let (_, options) = fatal_log();
    let mut strategy = strategy::start(&mut host, options).unwrap();
    host.emit_json(READY);
    let before = host.wire.sent().len();

    strategy.destroy();
    strategy.destroy();
    strategy.change_demo(Demo::DamBreak);

    assert_eq!(host.wire.sent().len(), before);
    assert_eq!(host.wire.terminated(), 1);
}

#[test]
fn test_malformed_messages_are_not_fatal() {
    let mut host = RecordingHost::new();
    let (fatals, options) = fatal_log();
    let offloaded = Offloaded::start(&mut host, options).unwrap();

    host.emit_json("{\"type\":\"teleport\"}");
    host.emit(WorkerEvent::MessageError("clone failed".into()));

    assert_eq!(offloaded.state(), LinkState::AwaitingReady);
    assert!(fatals.lock().unwrap().is_empty());
    assert!(host.wire.sent().is_empty());
}

#[test]
fn test_worker_failure_reported_once() {
    let mut host = RecordingHost::new();
    let (fatals, options) = fatal_log();
    let _strategy = strategy::start(&mut host, options).unwrap();
    host.emit_json(READY);

    host.emit_json(r#"{"type":"fatalError","message":"device lost"}"#);
    host.emit(WorkerEvent::Error("uncaught".into()));

    assert_eq!(*fatals.lock().unwrap(), vec!["device lost".to_string()]);
}

#[test]
fn test_in_process_renders_and_switches_synchronously() {
    let mut host = RecordingHost::new();
    let stats = host.renderer.as_ref().unwrap().stats_handle();
    let (fatals, mut options) = fatal_log();
    options.settings.strategy = ExecutionStrategyKind::RunOnMainThread;

    let mut in_process = InProcess::start(&mut host, options);
    for i in 1..=5 {
        assert_eq!(host.frames.fire(i as f64 * 16.0), 1);
    }
    let frames = |stats: &Arc<Mutex<RenderStats>>| stats.lock().unwrap().frames;
    assert_eq!(frames(&stats), 5);
    assert_eq!(stats.lock().unwrap().last_circles, 36 * 36);

    in_process.change_demo(Demo::DamBreak);
    let demo = in_process.runtime().borrow().sim().and_then(|sim| sim.demo());
    assert_eq!(demo, Some(Demo::DamBreak));

    in_process.destroy();
    in_process.destroy();
    host.frames.fire(200.0);
    assert_eq!(host.frames.pending(), 0);
    assert_eq!(frames(&stats), 5);
    assert!(fatals.lock().unwrap().is_empty());
    assert!(host.wire.sent().is_empty());
}

#[test]
fn test_in_process_reports_missing_renderer() {
    let mut host = RecordingHost::new();
    host.renderer = None;
    let (fatals, mut options) = fatal_log();
    options.settings.strategy = ExecutionStrategyKind::RunOnMainThread;

    let strategy = strategy::start(&mut host, options).unwrap();
    assert_eq!(strategy.kind(), ExecutionStrategyKind::RunOnMainThread);
    assert_eq!(fatals.lock().unwrap().len(), 1);
    assert_eq!(host.frames.pending(), 0);
}

#[test]
fn test_worker_log_marks_link_running() {
    let mut host = RecordingHost::new();
    let (_, options) = fatal_log();
    let offloaded = Offloaded::start(&mut host, options).unwrap();
    host.emit_json(READY);
    assert_eq!(offloaded.state(), LinkState::CanvasTransferred);
    host.emit(WorkerEvent::Message(FromWorker::log(
        LogLevel::Info,
        "render loop started",
    )));
    assert_eq!(offloaded.state(), LinkState::Running);
    // A late second ready changes nothing
    host.emit_json(READY);
    assert_eq!(host.wire.sent().len(), 2);
}
