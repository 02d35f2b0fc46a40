//! Both strategies on std threads with the headless renderer

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use offscreen_sim::platform::WorkerHost;
use offscreen_sim::platform::native::ThreadHost;
use offscreen_sim::renderer::{RenderStats, StatsRenderer};
use offscreen_sim::strategy::{self, Offloaded};
use offscreen_sim::{Demo, ExecutionStrategy, ExecutionStrategyKind, Settings, StartOptions, StrategyError};

const TIMEOUT: Duration = Duration::from_secs(10);

fn wait_until(stats: &Arc<Mutex<RenderStats>>, done: impl Fn(&RenderStats) -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < TIMEOUT {
        if done(&stats.lock().unwrap()) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn options(kind: ExecutionStrategyKind, fatals: &Arc<Mutex<Vec<String>>>) -> StartOptions {
    let sink = Arc::clone(fatals);
    let mut settings = Settings::default();
    settings.strategy = kind;
    StartOptions {
        settings,
        set_fatal_error: Box::new(move |message: &str| sink.lock().unwrap().push(message.to_string())),
    }
}

#[test]
fn test_worker_renders_after_handshake() {
    let renderer = StatsRenderer::new(640, 480);
    let stats = renderer.stats_handle();
    let mut host = ThreadHost::new(Box::new(renderer)).with_frame_interval(Duration::from_millis(2));
    let fatals = Arc::new(Mutex::new(Vec::new()));

    let mut offloaded =
        Offloaded::start(&mut host, options(ExecutionStrategyKind::OffloadToWorker, &fatals)).unwrap();

    assert!(wait_until(&stats, |s| s.frames >= 5 && s.last_circles == 36 * 36));

    offloaded.change_demo(Demo::DamBreak);
    assert!(wait_until(&stats, |s| s.last_circles > 0 && s.last_circles != 36 * 36));

    offloaded.destroy();
    offloaded.destroy();
    host.join();
    assert!(fatals.lock().unwrap().is_empty());
}

#[test]
fn test_in_process_on_native_host() {
    let renderer = StatsRenderer::new(320, 240);
    let stats = renderer.stats_handle();
    let mut host = ThreadHost::new(Box::new(renderer));
    let fatals = Arc::new(Mutex::new(Vec::new()));

    let mut strategy =
        strategy::start(&mut host, options(ExecutionStrategyKind::RunOnMainThread, &fatals)).unwrap();
    for _ in 0..10 {
        thread::sleep(Duration::from_millis(1));
        assert_eq!(host.pump(), 1);
    }
    assert_eq!(stats.lock().unwrap().frames, 10);
    // Transferring is no longer possible: the local renderer owns the canvas
    assert!(host.take_surface().is_none());

    strategy.destroy();
    host.pump();
    assert_eq!(host.pump(), 0);
    assert!(fatals.lock().unwrap().is_empty());
}

#[test]
fn test_host_without_transfer_refuses_offload() {
    let mut host = ThreadHost::new(Box::new(StatsRenderer::new(1, 1))).without_surface_transfer();
    let fatals = Arc::new(Mutex::new(Vec::new()));
    let result = strategy::start(&mut host, options(ExecutionStrategyKind::OffloadToWorker, &fatals));
    assert!(matches!(result, Err(StrategyError::UnsupportedCapability(_))));
    host.join();
}
