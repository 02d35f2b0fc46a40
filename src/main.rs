//! Offscreen Sim entry point
//!
//! Web: starts the configured strategy on the page canvas.
//! Native: runs the same pipeline headless on std threads and logs what
//! each frame would draw.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() -> Result<(), JsValue> {
    offscreen_sim::platform::web::start_page()
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use clap::Parser;
    use offscreen_sim::{Demo, ExecutionStrategyKind, Settings};

    fn parse_strategy(value: &str) -> Result<ExecutionStrategyKind, String> {
        ExecutionStrategyKind::from_str(value).ok_or_else(|| format!("expected main or worker, got '{value}'"))
    }

    fn parse_demo(value: &str) -> Result<Demo, String> {
        Demo::from_str(value).ok_or_else(|| {
            let names: Vec<&str> = Demo::ALL.iter().map(|d| d.as_str()).collect();
            format!("expected one of {}, got '{value}'", names.join(", "))
        })
    }

    #[derive(Debug, Parser)]
    #[command(about = "Run the simulation headless and log what each frame would draw")]
    pub struct Args {
        /// Where the simulation runs: `main` or `worker` (a second thread).
        #[arg(long, value_parser = parse_strategy)]
        pub strategy: Option<ExecutionStrategyKind>,

        /// Demo to start with.
        #[arg(long, value_parser = parse_demo)]
        pub demo: Option<Demo>,

        /// Stop after this many rendered frames.
        #[arg(long, default_value_t = 300)]
        pub frames: u64,

        /// Frame-rate cap; also bounds the simulation step.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        pub frame_limit: Option<u32>,
    }

    impl Args {
        /// Stored settings with the given flags applied
        pub fn settings(&self) -> Settings {
            let mut settings = Settings::load();
            if let Some(strategy) = self.strategy {
                settings.strategy = strategy;
            }
            if let Some(demo) = self.demo {
                settings.initial_demo = demo;
            }
            if let Some(limit) = self.frame_limit {
                settings.frame_limit = limit;
            }
            settings
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_flags_override_defaults() {
            let args = Args::try_parse_from([
                "offscreen-sim",
                "--strategy",
                "main",
                "--demo",
                "damBreak",
                "--frame-limit",
                "30",
            ])
            .unwrap();
            let settings = args.settings();
            assert_eq!(settings.strategy, ExecutionStrategyKind::RunOnMainThread);
            assert_eq!(settings.initial_demo, Demo::DamBreak);
            assert_eq!(settings.frame_limit, 30);
            assert_eq!(args.frames, 300);
        }

        #[test]
        fn test_no_flags_keeps_defaults() {
            let args = Args::try_parse_from(["offscreen-sim"]).unwrap();
            assert_eq!(args.settings(), Settings::default());
        }

        #[test]
        fn test_rejects_bad_values() {
            assert!(Args::try_parse_from(["offscreen-sim", "--demo", "pong"]).is_err());
            assert!(Args::try_parse_from(["offscreen-sim", "--frame-limit", "0"]).is_err());
            assert!(Args::try_parse_from(["offscreen-sim", "stray"]).is_err());
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use clap::Parser;
    use offscreen_sim::platform::native::ThreadHost;
    use offscreen_sim::renderer::StatsRenderer;
    use offscreen_sim::{ExecutionStrategyKind, StartOptions, consts, strategy};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    env_logger::init();

    let args = cli::Args::parse();
    let settings = args.settings();
    let frames = args.frames;
    log::info!("Offscreen Sim (native) starting...");

    let (width, height) = consts::NATIVE_SURFACE_SIZE;
    let renderer = StatsRenderer::new(width, height).with_log_every(60);
    let stats = renderer.stats_handle();
    let mut host = ThreadHost::new(Box::new(renderer))
        .with_frame_interval(Duration::from_secs_f64(1.0 / settings.frame_limit as f64));

    let failed = Arc::new(AtomicBool::new(false));
    let fatal_flag = Arc::clone(&failed);
    let kind = settings.strategy;
    let options = StartOptions {
        settings,
        set_fatal_error: Box::new(move |message: &str| {
            log::error!("simulation failed: {}", message);
            fatal_flag.store(true, Ordering::Release);
        }),
    };
    let mut strategy = match strategy::start(&mut host, options) {
        Ok(strategy) => strategy,
        Err(e) => {
            log::error!("cannot start: {}", e);
            std::process::exit(1);
        }
    };

    let rendered = || stats.lock().map(|s| s.frames).unwrap_or_default();
    while rendered() < frames && !failed.load(Ordering::Acquire) {
        if kind == ExecutionStrategyKind::RunOnMainThread {
            host.pump();
        }
        thread::sleep(host.frame_interval());
    }

    strategy.destroy();
    host.join();
    log::info!("rendered {} frames", rendered());
    if failed.load(Ordering::Acquire) {
        std::process::exit(1);
    }
}
