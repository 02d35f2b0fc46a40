//! Offscreen Sim - a 2D particle simulation rendered on the main thread or
//! on a worker that owns the canvas
//!
//! Core modules:
//! - `buffer`, `draw`: per-frame geometry storage that stops allocating
//! - `scheduler`: clamped-step frame scheduling
//! - `sim`: simulation engine boundary, sandbox world and demos
//! - `renderer`: wgpu and headless renderers
//! - `protocol`, `runtime`: worker transport and render loops
//! - `strategy`: in-process or offloaded execution
//! - `platform`: native threads or browser workers

pub mod buffer;
pub mod draw;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod renderer;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod sim;
pub mod strategy;

pub use error::{BufferError, ProtocolError, RenderError, StrategyError};
pub use settings::Settings;
pub use sim::Demo;
pub use strategy::{ExecutionStrategy, ExecutionStrategyKind, StartOptions};

/// Configuration constants
pub mod consts {
    /// Frames per second the simulation is stepped for at most
    pub const DEFAULT_FRAME_LIMIT: u32 = 60;
    /// Worker bootstrap script, relative to the page
    pub const DEFAULT_WORKER_URL: &str = "./worker.js";
    /// Surface size of the headless native renderer
    pub const NATIVE_SURFACE_SIZE: (u32, u32) = (960, 540);
}
