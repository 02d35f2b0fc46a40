//! Platform abstraction layer
//!
//! The strategies only talk to a host through these traits:
//! - `LocalHost`: renderer and display-sync primitive on the current thread
//! - `WorkerHost`: surface transfer, worker spawning and worker events
//!
//! `native` backs both with std threads and channels; `web` (wasm32) with
//! `Worker`, `OffscreenCanvas` and `requestAnimationFrame`.

use std::rc::Rc;

use crate::error::{RenderError, StrategyError};
use crate::protocol::{EventHandler, WorkerPort};
use crate::renderer::FrameRenderer;
use crate::scheduler::FrameDriver;
use crate::settings::Settings;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod web;

/// `Send` where threads exist. Browser handles are single-threaded JS
/// objects that only move through `postMessage`, so on wasm32 it holds for
/// every type.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + ?Sized> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSend for T {}

/// Called once the renderer for the local canvas exists (or failed)
pub type RendererReady<R> = Box<dyn FnOnce(Result<R, RenderError>)>;

pub trait LocalHost {
    type Renderer: FrameRenderer + 'static;
    type Frames: FrameDriver + 'static;

    fn frames(&self) -> Rc<Self::Frames>;

    /// Acquire the canvas for drawing on this thread. GPU setup may be
    /// asynchronous, so the result arrives through `ready`.
    fn create_renderer(&mut self, settings: &Settings, ready: RendererReady<Self::Renderer>);
}

pub trait WorkerHost {
    type Port: WorkerPort + MaybeSend + 'static;
    /// Source of worker -> main events, consumed by `listen`
    type Events;

    /// Whether exclusive canvas ownership can move to another thread
    fn supports_surface_transfer(&self) -> bool;

    /// Detach the canvas for transfer. `None` once it has been handed out.
    fn take_surface(&mut self) -> Option<<Self::Port as WorkerPort>::Surface>;

    fn spawn_worker(&mut self, settings: &Settings) -> Result<(Self::Port, Self::Events), StrategyError>;

    fn listen(&mut self, events: Self::Events, handler: Box<dyn EventHandler>);
}
