//! Simulation, draw buffer and rendering on the canvas-owning thread

use std::cell::RefCell;
use std::rc::Rc;

use super::{ExecutionStrategy, ExecutionStrategyKind, StartOptions};
use crate::error::RenderError;
use crate::platform::LocalHost;
use crate::renderer::FrameRenderer;
use crate::runtime::Runtime;
use crate::scheduler::{FrameDriver, schedule};
use crate::sim::Demo;

pub struct InProcess<R> {
    runtime: Rc<RefCell<Runtime<R>>>,
}

impl<R: FrameRenderer + 'static> InProcess<R> {
    pub fn start<H>(host: &mut H, options: StartOptions) -> Self
    where
        H: LocalHost<Renderer = R>,
    {
        let StartOptions {
            settings,
            mut set_fatal_error,
        } = options;
        let initial_demo = settings.initial_demo;
        let on_fatal = Box::new(move |message: &str| set_fatal_error(message));
        let runtime = Rc::new(RefCell::new(Runtime::new(settings.clone(), on_fatal)));
        runtime.borrow_mut().switch_now(initial_demo);

        let frames = host.frames();
        let ready_runtime = Rc::clone(&runtime);
        host.create_renderer(
            &settings,
            Box::new(move |result: Result<R, RenderError>| match result {
                Ok(renderer) => {
                    let now_ms = frames.now_ms();
                    ready_runtime.borrow_mut().attach_renderer(renderer, now_ms);
                    schedule(frames, ready_runtime);
                }
                Err(e) => ready_runtime
                    .borrow_mut()
                    .fail(&format!("renderer setup failed: {e}")),
            }),
        );
        Self { runtime }
    }

    pub fn runtime(&self) -> &Rc<RefCell<Runtime<R>>> {
        &self.runtime
    }
}

impl<R: FrameRenderer + 'static> ExecutionStrategy for InProcess<R> {
    fn kind(&self) -> ExecutionStrategyKind {
        ExecutionStrategyKind::RunOnMainThread
    }

    fn change_demo(&mut self, demo: Demo) {
        match self.runtime.try_borrow_mut() {
            Ok(mut runtime) => runtime.switch_now(demo),
            Err(_) => log::debug!("runtime is failing, ignoring switch to {}", demo.as_str()),
        }
    }

    fn destroy(&mut self) {
        // Busy only while the fatal callback runs; the runtime stops itself
        // right after it returns
        if let Ok(mut runtime) = self.runtime.try_borrow_mut() {
            runtime.destroy();
        }
    }
}
