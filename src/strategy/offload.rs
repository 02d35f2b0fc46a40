//! Simulation on a worker that owns the canvas

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ExecutionStrategy, ExecutionStrategyKind, StartOptions};
use crate::error::StrategyError;
use crate::platform::{MaybeSend, WorkerHost};
use crate::protocol::{LinkState, WorkerEvent, WorkerLink, WorkerPort};
use crate::sim::Demo;

pub struct Offloaded<P: WorkerPort> {
    link: Arc<Mutex<WorkerLink<P>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: WorkerPort + MaybeSend + 'static> Offloaded<P> {
    /// Fails with `UnsupportedCapability` before any worker exists if the
    /// canvas cannot be handed to another thread. The canvas is only
    /// detached once a worker is up, so after any error the host can still
    /// render in-process.
    pub fn start<H>(host: &mut H, options: StartOptions) -> Result<Self, StrategyError>
    where
        H: WorkerHost<Port = P>,
    {
        if !host.supports_surface_transfer() {
            return Err(StrategyError::UnsupportedCapability(
                "transferring the canvas to a worker",
            ));
        }

        let StartOptions {
            settings,
            mut set_fatal_error,
        } = options;
        let (mut port, events) = host.spawn_worker(&settings)?;
        let Some(surface) = host.take_surface() else {
            port.terminate();
            return Err(StrategyError::UnsupportedCapability(
                "canvas already transferred",
            ));
        };
        log::info!("worker spawned");

        let link = Arc::new(Mutex::new(WorkerLink::new(
            port,
            surface,
            settings.initial_demo,
        )));
        let handler_link = Arc::clone(&link);
        host.listen(
            events,
            Box::new(move |event: WorkerEvent| {
                // The guard is dropped before the sink runs
                let fatal = lock(&handler_link).on_event(event);
                if let Some(message) = fatal {
                    set_fatal_error(&message);
                }
            }),
        );
        lock(&link).listening();
        Ok(Self { link })
    }

    pub fn state(&self) -> LinkState {
        lock(&self.link).state()
    }
}

impl<P: WorkerPort + MaybeSend + 'static> ExecutionStrategy for Offloaded<P> {
    fn kind(&self) -> ExecutionStrategyKind {
        ExecutionStrategyKind::OffloadToWorker
    }

    fn change_demo(&mut self, demo: Demo) {
        lock(&self.link).change_demo(demo);
    }

    fn destroy(&mut self) {
        lock(&self.link).destroy();
    }
}
