//! Execution strategies
//!
//! Chosen once at startup from `Settings::strategy`. Both variants expose
//! the same two operations; where the simulation actually runs is hidden
//! behind them.

pub mod in_process;
pub mod offload;

pub use in_process::InProcess;
pub use offload::Offloaded;

use serde::{Deserialize, Serialize};

use crate::error::StrategyError;
use crate::platform::{LocalHost, WorkerHost};
use crate::protocol::FatalSink;
use crate::settings::Settings;
use crate::sim::Demo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStrategyKind {
    #[default]
    OffloadToWorker,
    RunOnMainThread,
}

impl ExecutionStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategyKind::OffloadToWorker => "worker",
            ExecutionStrategyKind::RunOnMainThread => "main",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "worker" | "offloadToWorker" => Some(ExecutionStrategyKind::OffloadToWorker),
            "main" | "runOnMainThread" => Some(ExecutionStrategyKind::RunOnMainThread),
            _ => None,
        }
    }
}

pub trait ExecutionStrategy {
    fn kind(&self) -> ExecutionStrategyKind;

    /// Replace the running demo. Offloaded switches are fire-and-forget.
    fn change_demo(&mut self, demo: Demo);

    /// Stop everything. Safe to call more than once.
    fn destroy(&mut self);
}

pub struct StartOptions {
    pub settings: Settings,
    /// Receives the first fatal failure; nothing is restarted afterwards
    pub set_fatal_error: Box<dyn FatalSink>,
}

/// Build the strategy named by `options.settings.strategy`
pub fn start<H>(host: &mut H, options: StartOptions) -> Result<Box<dyn ExecutionStrategy>, StrategyError>
where
    H: LocalHost + WorkerHost,
{
    let kind = options.settings.strategy;
    log::info!("starting {} strategy", kind.as_str());
    match kind {
        ExecutionStrategyKind::RunOnMainThread => Ok(Box::new(InProcess::start(host, options))),
        ExecutionStrategyKind::OffloadToWorker => Ok(Box::new(Offloaded::start(host, options)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(
            serde_json::to_string(&ExecutionStrategyKind::RunOnMainThread).unwrap(),
            "\"runOnMainThread\""
        );
        for kind in [ExecutionStrategyKind::OffloadToWorker, ExecutionStrategyKind::RunOnMainThread] {
            assert_eq!(ExecutionStrategyKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ExecutionStrategyKind::from_str("gpu"), None);
    }
}
