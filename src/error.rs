//! Error taxonomy for the pipeline
//!
//! - `BufferError`: programming errors in growable buffer use
//! - `StrategyError`: precondition failures when starting an execution strategy
//! - `ProtocolError`: malformed or out-of-order worker messages (non-fatal)
//! - `RenderError`: GPU resource acquisition failures (not retried)

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A view was requested past the ensured capacity.
    #[error("buffer invariant violated: view of {requested} elements requested, capacity is {capacity}")]
    InvariantViolation { requested: usize, capacity: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    /// The host cannot hand exclusive ownership of the rendering surface to another thread.
    #[error("unsupported host capability: {0}")]
    UnsupportedCapability(&'static str),
    #[error("failed to start worker: {0}")]
    Spawn(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unexpected `{message}` message in state {state}")]
    UnexpectedMessage {
        state: &'static str,
        message: &'static str,
    },
    #[error("worker channel disconnected")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(String),
    #[error("failed to create GPU device: {0}")]
    Device(String),
    #[error("failed to create surface: {0}")]
    Surface(String),
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error(transparent)]
    Buffer(#[from] BufferError),
}
