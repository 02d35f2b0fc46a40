//! Main thread <-> worker transport protocol
//!
//! Wire format is JSON with a `type` discriminant. The canvas handle never
//! goes through JSON: it travels next to the message as a transferable.
//!
//! Main-side state machine (`WorkerLink`):
//!
//! ```text
//! Starting -> AwaitingReady -> CanvasTransferred -> Running
//!     \            \                  \                \
//!      +------------+------------------+----------------+--> Terminated
//! ```
//!
//! The canvas and the first `switchDemo` are sent only after `ready`. Demo
//! changes requested earlier replace the pending initial demo instead.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::platform::MaybeSend;
use crate::sim::Demo;

/// main -> worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToWorker {
    /// Replace the active scene. `seq` increases with every switch sent.
    SwitchDemo { demo: Demo, seq: u64 },
    /// Exclusive ownership of the canvas; the handle rides in the transfer list
    OffscreenCanvas,
}

impl ToWorker {
    pub fn kind(&self) -> &'static str {
        match self {
            ToWorker::SwitchDemo { .. } => "switchDemo",
            ToWorker::OffscreenCanvas => "offscreenCanvas",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// worker -> main
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FromWorker {
    /// The worker is initialised and can take the canvas
    Ready,
    FatalError { message: String },
    Log { level: LogLevel, message: String },
}

impl FromWorker {
    pub fn kind(&self) -> &'static str {
        match self {
            FromWorker::Ready => "ready",
            FromWorker::FatalError { .. } => "fatalError",
            FromWorker::Log { .. } => "log",
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        FromWorker::Log {
            level,
            message: message.into(),
        }
    }
}

/// A message plus the transferable that travels with it
#[derive(Debug)]
pub struct Envelope<S> {
    pub message: ToWorker,
    pub transfer: Option<S>,
}

impl<S> Envelope<S> {
    pub fn switch_demo(demo: Demo, seq: u64) -> Self {
        Self {
            message: ToWorker::SwitchDemo { demo, seq },
            transfer: None,
        }
    }

    pub fn offscreen_canvas(surface: S) -> Self {
        Self {
            message: ToWorker::OffscreenCanvas,
            transfer: Some(surface),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain enums with string/integer fields always serialize
        serde_json::to_string(&self.message).unwrap_or_default()
    }

    /// Decode a received message and check the transfer matches it
    pub fn decode(json: &str, transfer: Option<S>) -> Result<Self, ProtocolError> {
        let message: ToWorker =
            serde_json::from_str(json).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        match (&message, &transfer) {
            (ToWorker::OffscreenCanvas, None) => Err(ProtocolError::Malformed(
                "offscreenCanvas without a transferred canvas".into(),
            )),
            (ToWorker::SwitchDemo { .. }, Some(_)) => Err(ProtocolError::Malformed(
                "switchDemo carrying a transferable".into(),
            )),
            _ => Ok(Self { message, transfer }),
        }
    }
}

/// What the main thread observes from a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Message(FromWorker),
    /// A message arrived but could not be deserialized
    MessageError(String),
    /// Uncaught failure inside the worker
    Error(String),
}

impl WorkerEvent {
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(message) => WorkerEvent::Message(message),
            Err(e) => WorkerEvent::MessageError(format!("{e}: {json}")),
        }
    }
}

/// Main-side end of the transport
pub trait WorkerPort {
    type Surface: MaybeSend + 'static;

    fn post(&mut self, envelope: Envelope<Self::Surface>) -> Result<(), ProtocolError>;

    /// Stop the worker. No in-flight message draining is guaranteed.
    fn terminate(&mut self);
}

/// Receives every event the worker produces
pub trait EventHandler: FnMut(WorkerEvent) + MaybeSend {}

impl<F: FnMut(WorkerEvent) + MaybeSend> EventHandler for F {}

/// Receives the message of a fatal worker failure
pub trait FatalSink: FnMut(&str) + MaybeSend {}

impl<F: FnMut(&str) + MaybeSend> FatalSink for F {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Worker spawned, events not wired yet
    Starting,
    AwaitingReady,
    /// Canvas and initial demo sent
    CanvasTransferred,
    /// Inferred once the worker talks back or further demos are sent
    Running,
    Terminated,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Starting => "Starting",
            LinkState::AwaitingReady => "AwaitingReady",
            LinkState::CanvasTransferred => "CanvasTransferred",
            LinkState::Running => "Running",
            LinkState::Terminated => "Terminated",
        }
    }
}

/// Main-side protocol state machine for one worker
pub struct WorkerLink<P: WorkerPort> {
    port: P,
    state: LinkState,
    surface: Option<P::Surface>,
    pending_demo: Demo,
    next_seq: u64,
    fatal_reported: bool,
}

impl<P: WorkerPort> WorkerLink<P> {
    pub fn new(port: P, surface: P::Surface, initial_demo: Demo) -> Self {
        Self {
            port,
            state: LinkState::Starting,
            surface: Some(surface),
            pending_demo: initial_demo,
            next_seq: 1,
            fatal_reported: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Events are wired; waiting for `ready`
    pub fn listening(&mut self) {
        if self.state == LinkState::Starting {
            self.state = LinkState::AwaitingReady;
        }
    }

    /// Handle one worker event.
    ///
    /// Returns the message to hand to the fatal sink, at most once per link
    /// and never after `destroy`. The caller invokes the sink itself so the
    /// sink may call back into the link.
    #[must_use]
    pub fn on_event(&mut self, event: WorkerEvent) -> Option<String> {
        match event {
            WorkerEvent::Message(FromWorker::Ready) => self.on_ready(),
            WorkerEvent::Message(FromWorker::FatalError { message }) => self.report_fatal(message),
            WorkerEvent::Message(FromWorker::Log { level, message }) => {
                log::log!(level.into(), "[worker] {}", message);
                if self.state == LinkState::CanvasTransferred {
                    self.state = LinkState::Running;
                }
                None
            }
            WorkerEvent::MessageError(description) => {
                log::warn!("worker message error: {}", description);
                None
            }
            WorkerEvent::Error(message) => self.report_fatal(message),
        }
    }

    /// Send a demo switch, or replace the pending initial demo before `ready`
    pub fn change_demo(&mut self, demo: Demo) {
        match self.state {
            LinkState::Starting | LinkState::AwaitingReady => {
                log::debug!("worker not ready, initial demo is now {}", demo.as_str());
                self.pending_demo = demo;
            }
            LinkState::CanvasTransferred | LinkState::Running => {
                self.state = LinkState::Running;
                self.send_switch(demo);
            }
            LinkState::Terminated => {
                log::debug!("ignoring demo change on terminated worker");
            }
        }
    }

    /// Terminate the worker. Idempotent and silent after the first call.
    pub fn destroy(&mut self) {
        if self.state == LinkState::Terminated {
            return;
        }
        self.port.terminate();
        self.surface = None;
        self.state = LinkState::Terminated;
        log::info!("worker terminated");
    }

    fn on_ready(&mut self) -> Option<String> {
        match self.state {
            LinkState::Starting | LinkState::AwaitingReady => {}
            state => {
                let error = ProtocolError::UnexpectedMessage {
                    state: state.as_str(),
                    message: "ready",
                };
                log::warn!("{}", error);
                return None;
            }
        }
        let Some(surface) = self.surface.take() else {
            return self.report_fatal("canvas already transferred".into());
        };
        log::info!("worker ready, transferring canvas");
        if let Err(e) = self.port.post(Envelope::offscreen_canvas(surface)) {
            return self.report_fatal(format!("canvas transfer failed: {e}"));
        }
        self.state = LinkState::CanvasTransferred;
        self.send_switch(self.pending_demo);
        None
    }

    fn send_switch(&mut self, demo: Demo) {
        let seq = self.next_seq;
        self.next_seq += 1;
        log::info!("switching worker to {} (seq {})", demo.as_str(), seq);
        if let Err(e) = self.port.post(Envelope::switch_demo(demo, seq)) {
            log::warn!("switchDemo not delivered: {}", e);
        }
    }

    fn report_fatal(&mut self, message: String) -> Option<String> {
        if self.state == LinkState::Terminated {
            log::debug!("dropping fatal error from terminated worker: {}", message);
            return None;
        }
        log::error!("worker fatal error: {}", message);
        if self.fatal_reported {
            return None;
        }
        self.fatal_reported = true;
        Some(message)
    }
}
