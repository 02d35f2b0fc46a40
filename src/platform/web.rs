//! Browser host (wasm32)
//!
//! Main thread: `BrowserHost` owns the page canvas and spawns a module
//! worker. Worker: `worker_main` is called by the worker bootstrap script
//! after it loads this module.
//!
//! JSON crosses the boundary as a plain object. The offscreen canvas rides
//! on the same object under `offscreenCanvas` and in the transfer list.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::{
    DedicatedWorkerGlobalScope, Document, ErrorEvent, HtmlCanvasElement, MessageEvent,
    OffscreenCanvas, Window, Worker, WorkerOptions, WorkerType,
};

use super::{LocalHost, RendererReady, WorkerHost};
use crate::error::{ProtocolError, RenderError, StrategyError};
use crate::protocol::{Envelope, EventHandler, FromWorker, WorkerEvent, WorkerPort};
use crate::renderer::pipeline::SizeSource;
use crate::renderer::GeometryRenderer;
use crate::runtime::{Reply, WorkerRuntime};
use crate::scheduler::{FrameCallback, FrameDriver};
use crate::settings::Settings;
use crate::sim::Demo;
use crate::strategy::{self, ExecutionStrategy, ExecutionStrategyKind, StartOptions};

const CANVAS_PROPERTY: &str = "offscreenCanvas";

/// `requestAnimationFrame` of the current realm
pub enum BrowserFrames {
    Window(Window),
    Worker(DedicatedWorkerGlobalScope),
}

impl FrameDriver for BrowserFrames {
    fn now_ms(&self) -> f64 {
        let performance = match self {
            BrowserFrames::Window(window) => window.performance(),
            BrowserFrames::Worker(scope) => scope.performance(),
        };
        performance.map_or_else(js_sys::Date::now, |p| p.now())
    }

    fn request_frame(&self, callback: FrameCallback) {
        let closure = Closure::once(move |time: f64| callback(time));
        let requested = match self {
            BrowserFrames::Window(window) => {
                window.request_animation_frame(closure.as_ref().unchecked_ref())
            }
            BrowserFrames::Worker(scope) => {
                scope.request_animation_frame(closure.as_ref().unchecked_ref())
            }
        };
        if let Err(e) = requested {
            log::error!("requestAnimationFrame failed: {:?}", e);
        }
        closure.forget();
    }
}

pub struct WebPort {
    worker: Worker,
}

impl WorkerPort for WebPort {
    type Surface = OffscreenCanvas;

    fn post(&mut self, envelope: Envelope<OffscreenCanvas>) -> Result<(), ProtocolError> {
        let message = js_sys::JSON::parse(&envelope.to_json())
            .map_err(|e| ProtocolError::Malformed(format!("{e:?}")))?;
        let posted = match envelope.transfer {
            Some(canvas) => {
                js_sys::Reflect::set(&message, &JsValue::from_str(CANVAS_PROPERTY), &canvas)
                    .map_err(|e| ProtocolError::Malformed(format!("{e:?}")))?;
                self.worker
                    .post_message_with_transfer(&message, &js_sys::Array::of1(&canvas))
            }
            None => self.worker.post_message(&message),
        };
        posted.map_err(|e| {
            log::warn!("postMessage failed: {:?}", e);
            ProtocolError::Disconnected
        })
    }

    fn terminate(&mut self) {
        self.worker.terminate();
    }
}

pub struct BrowserHost {
    canvas: HtmlCanvasElement,
    transferred: bool,
    frames: Rc<BrowserFrames>,
}

impl BrowserHost {
    pub fn new(window: Window, canvas: HtmlCanvasElement) -> Self {
        Self {
            canvas,
            transferred: false,
            frames: Rc::new(BrowserFrames::Window(window)),
        }
    }
}

impl LocalHost for BrowserHost {
    type Renderer = GeometryRenderer;
    type Frames = BrowserFrames;

    fn frames(&self) -> Rc<BrowserFrames> {
        Rc::clone(&self.frames)
    }

    fn create_renderer(&mut self, settings: &Settings, ready: RendererReady<GeometryRenderer>) {
        if self.transferred {
            ready(Err(RenderError::Surface("canvas already transferred".into())));
            return;
        }
        let canvas = self.canvas.clone();
        let clear_color = settings.clear_color;
        wasm_bindgen_futures::spawn_local(async move {
            let size = SizeSource::Canvas(canvas.clone());
            let target = wgpu::SurfaceTarget::Canvas(canvas);
            ready(GeometryRenderer::for_target(target, size, clear_color).await);
        });
    }
}

impl WorkerHost for BrowserHost {
    type Port = WebPort;
    type Events = Worker;

    fn supports_surface_transfer(&self) -> bool {
        js_sys::Reflect::has(self.canvas.as_ref(), &JsValue::from_str("transferControlToOffscreen"))
            .unwrap_or(false)
    }

    fn take_surface(&mut self) -> Option<OffscreenCanvas> {
        if self.transferred {
            return None;
        }
        match self.canvas.transfer_control_to_offscreen() {
            Ok(canvas) => {
                self.transferred = true;
                Some(canvas)
            }
            Err(e) => {
                log::warn!("transferControlToOffscreen failed: {:?}", e);
                None
            }
        }
    }

    fn spawn_worker(&mut self, settings: &Settings) -> Result<(WebPort, Worker), StrategyError> {
        let options = WorkerOptions::new();
        options.set_type(WorkerType::Module);
        // Workers have no LocalStorage; the settings travel in the worker name
        let name = serde_json::to_string(settings).map_err(|e| StrategyError::Spawn(e.to_string()))?;
        options.set_name(&name);
        let worker = Worker::new_with_options(&settings.worker_url, &options)
            .map_err(|e| StrategyError::Spawn(format!("{e:?}")))?;
        Ok((WebPort { worker: worker.clone() }, worker))
    }

    fn listen(&mut self, worker: Worker, handler: Box<dyn EventHandler>) {
        let handler = Rc::new(RefCell::new(handler));
        let dispatch = move |event: WorkerEvent| {
            let mut handler = handler.borrow_mut();
            (*handler)(event);
        };
        let dispatch = Rc::new(dispatch);

        let on_message = {
            let dispatch = Rc::clone(&dispatch);
            Closure::<dyn FnMut(_)>::new(move |event: MessageEvent| {
                let event = match js_sys::JSON::stringify(&event.data()) {
                    Ok(json) => WorkerEvent::from_json(&String::from(json)),
                    Err(e) => WorkerEvent::MessageError(format!("{e:?}")),
                };
                dispatch(event);
            })
        };
        worker.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        on_message.forget();

        let on_message_error = {
            let dispatch = Rc::clone(&dispatch);
            Closure::<dyn FnMut(_)>::new(move |_event: MessageEvent| {
                dispatch(WorkerEvent::MessageError(
                    "message could not be deserialized".into(),
                ));
            })
        };
        worker.set_onmessageerror(Some(on_message_error.as_ref().unchecked_ref()));
        on_message_error.forget();

        let on_error = Closure::<dyn FnMut(_)>::new(move |event: ErrorEvent| {
            event.prevent_default();
            dispatch(WorkerEvent::Error(event.message()));
        });
        worker.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        on_error.forget();
    }
}

fn post_reply(scope: &DedicatedWorkerGlobalScope, message: &FromWorker) {
    let posted = serde_json::to_string(message)
        .map_err(|e| format!("{e}"))
        .and_then(|json| js_sys::JSON::parse(&json).map_err(|e| format!("{e:?}")))
        .and_then(|value| scope.post_message(&value).map_err(|e| format!("{e:?}")));
    if let Err(e) = posted {
        log::error!("cannot post {}: {}", message.kind(), e);
    }
}

/// Remove the transferred canvas from a received message
fn take_canvas(data: &JsValue) -> Option<OffscreenCanvas> {
    let key = JsValue::from_str(CANVAS_PROPERTY);
    let canvas = js_sys::Reflect::get(data, &key)
        .ok()?
        .dyn_into::<OffscreenCanvas>()
        .ok()?;
    let _ = js_sys::Reflect::delete_property(data.unchecked_ref::<js_sys::Object>(), &key);
    Some(canvas)
}

fn attach_canvas(
    worker: Rc<RefCell<WorkerRuntime<GeometryRenderer>>>,
    frames: Rc<BrowserFrames>,
    canvas: OffscreenCanvas,
    clear_color: [f32; 4],
) {
    wasm_bindgen_futures::spawn_local(async move {
        let size = SizeSource::Offscreen(canvas.clone());
        let target = wgpu::SurfaceTarget::OffscreenCanvas(canvas);
        match GeometryRenderer::for_target(target, size, clear_color).await {
            Ok(renderer) => worker.borrow().attach(renderer, frames),
            Err(e) => worker.borrow().fail(&format!("renderer setup failed: {e}")),
        }
    });
}

/// Worker entry point
#[wasm_bindgen]
pub fn worker_main() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);

    let scope: DedicatedWorkerGlobalScope = js_sys::global().unchecked_into();
    let settings: Settings = serde_json::from_str(&scope.name()).unwrap_or_default();
    let clear_color = settings.clear_color;

    let reply_scope = scope.clone();
    let reply: Reply = Rc::new(move |message: FromWorker| post_reply(&reply_scope, &message));
    let frames = Rc::new(BrowserFrames::Worker(scope.clone()));
    let worker = Rc::new(RefCell::new(WorkerRuntime::<GeometryRenderer>::new(
        settings, reply,
    )));

    let handler_worker = Rc::clone(&worker);
    let on_message = Closure::<dyn FnMut(_)>::new(move |event: MessageEvent| {
        let data = event.data();
        let canvas = take_canvas(&data);
        let json = js_sys::JSON::stringify(&data)
            .map(String::from)
            .unwrap_or_default();
        let received = handler_worker.borrow_mut().receive(&json, canvas);
        match received {
            Ok(Some(canvas)) => attach_canvas(
                Rc::clone(&handler_worker),
                Rc::clone(&frames),
                canvas,
                clear_color,
            ),
            Ok(None) => {}
            Err(e) => handler_worker.borrow().diagnose(&e),
        }
    });
    scope.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    on_message.forget();

    log::info!("worker initialised");
    worker.borrow().ready();
}

fn show_fatal(document: &Document, message: &str) {
    if let Some(el) = document.get_element_by_id("fatal-error") {
        el.set_text_content(Some(message));
        let _ = el.set_attribute("class", "");
    }
}

/// Match the drawing buffer to the displayed size in device pixels
fn size_canvas(window: &Window, canvas: &HtmlCanvasElement) {
    let dpr = window.device_pixel_ratio();
    canvas.set_width((canvas.client_width() as f64 * dpr) as u32);
    canvas.set_height((canvas.client_height() as f64 * dpr) as u32);
}

/// Buttons with id `demo-<name>` switch demos
fn setup_demo_buttons(document: &Document, strategy: Rc<RefCell<Box<dyn ExecutionStrategy>>>) {
    for demo in Demo::ALL {
        let Some(button) = document.get_element_by_id(&format!("demo-{}", demo.as_str())) else {
            continue;
        };
        let strategy = Rc::clone(&strategy);
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            strategy.borrow_mut().change_demo(demo);
        });
        let _ = button.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
        closure.forget();
    }
}

fn start_strategy(
    host: &mut BrowserHost,
    settings: Settings,
    document: &Document,
) -> Result<Box<dyn ExecutionStrategy>, StrategyError> {
    let fatal_document = document.clone();
    let options = StartOptions {
        settings,
        set_fatal_error: Box::new(move |message: &str| show_fatal(&fatal_document, message)),
    };
    strategy::start(host, options)
}

/// Main-thread entry point
pub fn start_page() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);

    let window = web_sys::window().ok_or("no window")?;
    let document = window.document().ok_or("no document")?;
    let canvas: HtmlCanvasElement = document
        .get_element_by_id("canvas")
        .ok_or("no canvas")?
        .dyn_into()?;

    size_canvas(&window, &canvas);

    let settings = Settings::load_with_query();
    let mut host = BrowserHost::new(window.clone(), canvas.clone());
    let strategy = match start_strategy(&mut host, settings.clone(), &document) {
        Err(e @ (StrategyError::UnsupportedCapability(_) | StrategyError::Spawn(_))) => {
            log::warn!("cannot offload ({}), running on the main thread", e);
            let mut fallback = settings.clone();
            fallback.strategy = ExecutionStrategyKind::RunOnMainThread;
            start_strategy(&mut host, fallback, &document)
        }
        started => started,
    }
    .map_err(|e| JsValue::from_str(&e.to_string()))?;
    // Remember query overrides for the next visit
    settings.save();

    // A transferred canvas can only be sized by its worker
    if strategy.kind() == ExecutionStrategyKind::RunOnMainThread {
        let resize_window = window.clone();
        let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
            size_canvas(&resize_window, &canvas);
        });
        let _ = window.add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    let strategy = Rc::new(RefCell::new(strategy));
    setup_demo_buttons(&document, Rc::clone(&strategy));

    let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
        strategy.borrow_mut().destroy();
    });
    let _ = window.add_event_listener_with_callback("pagehide", closure.as_ref().unchecked_ref());
    closure.forget();

    log::info!("offscreen-sim running");
    Ok(())
}
