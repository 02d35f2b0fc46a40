//! WebGPU render pipeline for flat 2D primitives

use bytemuck::{Pod, Zeroable};

use super::vertex::{colors, position_layout};
use super::{Camera, DrawPlan, FrameRenderer};
use crate::draw::FrameGeometry;
use crate::error::RenderError;

/// Where the drawable size is read from, once per frame. A canvas resized
/// by the page (or by the worker owning it) is picked up on the next frame.
pub enum SizeSource {
    Fixed(u32, u32),
    #[cfg(target_arch = "wasm32")]
    Canvas(web_sys::HtmlCanvasElement),
    #[cfg(target_arch = "wasm32")]
    Offscreen(web_sys::OffscreenCanvas),
}

impl SizeSource {
    pub fn current(&self) -> (u32, u32) {
        match self {
            SizeSource::Fixed(width, height) => (*width, *height),
            #[cfg(target_arch = "wasm32")]
            SizeSource::Canvas(canvas) => (canvas.width(), canvas.height()),
            #[cfg(target_arch = "wasm32")]
            SizeSource::Offscreen(canvas) => (canvas.width(), canvas.height()),
        }
    }
}

/// New surface size if `current` differs from `configured`. A zero-sized
/// canvas (hidden, collapsed) keeps the old configuration.
fn resized(configured: (u32, u32), current: (u32, u32)) -> Option<(u32, u32)> {
    let (width, height) = current;
    (width > 0 && height > 0 && current != configured).then_some(current)
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Globals {
    transform: [[f32; 4]; 4],
    box_color: [f32; 4],
    line_color: [f32; 4],
    point_color: [f32; 4],
}

/// GPU-side mirror of a growable buffer: grows to fit, never shrinks
struct GpuBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: wgpu::Buffer,
    capacity: wgpu::BufferAddress,
}

impl GpuBuffer {
    /// Smallest allocation, so an unused stream still has a valid buffer
    const MIN_SIZE: wgpu::BufferAddress = 64;

    fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            label,
            usage,
            buffer: Self::allocate(device, label, usage, Self::MIN_SIZE),
            capacity: Self::MIN_SIZE,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        label: &'static str,
        usage: wgpu::BufferUsages,
        size: wgpu::BufferAddress,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Upload `bytes`, replacing the buffer only if it is too small.
    /// Returns the uploaded size.
    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) -> wgpu::BufferAddress {
        let size = bytes.len() as wgpu::BufferAddress;
        if size > self.capacity {
            self.buffer = Self::allocate(device, self.label, self.usage, size);
            self.capacity = size;
            log::debug!("{} grown to {} bytes", self.label, size);
        }
        if size > 0 {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
        size
    }
}

/// Renders quads, line segments and points onto a canvas surface
pub struct GeometryRenderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size_source: SizeSource,

    quad_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    point_pipeline: wgpu::RenderPipeline,

    globals_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,

    quad_vertices: GpuBuffer,
    quad_indices: GpuBuffer,
    line_vertices: GpuBuffer,
    points: GpuBuffer,

    clear_color: wgpu::Color,
}

impl GeometryRenderer {
    /// Create instance, surface, adapter and device for `target`.
    ///
    /// Any failure here is an environment defect and is not retried.
    pub async fn for_target(
        target: wgpu::SurfaceTarget<'static>,
        size_source: SizeSource,
        clear_color: [f32; 4],
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Adapter(e.to_string()))?;

        log::info!("Using adapter: {:?}", adapter.get_info().name);

        Self::new(surface, &adapter, size_source, clear_color).await
    }

    pub async fn new(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        size_source: SizeSource,
        clear_color: [f32; 4],
    ) -> Result<Self, RenderError> {
        let (width, height) = size_source.current();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("offscreen-sim-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await
            .map_err(|e| RenderError::Device(e.to_string()))?;

        let surface_caps = surface.get_capabilities(adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        log::info!(
            "Surface config: {}x{}, format: {:?}",
            config.width,
            config.height,
            config.format
        );
        surface.configure(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("geometry_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals"),
            size: std::mem::size_of::<Globals>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("geometry_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let make_pipeline = |label: &str, fragment: &str, topology: wgpu::PrimitiveTopology| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[position_layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(fragment),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: config.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        };

        let quad_pipeline = make_pipeline("quad_pipeline", "fs_box", wgpu::PrimitiveTopology::TriangleList);
        let line_pipeline = make_pipeline("line_pipeline", "fs_line", wgpu::PrimitiveTopology::LineList);
        let point_pipeline = make_pipeline("point_pipeline", "fs_point", wgpu::PrimitiveTopology::PointList);

        let quad_vertices = GpuBuffer::new(&device, "quad_vertices", wgpu::BufferUsages::VERTEX);
        let quad_indices = GpuBuffer::new(&device, "quad_indices", wgpu::BufferUsages::INDEX);
        let line_vertices = GpuBuffer::new(&device, "line_vertices", wgpu::BufferUsages::VERTEX);
        let points = GpuBuffer::new(&device, "points", wgpu::BufferUsages::VERTEX);

        let [r, g, b, a] = clear_color.map(f64::from);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size_source,
            quad_pipeline,
            line_pipeline,
            point_pipeline,
            globals_buffer,
            bind_group,
            quad_vertices,
            quad_indices,
            line_vertices,
            points,
            clear_color: wgpu::Color { r, g, b, a },
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            log::debug!("Surface resized to {}x{}", width, height);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn configured_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

impl FrameRenderer for GeometryRenderer {
    /// Live canvas size, so the camera is fitted to this frame's canvas
    fn surface_size(&self) -> (u32, u32) {
        let current = self.size_source.current();
        resized(self.configured_size(), current).map_or(self.configured_size(), |_| current)
    }

    fn render(&mut self, camera: &Camera, geometry: FrameGeometry<'_>) -> Result<(), RenderError> {
        if let Some((width, height)) = resized(self.configured_size(), self.size_source.current()) {
            self.resize(width, height);
        }
        let (width, height) = self.configured_size();
        let globals = Globals {
            transform: camera.clip_transform(width, height).to_cols_array_2d(),
            box_color: colors::BOX,
            line_color: colors::LINE,
            point_color: colors::PARTICLE,
        };
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));

        let plan = DrawPlan::for_geometry(&geometry);
        let quad_bytes = self.quad_vertices.upload(
            &self.device,
            &self.queue,
            bytemuck::cast_slice(geometry.boxes),
        );
        let index_bytes = self.quad_indices.upload(
            &self.device,
            &self.queue,
            bytemuck::cast_slice(geometry.box_indices),
        );
        let line_bytes = self.line_vertices.upload(
            &self.device,
            &self.queue,
            bytemuck::cast_slice(geometry.line_vertices),
        );
        let point_bytes = self.points.upload(
            &self.device,
            &self.queue,
            bytemuck::cast_slice(geometry.circle_centres),
        );

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(e) => {
                log::warn!("Render error: {:?}", e);
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            render_pass.set_bind_group(0, &self.bind_group, &[]);

            if let Some(index_count) = plan.quad_indices {
                render_pass.set_pipeline(&self.quad_pipeline);
                render_pass.set_vertex_buffer(0, self.quad_vertices.buffer.slice(..quad_bytes));
                render_pass.set_index_buffer(
                    self.quad_indices.buffer.slice(..index_bytes),
                    wgpu::IndexFormat::Uint32,
                );
                render_pass.draw_indexed(0..index_count, 0, 0..1);
            }

            if let Some(vertex_count) = plan.line_vertices {
                render_pass.set_pipeline(&self.line_pipeline);
                render_pass.set_vertex_buffer(0, self.line_vertices.buffer.slice(..line_bytes));
                render_pass.draw(0..vertex_count, 0..1);
            }

            if let Some(point_count) = plan.points {
                render_pass.set_pipeline(&self.point_pipeline);
                render_pass.set_vertex_buffer(0, self.points.buffer.slice(..point_bytes));
                render_pass.draw(0..point_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
