use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::Pod;
use wgpu;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::pipeline::{
    PlotPipeline, PlotPipelineDesc, StripUniforms, SurfaceUniforms, DEPTH_FORMAT,
};
use super::Geometry;

const SPECTRUM_COLOR: [f32; 4] = [0.2, 0.9, 0.4, 1.0];
const WAVEFORM_COLOR: [f32; 4] = [0.3, 0.6, 1.0, 1.0];

/// Vertex buffer that grows to fit whatever it is asked to hold.
struct VertexBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: u64,
    len: u32,
}

impl VertexBuffer {
    const INITIAL_BYTES: u64 = 4096;

    fn new(device: &wgpu::Device, label: &'static str) -> Self {
        Self {
            label,
            buffer: Self::allocate(device, label, Self::INITIAL_BYTES),
            capacity: Self::INITIAL_BYTES,
            len: 0,
        }
    }

    fn allocate(device: &wgpu::Device, label: &'static str, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn upload<T: Pod>(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, vertices: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let size = bytes.len() as u64;
        if size > self.capacity {
            self.capacity = size.next_power_of_two();
            self.buffer = Self::allocate(device, self.label, self.capacity);
            log::debug!("Grew {} to {} bytes", self.label, self.capacity);
        }
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
        self.len = vertices.len() as u32;
    }
}

/// One colored line strip: its uniforms and vertices.
struct Strip {
    bind_group: wgpu::BindGroup,
    vertices: VertexBuffer,
}

impl Strip {
    fn new(device: &wgpu::Device, pipeline: &PlotPipeline, label: &'static str, color: [f32; 4]) -> Self {
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&StripUniforms { color }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &pipeline.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });
        Self {
            bind_group,
            vertices: VertexBuffer::new(device, label),
        }
    }
}

/// Draws [`Geometry`] into a window surface.
pub struct GpuRenderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    lines: PlotPipeline,
    points: PlotPipeline,
    spectrum: Strip,
    waveform: Strip,
    surface_uniforms: wgpu::Buffer,
    surface_bind_group: wgpu::BindGroup,
    surface_vertices: VertexBuffer,
}

impl GpuRenderer {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        pollster::block_on(Self::init_async(window))
    }

    async fn init_async(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::METAL | wgpu::Backends::VULKAN | wgpu::Backends::DX12,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("Failed to create window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to find a suitable GPU adapter")?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("visualizer_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    ..Default::default()
                },
                None,
            )
            .await
            .context("Failed to create GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .context("Surface reports no texture formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, &config);

        let lines = PlotPipeline::new(
            &device,
            &PlotPipelineDesc {
                label: "lines",
                shader_source: include_str!("shaders/lines.wgsl"),
                vertex_format: wgpu::VertexFormat::Float32x2,
                topology: wgpu::PrimitiveTopology::LineStrip,
                depth_test: false,
            },
            format,
        )?;
        let points = PlotPipeline::new(
            &device,
            &PlotPipelineDesc {
                label: "points",
                shader_source: include_str!("shaders/points.wgsl"),
                vertex_format: wgpu::VertexFormat::Float32x3,
                topology: wgpu::PrimitiveTopology::PointList,
                depth_test: true,
            },
            format,
        )?;

        let spectrum = Strip::new(&device, &lines, "spectrum", SPECTRUM_COLOR);
        let waveform = Strip::new(&device, &lines, "waveform", WAVEFORM_COLOR);

        let surface_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("surface_uniforms"),
            contents: bytemuck::bytes_of(&SurfaceUniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let surface_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surface_bind_group"),
            layout: &points.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: surface_uniforms.as_entire_binding(),
            }],
        });
        let surface_vertices = VertexBuffer::new(&device, "surface_vertices");

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_view,
            lines,
            points,
            spectrum,
            waveform,
            surface_uniforms,
            surface_bind_group,
            surface_vertices,
        })
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width > 0 && size.height > 0 {
            self.config.width = size.width;
            self.config.height = size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_view = create_depth_view(&self.device, &self.config);
        }
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }

    /// Upload `geometry` and present one frame.
    pub fn draw(&mut self, geometry: &Geometry) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                anyhow::bail!("GPU out of memory");
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
                return Ok(());
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        match geometry {
            Geometry::Empty => {
                clear_pass(&mut encoder, &view, None);
            }
            Geometry::Lines { spectrum, waveform } => {
                self.spectrum.vertices.upload(&self.device, &self.queue, spectrum);
                self.waveform.vertices.upload(&self.device, &self.queue, waveform);

                let mut pass = clear_pass(&mut encoder, &view, None);
                pass.set_pipeline(&self.lines.pipeline);
                for strip in [&self.spectrum, &self.waveform] {
                    if strip.vertices.len == 0 {
                        continue;
                    }
                    pass.set_bind_group(0, &strip.bind_group, &[]);
                    pass.set_vertex_buffer(0, strip.vertices.buffer.slice(..));
                    pass.draw(0..strip.vertices.len, 0..1);
                }
            }
            Geometry::Points {
                vertices,
                view_proj,
            } => {
                let uniforms = SurfaceUniforms {
                    view_proj: view_proj.to_cols_array_2d(),
                    ..SurfaceUniforms::default()
                };
                self.queue
                    .write_buffer(&self.surface_uniforms, 0, bytemuck::bytes_of(&uniforms));
                self.surface_vertices.upload(&self.device, &self.queue, vertices);

                let mut pass = clear_pass(&mut encoder, &view, Some(&self.depth_view));
                if self.surface_vertices.len > 0 {
                    pass.set_pipeline(&self.points.pipeline);
                    pass.set_bind_group(0, &self.surface_bind_group, &[]);
                    pass.set_vertex_buffer(0, self.surface_vertices.buffer.slice(..));
                    pass.draw(0..self.surface_vertices.len, 0..1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn clear_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    depth: Option<&wgpu::TextureView>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("main_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: depth.map(|view| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}
