use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use tracing::{debug, info, warn};
use wgpu::SurfaceError;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::Error;
use crate::scene::{Canvas, Vertex, argb_to_rgba_f32};

const SHADER: &str = r#"
struct View {
    // width, height, srgb target flag, unused
    viewport: vec4<f32>,
    // background x, y, width, height in px
    image_rect: vec4<f32>,
};

@group(0) @binding(0) var<uniform> view: View;
@group(1) @binding(0) var image_tex: texture_2d<f32>;
@group(1) @binding(1) var image_sampler: sampler;

fn to_clip(px: vec2<f32>) -> vec4<f32> {
    let ndc = px / view.viewport.xy * 2.0 - vec2<f32>(1.0, 1.0);
    return vec4<f32>(ndc.x, -ndc.y, 0.0, 1.0);
}

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let lo = c / 12.92;
    let hi = pow((c + vec3<f32>(0.055)) / 1.055, vec3<f32>(2.4));
    return select(hi, lo, c <= vec3<f32>(0.04045));
}

struct ImageOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_image(@builtin(vertex_index) idx: u32) -> ImageOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0), vec2<f32>(1.0, 0.0), vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0), vec2<f32>(1.0, 0.0), vec2<f32>(1.0, 1.0),
    );
    let uv = corners[idx];
    var out: ImageOut;
    out.pos = to_clip(view.image_rect.xy + uv * view.image_rect.zw);
    out.uv = uv;
    return out;
}

@fragment
fn fs_image(in: ImageOut) -> @location(0) vec4<f32> {
    return textureSample(image_tex, image_sampler, in.uv);
}

struct MeshIn {
    @location(0) position: vec2<f32>,
    @location(1) color: vec4<f32>,
};

struct MeshOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_mesh(in: MeshIn) -> MeshOut {
    var out: MeshOut;
    out.pos = to_clip(in.position);
    var rgb = in.color.rgb;
    if (view.viewport.z > 0.5) {
        rgb = srgb_to_linear(rgb);
    }
    out.color = vec4<f32>(rgb, in.color.a);
    return out;
}

@fragment
fn fs_mesh(in: MeshOut) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ViewUniform {
    viewport: [f32; 4],
    image_rect: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The surface was lost or outdated and has been reconfigured; draw again.
    Reconfigured,
    Skipped,
}

/// Uploaded background image; re-uploaded only when the source image changes.
struct BackgroundTexture {
    source: Arc<RgbaImage>,
    bind_group: wgpu::BindGroup,
}

/// Largest supported sample count not above `requested`, halving down to 1.
pub fn supported_sample_count(requested: u32, supported: impl Fn(u32) -> bool) -> u32 {
    let mut count = requested.max(1).next_power_of_two();
    if count > requested.max(1) {
        count /= 2;
    }
    while count > 1 && !supported(count) {
        count /= 2;
    }
    count
}

fn srgb_to_linear(c: f32) -> f64 {
    let c = f64::from(c);
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Tessellated scene geometry and the background image, drawn with MSAA when
/// the adapter supports the requested sample count.
pub struct GpuPresenter {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    sample_count: u32,
    msaa_view: Option<wgpu::TextureView>,
    view_buf: wgpu::Buffer,
    view_bind_group: wgpu::BindGroup,
    image_layout: wgpu::BindGroupLayout,
    image_pipeline: wgpu::RenderPipeline,
    mesh_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    background: Option<BackgroundTexture>,
}

impl GpuPresenter {
    pub fn new(window: Arc<Window>, num_samples: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let format_flags = adapter.get_texture_format_features(format).flags;
        let sample_count =
            supported_sample_count(num_samples, |count| format_flags.sample_count_supported(count));
        if sample_count != num_samples.max(1) {
            warn!(
                requested = num_samples,
                using = sample_count,
                ?format,
                "requested MSAA sample count unsupported; falling back",
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("wallpaper-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        let msaa_view = create_msaa_view(&device, &surface_config, sample_count);
        info!(
            width = surface_config.width,
            height = surface_config.height,
            format = ?surface_config.format,
            sample_count,
            "wallpaper surface configured",
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("wallpaper-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("background-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("view-bind-layout"),
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
        let view_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("view-uniform"),
            contents: bytemuck::bytes_of(&ViewUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let view_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("view-bind-group"),
            layout: &view_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: view_buf.as_entire_binding(),
            }],
        });
        let image_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("background-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let multisample = wgpu::MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        };
        let target = [Some(wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let image_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("background-pipeline-layout"),
            bind_group_layouts: &[&view_layout, &image_layout],
            push_constant_ranges: &[],
        });
        let image_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("background-pipeline"),
            layout: Some(&image_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_image"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample,
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_image"),
                targets: &target,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let mesh_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("particles-pipeline-layout"),
            bind_group_layouts: &[&view_layout],
            push_constant_ranges: &[],
        });
        let mesh_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("particles-pipeline"),
            layout: Some(&mesh_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_mesh"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample,
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_mesh"),
                targets: &target,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            sample_count,
            msaa_view,
            view_buf,
            view_bind_group,
            image_layout,
            image_pipeline,
            mesh_pipeline,
            sampler,
            background: None,
        })
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.reconfigure();
        debug!(
            width = self.surface_config.width,
            height = self.surface_config.height,
            "wallpaper surface resized",
        );
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.surface_config);
        self.msaa_view = create_msaa_view(&self.device, &self.surface_config, self.sample_count);
    }

    /// Presents `canvas`.
    ///
    /// With `validate` set, the frame runs inside a validation error scope and
    /// any captured error is returned. Without it, errors go to the device's
    /// uncaptured handler and are only logged.
    pub fn present(&mut self, canvas: &Canvas, validate: bool) -> Result<PresentOutcome, Error> {
        if validate {
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        }
        let outcome = self.submit(canvas);
        if validate {
            if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
                return Err(Error::Gpu(err.to_string()));
            }
            debug!("first frame validated; trusting the driver from here on");
        }
        Ok(outcome)
    }

    fn submit(&mut self, canvas: &Canvas) -> PresentOutcome {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) | Err(SurfaceError::Other) => {
                info!("wallpaper surface lost; reconfiguring");
                self.reconfigure();
                return PresentOutcome::Reconfigured;
            }
            Err(SurfaceError::Timeout) => {
                warn!("wallpaper surface acquisition timed out");
                return PresentOutcome::Skipped;
            }
            Err(SurfaceError::OutOfMemory) => {
                warn!("wallpaper surface out of memory; skipping frame");
                return PresentOutcome::Skipped;
            }
        };

        let srgb = self.surface_config.format.is_srgb();
        let mut uniform = ViewUniform {
            viewport: [
                canvas.width() as f32,
                canvas.height() as f32,
                if srgb { 1.0 } else { 0.0 },
                0.0,
            ],
            image_rect: [0.0; 4],
        };
        let background = canvas.background().map(|layer| {
            uniform.image_rect = [
                layer.x,
                layer.y,
                layer.image.width() as f32,
                layer.image.height() as f32,
            ];
            layer.image.clone()
        });
        match background {
            Some(image) => self.upload_background(image),
            None => self.background = None,
        }
        self.queue
            .write_buffer(&self.view_buf, 0, bytemuck::bytes_of(&uniform));

        let mesh = (!canvas.indices().is_empty()).then(|| {
            let vertices = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("particles-vertices"),
                    contents: bytemuck::cast_slice(canvas.vertices()),
                    usage: wgpu::BufferUsages::VERTEX,
                });
            let indices = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("particles-indices"),
                    contents: bytemuck::cast_slice(canvas.indices()),
                    usage: wgpu::BufferUsages::INDEX,
                });
            (vertices, indices, canvas.indices().len() as u32)
        });

        let [r, g, b, a] = argb_to_rgba_f32(canvas.clear_color());
        let clear = if srgb {
            wgpu::Color {
                r: srgb_to_linear(r),
                g: srgb_to_linear(g),
                b: srgb_to_linear(b),
                a: f64::from(a),
            }
        } else {
            wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }
        };

        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (view, resolve_target, store) = match self.msaa_view.as_ref() {
            Some(msaa) => (msaa, Some(&frame_view), wgpu::StoreOp::Discard),
            None => (&frame_view, None, wgpu::StoreOp::Store),
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("wallpaper-encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("wallpaper-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            rpass.set_bind_group(0, &self.view_bind_group, &[]);
            if let Some(bg) = self.background.as_ref() {
                rpass.set_pipeline(&self.image_pipeline);
                rpass.set_bind_group(1, &bg.bind_group, &[]);
                rpass.draw(0..6, 0..1);
            }
            if let Some((vertices, indices, count)) = mesh.as_ref() {
                rpass.set_pipeline(&self.mesh_pipeline);
                rpass.set_vertex_buffer(0, vertices.slice(..));
                rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(0..*count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        PresentOutcome::Presented
    }

    fn upload_background(&mut self, image: Arc<RgbaImage>) {
        if self
            .background
            .as_ref()
            .is_some_and(|bg| Arc::ptr_eq(&bg.source, &image))
        {
            return;
        }
        let (width, height) = image.dimensions();
        let format = if self.surface_config.format.is_srgb() {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("background-texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            texture.as_image_copy(),
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("background-bind-group"),
            layout: &self.image_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        debug!(width, height, "background texture uploaded");
        self.background = Some(BackgroundTexture {
            source: image,
            bind_group,
        });
    }
}

fn create_msaa_view(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    sample_count: u32,
) -> Option<wgpu::TextureView> {
    if sample_count <= 1 {
        return None;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("msaa-target"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format: config.format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    Some(texture.create_view(&wgpu::TextureViewDescriptor::default()))
}
