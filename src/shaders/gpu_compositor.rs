// SPDX-License-Identifier: GPL-3.0-only
//! GPU compute backend for the frame compositor
//!
//! Runs `compositor.wgsl` in two compute passes (tone, then beauty) over an
//! RGBA8 input texture and reads the packed result back for presentation
//! and overlay drawing.

use super::COMPOSITOR_WGSL;
use super::uniforms::{FrameUniforms, UniformSink};
use crate::compositor::{CameraFrame, RenderBackend};
use crate::constants::compositor::WORKGROUP_SIZE;
use crate::errors::{PipelineError, PipelineResult, ShaderError};
use crate::gpu::{GpuContext, wgpu};
use tracing::{debug, info, warn};

struct Pipelines {
    tone: wgpu::ComputePipeline,
    beauty: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
}

/// Per-size resources, reallocated when the frame size changes
struct FrameResources {
    width: u32,
    height: u32,
    input_texture: wgpu::Texture,
    toned_buffer: wgpu::Buffer,
    output_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
}

/// wgpu compositor backend
pub struct GpuCompositor {
    allow_software: bool,
    context: Option<GpuContext>,
    pipelines: Option<Pipelines>,
    resources: Option<FrameResources>,
    /// Latest block from the host
    uniforms: Option<FrameUniforms>,
    /// Whether the uniform buffer holds `uniforms`
    uploaded: bool,
}

/// Workgroups needed to cover `extent` pixels along one axis
fn workgroups(extent: u32) -> u32 {
    extent.div_ceil(WORKGROUP_SIZE)
}

impl GpuCompositor {
    /// `allow_software` accepts llvmpipe-style adapters
    pub fn new(allow_software: bool) -> Self {
        Self {
            allow_software,
            context: None,
            pipelines: None,
            resources: None,
            uniforms: None,
            uploaded: false,
        }
    }

    /// Open the device if not done yet
    pub fn acquire_device(&mut self) -> PipelineResult<()> {
        if self.context.is_none() {
            let context = pollster::block_on(GpuContext::create(
                "compositor_gpu",
                self.allow_software,
            ))?;
            info!(
                adapter = %context.info.adapter_name,
                software = context.info.software,
                "Compositor using GPU"
            );
            self.context = Some(context);
        }
        Ok(())
    }

    /// Write the latest block to the GPU once pipelines exist
    fn flush_uniforms(&mut self) {
        if let (Some(context), Some(pipelines), Some(uniforms)) =
            (&self.context, &self.pipelines, &self.uniforms)
        {
            context
                .queue
                .write_buffer(&pipelines.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
            self.uploaded = true;
        }
    }

    fn context(&self) -> PipelineResult<GpuContext> {
        self.context
            .clone()
            .ok_or_else(|| PipelineError::InvalidState("GPU compositor not initialized".into()))
    }

    fn compile(device: &wgpu::Device) -> Result<Pipelines, ShaderError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("compositor_shader"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITOR_WGSL.into()),
        });

        let compilation = pollster::block_on(shader.get_compilation_info());
        let log = compilation
            .messages
            .iter()
            .map(|m| match &m.location {
                Some(loc) => format!(
                    "{}:{}: {:?}: {}",
                    loc.line_number, loc.line_position, m.message_type, m.message
                ),
                None => format!("{:?}: {}", m.message_type, m.message),
            })
            .collect::<Vec<_>>()
            .join("\n");
        let has_errors = compilation
            .messages
            .iter()
            .any(|m| m.message_type == wgpu::CompilationMessageType::Error);
        if has_errors {
            let _ = pollster::block_on(device.pop_error_scope());
            return Err(ShaderError::new("compositor.wgsl", log));
        }
        if !log.is_empty() {
            debug!(log = %log, "Compositor shader compiled with messages");
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compositor_bind_group_layout"),
            entries: &[
                // Camera frame
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Toned intermediate
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Packed RGBA output
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Frame uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compositor_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let tone = make_pipeline("tone_main");
        let beauty = make_pipeline("beauty_main");

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compositor_uniform_buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::new("compositor pipeline", error.to_string()));
        }

        Ok(Pipelines {
            tone,
            beauty,
            bind_group_layout,
            uniform_buffer,
        })
    }

    /// Ensure resources are allocated for the given dimensions
    fn ensure_resources(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if let Some(resources) = &self.resources {
            if resources.width == width && resources.height == height {
                return;
            }
        }
        if let Some(stale) = self.resources.take() {
            stale.destroy();
        }

        debug!(width, height, "Allocating compositor resources");

        let pixels = u64::from(width) * u64::from(height);
        let input_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("compositor_input_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let toned_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compositor_toned_buffer"),
            size: pixels * 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compositor_output_buffer"),
            size: pixels * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compositor_staging_buffer"),
            size: pixels * 4,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.resources = Some(FrameResources {
            width,
            height,
            input_texture,
            toned_buffer,
            output_buffer,
            staging_buffer,
        });
    }
}

impl FrameResources {
    fn destroy(self) {
        self.input_texture.destroy();
        self.toned_buffer.destroy();
        self.output_buffer.destroy();
        self.staging_buffer.destroy();
    }
}

impl UniformSink for GpuCompositor {
    fn upload_uniforms(&mut self, uniforms: &FrameUniforms) {
        // Before initialize the block is only kept for the first draw
        self.uniforms = Some(*uniforms);
        self.uploaded = false;
        self.flush_uniforms();
    }
}

impl RenderBackend for GpuCompositor {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn initialize(&mut self) -> PipelineResult<()> {
        self.acquire_device()?;
        let context = self.context()?;

        let pipelines = Self::compile(&context.device).map_err(|e| {
            warn!(stage = %e.stage, log = %e.log, "Compositor shader failed to compile");
            PipelineError::Shader(e)
        })?;
        self.pipelines = Some(pipelines);

        self.uploaded = false;
        self.flush_uniforms();
        info!("GPU compositor initialized");
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!(width, height, "GPU compositor viewport resized");
    }

    fn draw(&mut self, frame: &CameraFrame) -> PipelineResult<Vec<u8>> {
        let (width, height) = (frame.width, frame.height);
        let context = self.context()?;
        if self.pipelines.is_none() {
            return Err(PipelineError::InvalidState("GPU compositor not initialized".into()));
        }
        frame.check_layout()?;

        let Some(mut uniforms) = self.uniforms.filter(|u| !u.is_passthrough()) else {
            return Ok(frame.data.to_vec());
        };
        // The shader bounds-checks against the block's size, not the frame's
        if (uniforms.width, uniforms.height) != (width, height) {
            uniforms.width = width;
            uniforms.height = height;
            self.uniforms = Some(uniforms);
            self.uploaded = false;
        }
        if !self.uploaded {
            self.flush_uniforms();
        }

        let (device, queue) = (&context.device, &context.queue);
        self.ensure_resources(device, width, height);

        let pipelines = self
            .pipelines
            .as_ref()
            .ok_or_else(|| PipelineError::InvalidState("GPU compositor not initialized".into()))?;
        let resources = self
            .resources
            .as_ref()
            .ok_or_else(|| PipelineError::Gpu("Frame resources not allocated".into()))?;

        // Upload camera frame
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &resources.input_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let input_view = resources
            .input_texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("compositor_bind_group"),
            layout: &pipelines.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.toned_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: pipelines.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("compositor_encoder"),
        });

        let (groups_x, groups_y) = (workgroups(width), workgroups(height));
        // Separate passes so the beauty pass sees the whole toned image
        for (label, pipeline) in [
            ("compositor_tone_pass", &pipelines.tone),
            ("compositor_beauty_pass", &pipelines.beauty),
        ] {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, Some(&bind_group), &[]);
            compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        let output_size = u64::from(width) * u64::from(height) * 4;
        encoder.copy_buffer_to_buffer(
            &resources.output_buffer,
            0,
            &resources.staging_buffer,
            0,
            output_size,
        );
        queue.submit(std::iter::once(encoder.finish()));

        pollster::block_on(context.read_back(&resources.staging_buffer))
    }

    fn release(&mut self) {
        // Drop order: per-frame resources, pipelines, then the device
        if let Some(resources) = self.resources.take() {
            resources.destroy();
        }
        if let Some(pipelines) = self.pipelines.take() {
            pipelines.uniform_buffer.destroy();
        }
        self.uploaded = false;
        if let Some(context) = self.context.take() {
            context.wait_idle();
        }
        info!("GPU compositor released");
    }
}
