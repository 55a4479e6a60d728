//! GPU side of a linked program: render pipeline, uniform buffer and the
//! layouts shared by every pass.

use std::borrow::Cow;

use wgpu::util::DeviceExt;

use super::program::LinkedProgram;
use super::source::CHANNEL_SAMPLER_BINDING;
use crate::error::ShaderError;
use crate::gpu::GpuContext;
use crate::render_graph::CHANNEL_COUNT;
use crate::texture::Texture;

/// Vertex of the fullscreen quad every pass draws.
///
/// Location 0 is a clip-space `vec4` position, location 1 a `vec2` texture
/// coordinate with `(0, 0)` in the top-left corner.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 4],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

const QUAD: [QuadVertex; 6] = [
    QuadVertex { position: [-1.0, -1.0, 0.0, 1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [1.0, -1.0, 0.0, 1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [1.0, 1.0, 0.0, 1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0, 0.0, 1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [1.0, 1.0, 0.0, 1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, 1.0, 0.0, 1.0], uv: [0.0, 0.0] },
];

/// Layouts, sampler, quad and placeholder shared by all passes.
pub struct PassResources {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub channel_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub sampler: wgpu::Sampler,
    pub quad: wgpu::Buffer,
    pub placeholder: Texture,
}

impl PassResources {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Uniform Layout"),
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

        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..CHANNEL_COUNT as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: CHANNEL_SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Channel Layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &channel_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Channel Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            uniform_layout,
            channel_layout,
            pipeline_layout,
            sampler,
            quad,
            placeholder: Texture::placeholder(gpu),
        }
    }

    /// Bind `views` to channel slots 0..16, using the placeholder for gaps.
    pub fn channel_bind_group(
        &self,
        gpu: &GpuContext,
        label: &str,
        views: &[Option<&wgpu::TextureView>],
    ) -> wgpu::BindGroup {
        let mut entries: Vec<wgpu::BindGroupEntry> = (0..CHANNEL_COUNT)
            .map(|slot| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: wgpu::BindingResource::TextureView(
                    views
                        .get(slot)
                        .copied()
                        .flatten()
                        .unwrap_or(self.placeholder.view()),
                ),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: CHANNEL_SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.channel_layout,
            entries: &entries,
        })
    }
}

/// A render pipeline plus uniform buffer built from one linked program.
pub struct ProgramPipeline {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

impl ProgramPipeline {
    /// Build the pipeline for `linked`, rendering into `format`.
    ///
    /// Validation failures are caught with an error scope and reported as a
    /// link error, leaving the caller free to keep its previous pipeline.
    pub fn new(
        gpu: &GpuContext,
        resources: &PassResources,
        label: &str,
        linked: &LinkedProgram,
        block_size: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self, ShaderError> {
        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} Vertex")),
            source: wgpu::ShaderSource::Naga(Cow::Owned(linked.vertex.module.clone())),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{label} Fragment")),
            source: wgpu::ShaderSource::Naga(Cow::Owned(linked.fragment.module.clone())),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&resources.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Link {
                log: format!("ERROR: {}", err.to_string().replace('\n', " ")),
            });
        }

        // Uniform buffers must be non-empty and 16-byte sized.
        let size = (block_size.max(16) as u64).next_multiple_of(16);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} Uniforms")),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label} Uniform Bind Group")),
            layout: &resources.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Ok(Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
        })
    }

    /// Upload a packed uniform block.
    pub fn upload(&self, gpu: &GpuContext, block: &[u8]) {
        if !block.is_empty() {
            gpu.queue.write_buffer(&self.uniform_buffer, 0, block);
        }
    }

    /// Record the fullscreen draw.
    pub fn draw(
        &self,
        render_pass: &mut wgpu::RenderPass,
        resources: &PassResources,
        channels: &wgpu::BindGroup,
    ) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, channels, &[]);
        render_pass.set_vertex_buffer(0, resources.quad.slice(..));
        render_pass.draw(0..QUAD.len() as u32, 0..1);
    }
}
