//! `wgpu` backend.
//!
//! [`WgpuDevice`] owns the vertex buffers and records the frame's draw list.
//! The platform backend owns the surface: on present it receives a
//! [`WgpuFrame`] and encodes it into its own render pass.
//!
//! `queue.write_buffer` lands before the next submit, so a buffer drawn from
//! earlier in the frame must not be rewritten until those draws have been
//! submitted. A mid-frame [`RenderDevice::flush`] hands the draws so far to
//! the hook with `presents == false`; the hook submits them without
//! presenting.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use canopy_core::TextureId;
use tracing::trace;

use super::RenderDevice;
use crate::batch::{PipelineState, ScissorRect, ShaderKind, TexturedVertex};
use crate::error::RenderResult;

/// WGSL source for both quad pipelines.
pub const QUAD_SHADER: &str = include_str!("quad.wgsl");

/// One draw call recorded for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    /// Index into the device's buffers.
    pub buffer: usize,
    /// Vertex range.
    pub vertices: Range<u32>,
    /// State to draw with.
    pub state: PipelineState,
}

/// Resolves pipeline state to GPU objects at encode time.
pub trait PipelineLookup {
    /// Pipeline for a shader kind.
    fn pipeline(&self, shader: ShaderKind) -> Option<&wgpu::RenderPipeline>;
    /// Bind group at group 0 (viewport uniforms).
    fn globals(&self) -> &wgpu::BindGroup;
    /// Bind group at group 1 for a texture.
    fn texture(&self, texture: TextureId) -> Option<&wgpu::BindGroup>;
}

/// A finished frame handed to the present hook.
pub struct WgpuFrame<'a> {
    /// Generation drawn.
    pub generation: u64,
    /// Draw calls in submission order.
    pub draws: &'a [RecordedDraw],
    /// Vertex buffers referenced by `draws`.
    pub buffers: &'a [wgpu::Buffer],
    /// False for a mid-frame flush: submit, but keep the surface texture.
    pub presents: bool,
}

impl<'a> WgpuFrame<'a> {
    /// Encodes every draw into `pass`. Draws whose pipeline or texture is
    /// unknown, or whose scissor is empty, are skipped.
    ///
    /// Returns the number of draws encoded.
    pub fn encode(&self, pass: &mut wgpu::RenderPass<'a>, lookup: &'a dyn PipelineLookup, target: (u32, u32)) -> usize {
        let buffers: &'a [wgpu::Buffer] = self.buffers;
        let full = ScissorRect {
            x: 0,
            y: 0,
            width: target.0,
            height: target.1,
        };
        pass.set_bind_group(0, lookup.globals(), &[]);

        let mut encoded = 0;
        let mut bound_shader = None;
        for draw in self.draws {
            let Some(buffer) = buffers.get(draw.buffer) else { continue };
            let scissor = clamp_scissor(draw.state.scissor.unwrap_or(full), target);
            if scissor.is_empty() {
                continue;
            }
            if bound_shader != Some(draw.state.shader) {
                let Some(pipeline) = lookup.pipeline(draw.state.shader) else { continue };
                pass.set_pipeline(pipeline);
                bound_shader = Some(draw.state.shader);
            }
            if draw.state.shader == ShaderKind::Textured {
                let Some(group) = lookup.texture(draw.state.texture) else { continue };
                pass.set_bind_group(1, group, &[]);
            }
            pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(draw.vertices.clone(), 0..1);
            encoded += 1;
        }
        encoded
    }
}

fn clamp_scissor(scissor: ScissorRect, target: (u32, u32)) -> ScissorRect {
    let x = scissor.x.min(target.0);
    let y = scissor.y.min(target.1);
    ScissorRect {
        x,
        y,
        width: scissor.width.min(target.0 - x),
        height: scissor.height.min(target.1 - y),
    }
}

type PresentHook = Box<dyn FnMut(&WgpuFrame<'_>) -> RenderResult<()> + Send>;

/// [`RenderDevice`] over a `wgpu` device and queue.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: Vec<wgpu::Buffer>,
    draws: Vec<RecordedDraw>,
    generation: u64,
    on_present: Option<PresentHook>,
}

impl WgpuDevice {
    /// Wraps an existing device and queue.
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            buffers: Vec::new(),
            draws: Vec::new(),
            generation: 0,
            on_present: None,
        }
    }

    /// Installs the platform's present hook.
    #[must_use]
    pub fn with_present(mut self, hook: impl FnMut(&WgpuFrame<'_>) -> RenderResult<()> + Send + 'static) -> Self {
        self.on_present = Some(Box::new(hook));
        self
    }

    /// The wrapped device.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Draw calls recorded since the frame began.
    #[must_use]
    pub fn recorded(&self) -> &[RecordedDraw] {
        &self.draws
    }

    /// The current frame, for backends that encode without a hook.
    #[must_use]
    pub fn frame(&self) -> WgpuFrame<'_> {
        WgpuFrame {
            generation: self.generation,
            draws: &self.draws,
            buffers: &self.buffers,
            presents: true,
        }
    }

    fn run_hook(&mut self, presents: bool) -> RenderResult<bool> {
        let Some(hook) = self.on_present.as_mut() else {
            return Ok(false);
        };
        hook(&WgpuFrame {
            generation: self.generation,
            draws: &self.draws,
            buffers: &self.buffers,
            presents,
        })?;
        Ok(true)
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("buffers", &self.buffers.len())
            .field("draws", &self.draws.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl RenderDevice for WgpuDevice {
    type VertexBuffer = usize;

    fn create_vertex_buffer(&mut self, size_bytes: u64) -> RenderResult<usize> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Canopy Vertex Buffer"),
            size: size_bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.buffers.push(buffer);
        Ok(self.buffers.len() - 1)
    }

    fn upload_vertices(&mut self, buffer: &usize, offset_bytes: u64, bytes: &[u8]) -> RenderResult<()> {
        let Some(target) = self.buffers.get(*buffer) else {
            return Err(crate::RenderError::Device(format!("unknown buffer {buffer}")));
        };
        self.queue.write_buffer(target, offset_bytes, bytes);
        Ok(())
    }

    fn draw(&mut self, buffer: &usize, vertices: Range<u32>, state: &PipelineState) -> RenderResult<()> {
        self.draws.push(RecordedDraw {
            buffer: *buffer,
            vertices,
            state: *state,
        });
        Ok(())
    }

    fn begin_frame(&mut self, generation: u64) -> RenderResult<()> {
        self.generation = generation;
        self.draws.clear();
        Ok(())
    }

    fn flush(&mut self) -> RenderResult<()> {
        trace!(generation = self.generation, draws = self.draws.len(), "flush");
        if !self.run_hook(false)? {
            return Err(crate::RenderError::Device(
                "reusing a vertex buffer mid-frame needs a present hook to submit earlier draws".into(),
            ));
        }
        self.draws.clear();
        Ok(())
    }

    fn present(&mut self) -> RenderResult<()> {
        trace!(generation = self.generation, draws = self.draws.len(), "present");
        self.run_hook(true)?;
        Ok(())
    }
}

/// The two quad pipelines, the viewport uniform and texture bind groups.
pub struct QuadPipelines {
    textured: wgpu::RenderPipeline,
    colour: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    globals: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    textures: HashMap<TextureId, wgpu::BindGroup>,
}

impl QuadPipelines {
    /// Builds both pipelines for `format`.
    #[must_use]
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Canopy Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Canopy Globals Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Canopy Texture Layout"),
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

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Canopy Globals"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Canopy Globals"),
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let textured_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Canopy Textured Layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let colour_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Canopy Colour Layout"),
            bind_group_layouts: &[&globals_layout],
            push_constant_ranges: &[],
        });

        let textured = build_pipeline(device, &shader, &textured_layout, "fs_textured", format);
        let colour = build_pipeline(device, &shader, &colour_layout, "fs_colour", format);

        Self {
            textured,
            colour,
            globals_buffer,
            globals,
            texture_layout,
            textures: HashMap::new(),
        }
    }

    /// Uploads the target size used to map world pixels to clip space.
    pub fn set_viewport(&self, queue: &wgpu::Queue, width: u32, height: u32) {
        let data = [width.max(1) as f32, height.max(1) as f32, 0.0, 0.0];
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::cast_slice(&data));
    }

    /// Registers a texture view under `id`.
    pub fn add_texture(
        &mut self,
        device: &wgpu::Device,
        id: TextureId,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) {
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Canopy Texture"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        self.textures.insert(id, group);
    }
}

impl PipelineLookup for QuadPipelines {
    fn pipeline(&self, shader: ShaderKind) -> Option<&wgpu::RenderPipeline> {
        Some(match shader {
            ShaderKind::Textured => &self.textured,
            ShaderKind::Colour => &self.colour,
        })
    }

    fn globals(&self) -> &wgpu::BindGroup {
        &self.globals
    }

    fn texture(&self, texture: TextureId) -> Option<&wgpu::BindGroup> {
        self.textures.get(&texture)
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    fragment: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Canopy Quad Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: &[TexturedVertex::desc()],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: fragment,
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}
