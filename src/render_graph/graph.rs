//! The pass scheduler: owns every pass, runs them once per frame and copies the
//! selected output into the preview.

use std::path::Path;

use glam::Vec3;

use super::channel::{CHANNEL_COUNT, Channel};
use super::context::{FrameInputs, RenderContext};
use super::render_pass::{ChannelInputs, PASS_FORMAT, PassId, RenderPass};
use crate::error::{Error, Result, ShaderError};
use crate::framebuffer::{AttachmentSpec, ClearValues, Framebuffer};
use crate::gpu::GpuContext;
use crate::readback::{self, Frame};
use crate::shader::{
    BASE_VERTEX, PREVIEW_FRAGMENT, PassResources, ProgramPipeline, ShaderProgram, Stage,
};
use crate::texture::Texture;

/// The preview surface and the program that copies a pass into it.
struct Preview {
    framebuffer: Framebuffer,
    program: ShaderProgram,
    pipeline: ProgramPipeline,
    /// Pipeline for drawing the preview onto a window surface, per format.
    present: Option<(wgpu::TextureFormat, ProgramPipeline)>,
}

impl Preview {
    fn new(gpu: &GpuContext, resources: &PassResources, width: u32, height: u32) -> Result<Self> {
        let mut program = ShaderProgram::new("Preview");
        program.attach(Stage::Vertex, BASE_VERTEX)?;
        program.attach(Stage::Fragment, PREVIEW_FRAGMENT)?;
        program.link()?;
        let pipeline = Self::pipeline(gpu, resources, &program, PASS_FORMAT)?;

        Ok(Self {
            framebuffer: Framebuffer::new(
                gpu,
                "Preview",
                width,
                height,
                vec![AttachmentSpec::color(PASS_FORMAT)],
            ),
            program,
            pipeline,
            present: None,
        })
    }

    fn pipeline(
        gpu: &GpuContext,
        resources: &PassResources,
        program: &ShaderProgram,
        format: wgpu::TextureFormat,
    ) -> Result<ProgramPipeline> {
        let linked = program.linked().ok_or(ShaderError::MissingStage {
            stage: Stage::Fragment,
        })?;
        Ok(ProgramPipeline::new(
            gpu,
            resources,
            "Preview",
            linked,
            program.uniforms().block_size(),
            format,
        )?)
    }
}

/// All render passes of a project, executed in creation order.
///
/// Passes are not sorted by their channel dependencies. A pass reading from
/// one created earlier sees that pass's output from the same frame; reading
/// from one created later (or from itself) sees the previous frame.
///
/// ```text
/// frame N:   A (reads B) ──> B (reads A) ──> preview (selected)
///            └ B@N-1          └ A@N
/// ```
///
/// # Example
///
/// ```no_run
/// use tincture::{Channel, FrameInputs, GpuContext, RenderGraph};
///
/// let gpu = GpuContext::headless(640, 360)?;
/// let mut graph = RenderGraph::new(&gpu, 640, 360)?;
/// let a = graph.create_pass(&gpu);
/// let b = graph.create_pass(&gpu);
/// graph.set_channel(b, 0, Some(Channel::Pass(a)))?;
/// graph.select(b)?;
/// graph.execute(&gpu, &FrameInputs::default());
/// let frame = graph.read_preview(&gpu)?;
/// # Ok::<(), tincture::Error>(())
/// ```
pub struct RenderGraph {
    resources: PassResources,
    passes: Vec<Option<RenderPass>>,
    selected: Option<PassId>,
    preview: Preview,
    width: u32,
    height: u32,
}

impl RenderGraph {
    /// Create an empty graph with a preview of `width` x `height`.
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self> {
        let resources = PassResources::new(gpu);
        let preview = Preview::new(gpu, &resources, width, height)?;
        Ok(Self {
            resources,
            passes: Vec::new(),
            selected: None,
            preview,
            width,
            height,
        })
    }

    pub fn resources(&self) -> &PassResources {
        &self.resources
    }

    /// Add a pass running the default program, sized to the preview.
    ///
    /// The first pass of an empty graph becomes the selected one.
    pub fn create_pass(&mut self, gpu: &GpuContext) -> PassId {
        let id = PassId(self.passes.len() as u64);
        let name = format!("FullScreenRenderPass_{}", id.0 + 1);
        self.create_named_pass(gpu, name, id)
    }

    /// Add a pass with an explicit display name.
    pub fn create_pass_named(&mut self, gpu: &GpuContext, name: impl Into<String>) -> PassId {
        let id = PassId(self.passes.len() as u64);
        self.create_named_pass(gpu, name.into(), id)
    }

    fn create_named_pass(&mut self, gpu: &GpuContext, name: String, id: PassId) -> PassId {
        let pass = RenderPass::new(gpu, &self.resources, id, name, self.width, self.height);
        tracing::info!(pass = %pass.name(), id = %id, "created render pass");
        self.passes.push(Some(pass));
        if self.selected.is_none() {
            self.selected = Some(id);
        }
        id
    }

    /// Remove a pass and release its program, framebuffer and owned images.
    ///
    /// Channels of other passes that read from it are left as they are and
    /// sample the placeholder from the next frame on.
    pub fn remove_pass(&mut self, id: PassId) -> Option<RenderPass> {
        let removed = self.passes.get_mut(id.index())?.take()?;
        tracing::info!(pass = %removed.name(), id = %id, "removed render pass");
        if self.selected == Some(id) {
            let next = self.pass_ids().next();
            self.selected = next;
        }
        Some(removed)
    }

    pub fn pass(&self, id: PassId) -> Option<&RenderPass> {
        self.passes.get(id.index())?.as_ref()
    }

    pub fn pass_mut(&mut self, id: PassId) -> Option<&mut RenderPass> {
        self.passes.get_mut(id.index())?.as_mut()
    }

    fn pass_mut_or_err(&mut self, id: PassId) -> Result<&mut RenderPass> {
        self.pass_mut(id)
            .ok_or_else(|| Error::UnknownPass(id.to_string()))
    }

    /// Live passes in execution order.
    pub fn passes(&self) -> impl Iterator<Item = &RenderPass> {
        self.passes.iter().flatten()
    }

    pub fn pass_ids(&self) -> impl Iterator<Item = PassId> + '_ {
        self.passes().map(RenderPass::id)
    }

    pub fn pass_count(&self) -> usize {
        self.passes().count()
    }

    /// Look a pass up by display name.
    pub fn find_pass(&self, name: &str) -> Option<PassId> {
        self.passes().find(|p| p.name() == name).map(RenderPass::id)
    }

    pub fn rename_pass(&mut self, id: PassId, name: impl Into<String>) -> Result<()> {
        self.pass_mut_or_err(id)?.rename(name);
        Ok(())
    }

    /// Recompile a pass from new stage sources.
    ///
    /// A shader error is returned as [`Error::Shader`]; the pass keeps its
    /// last good program and output either way.
    pub fn rebuild_pass(
        &mut self,
        gpu: &GpuContext,
        id: PassId,
        vertex: &str,
        fragment: &str,
    ) -> Result<()> {
        let pass = self
            .passes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::UnknownPass(id.to_string()))?;
        pass.rebuild(gpu, &self.resources, vertex, fragment)?;
        Ok(())
    }

    /// Replace channel `index` of pass `id`, returning the old channel.
    pub fn set_channel(
        &mut self,
        id: PassId,
        index: usize,
        channel: Option<Channel>,
    ) -> Result<Option<Channel>> {
        self.pass_mut_or_err(id)?.set_channel(index, channel)
    }

    /// Load an image from disk straight into a channel.
    pub fn set_channel_image(
        &mut self,
        gpu: &GpuContext,
        id: PassId,
        index: usize,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let texture = Texture::from_file(gpu, path)?;
        self.set_channel(id, index, Some(Channel::ExternalImage(texture)))?;
        Ok(())
    }

    pub fn selected(&self) -> Option<PassId> {
        self.selected
    }

    /// Choose which pass the preview shows.
    pub fn select(&mut self, id: PassId) -> Result<()> {
        if self.pass(id).is_none() {
            return Err(Error::UnknownPass(id.to_string()));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// Move the selection to the next live pass, wrapping around.
    pub fn select_next(&mut self) -> Option<PassId> {
        let ids: Vec<PassId> = self.pass_ids().collect();
        let next = match self.selected.and_then(|s| ids.iter().position(|&id| id == s)) {
            Some(position) => ids.get((position + 1) % ids.len()).copied(),
            None => ids.first().copied(),
        };
        self.selected = next;
        next
    }

    /// Request a new preview resolution. Applied at the start of the next
    /// [`execute`](Self::execute).
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// The resolution passes render at.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn apply_resolution(&mut self, gpu: &GpuContext) {
        let preview = &self.preview.framebuffer;
        if (preview.width(), preview.height()) == (self.width, self.height) {
            return;
        }
        tracing::debug!(width = self.width, height = self.height, "resizing passes");
        for pass in self.passes.iter_mut().flatten() {
            pass.resize(gpu, self.width, self.height);
        }
        self.preview.framebuffer.resize(gpu, self.width, self.height);
    }

    /// Render one frame: every pass in creation order, then the preview.
    pub fn execute(&mut self, gpu: &GpuContext, inputs: &FrameInputs) {
        self.apply_resolution(gpu);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("RenderGraph Encoder"),
            });

        for index in 0..self.passes.len() {
            let Some(pass) = &self.passes[index] else {
                continue;
            };
            if !pass.can_draw() {
                tracing::trace!(pass = %pass.name(), "skipping pass");
                continue;
            }
            let channels = self.resolve_channels(gpu, pass, inputs.time);

            if let Some(pass) = self.passes[index].as_mut() {
                let mut ctx = RenderContext {
                    gpu,
                    encoder: &mut encoder,
                    inputs,
                    resources: &self.resources,
                };
                pass.draw(&mut ctx, &channels);
            }
        }

        self.draw_preview(gpu, &mut encoder);
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    fn resolve_channels(&self, gpu: &GpuContext, pass: &RenderPass, time: f32) -> ChannelInputs {
        let mut views: [Option<&wgpu::TextureView>; CHANNEL_COUNT] = [None; CHANNEL_COUNT];
        let mut resolutions = [Vec3::ZERO; CHANNEL_COUNT];
        let mut times = [0.0; CHANNEL_COUNT];

        for (slot, channel) in pass.channels().iter() {
            match channel {
                Channel::ExternalImage(texture) => {
                    views[slot] = Some(texture.view());
                    resolutions[slot] = Vec3::new(texture.width as f32, texture.height as f32, 1.0);
                }
                Channel::Pass(source) => {
                    let output = self
                        .pass(*source)
                        .and_then(|p| p.output_view().map(|view| (p.framebuffer(), view)));
                    match output {
                        Some((framebuffer, view)) => {
                            views[slot] = Some(view);
                            resolutions[slot] = Vec3::new(
                                framebuffer.width() as f32,
                                framebuffer.height() as f32,
                                1.0,
                            );
                            times[slot] = time;
                        }
                        None => tracing::debug!(
                            pass = %pass.name(),
                            slot,
                            source = %source,
                            "channel source has no output, binding placeholder"
                        ),
                    }
                }
            }
        }

        ChannelInputs {
            bind_group: self.resources.channel_bind_group(
                gpu,
                &format!("{} Channels", pass.name()),
                &views,
            ),
            resolutions,
            times,
        }
    }

    fn draw_preview(&mut self, gpu: &GpuContext, encoder: &mut wgpu::CommandEncoder) {
        let source = self
            .selected
            .and_then(|id| self.pass(id))
            .and_then(RenderPass::output_view);
        let has_source = source.is_some();
        let bind_group = self
            .resources
            .channel_bind_group(gpu, "Preview Channels", &[source]);

        let preview = &mut self.preview;
        if let Some(mut render_pass) = preview.framebuffer.begin(encoder, ClearValues::default()) {
            if has_source {
                preview
                    .pipeline
                    .draw(&mut render_pass, &self.resources, &bind_group);
            }
        }
        preview.framebuffer.swap();
    }

    /// Draw the current preview onto a window surface texture.
    pub fn present(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> Result<()> {
        let stale = self.preview.present.as_ref().map(|(f, _)| *f) != Some(format);
        if stale {
            let pipeline = Preview::pipeline(gpu, &self.resources, &self.preview.program, format)?;
            self.preview.present = Some((format, pipeline));
        }
        let bind_group = self.resources.channel_bind_group(
            gpu,
            "Present Channels",
            &[self.preview.framebuffer.front_view(0)],
        );

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some((_, pipeline)) = &self.preview.present {
            pipeline.draw(&mut render_pass, &self.resources, &bind_group);
        }
        Ok(())
    }

    /// Clear every pass output and the preview, dropping feedback history.
    pub fn clear_outputs(&mut self, gpu: &GpuContext) {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear Outputs Encoder"),
            });
        for pass in self.passes.iter_mut().flatten() {
            pass.clear_output(&mut encoder);
        }
        self.preview
            .framebuffer
            .clear(&mut encoder, ClearValues::default());
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Read the preview back to the CPU as top-left-origin RGBA8.
    pub fn read_preview(&self, gpu: &GpuContext) -> Result<Frame> {
        self.read_output(gpu, &self.preview.framebuffer)
    }

    /// Read a pass's current output back to the CPU.
    pub fn read_pass(&self, gpu: &GpuContext, id: PassId) -> Result<Frame> {
        let pass = self
            .pass(id)
            .ok_or_else(|| Error::UnknownPass(id.to_string()))?;
        self.read_output(gpu, pass.framebuffer())
    }

    fn read_output(&self, gpu: &GpuContext, framebuffer: &Framebuffer) -> Result<Frame> {
        let texture = framebuffer.front_texture(0).ok_or_else(|| {
            Error::Readback(format!("{} has no color attachment", framebuffer.label()))
        })?;
        readback::read_texture(gpu, texture, framebuffer.width(), framebuffer.height())
    }
}
