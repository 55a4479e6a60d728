//! A single fullscreen render pass: program, framebuffer and channels.

use std::fmt;

use glam::{Vec3, Vec4};

use super::channel::{CHANNEL_COUNT, Channel, Channels};
use super::context::RenderContext;
use crate::diagnostics::{self, ErrorMarker};
use crate::error::{Error, ShaderError};
use crate::framebuffer::{AttachmentSpec, ClearValues, Framebuffer};
use crate::gpu::GpuContext;
use crate::shader::{
    BASE_FRAGMENT, BASE_VERTEX, PassResources, ProgramPipeline, ShaderProgram, Stage,
    UniformValue,
};

/// Color format of every pass output.
pub const PASS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Stable identity of a pass. Never reused, even after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u64);

impl PassId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Channel bindings of one pass, resolved for the current frame.
pub struct ChannelInputs {
    pub(crate) bind_group: wgpu::BindGroup,
    pub(crate) resolutions: [Vec3; CHANNEL_COUNT],
    pub(crate) times: [f32; CHANNEL_COUNT],
}

/// A fullscreen pass owning its shader program and output framebuffer.
///
/// A pass draws only while its program is valid and its framebuffer is
/// complete. When it skips a frame its previous output stays in place.
pub struct RenderPass {
    id: PassId,
    name: String,
    program: ShaderProgram,
    pipeline: Option<ProgramPipeline>,
    framebuffer: Framebuffer,
    channels: Channels,
    markers: Vec<ErrorMarker>,
}

impl RenderPass {
    /// Allocate the output and compile the default program.
    pub(crate) fn new(
        gpu: &GpuContext,
        resources: &PassResources,
        id: PassId,
        name: String,
        width: u32,
        height: u32,
    ) -> Self {
        let framebuffer = Framebuffer::new(
            gpu,
            name.clone(),
            width,
            height,
            vec![AttachmentSpec::color(PASS_FORMAT)],
        );
        let mut pass = Self {
            id,
            program: ShaderProgram::new(name.clone()),
            name,
            pipeline: None,
            framebuffer,
            channels: Channels::new(),
            markers: Vec::new(),
        };
        if let Err(err) = pass.rebuild(gpu, resources, BASE_VERTEX, BASE_FRAGMENT) {
            tracing::error!(pass = %pass.name, "default program failed to build: {err}");
        }
        pass
    }

    /// Recompile both stages and relink.
    ///
    /// On success the error markers are cleared and uniform values carried
    /// over. On failure the markers describe the problem, the pass stops
    /// drawing and its last frame stays visible.
    pub fn rebuild(
        &mut self,
        gpu: &GpuContext,
        resources: &PassResources,
        vertex: &str,
        fragment: &str,
    ) -> Result<(), ShaderError> {
        let result = self.try_rebuild(gpu, resources, vertex, fragment);
        match &result {
            Ok(()) => {
                self.markers.clear();
                tracing::info!(
                    pass = %self.name,
                    uniforms = self.program.uniforms().len(),
                    "program rebuilt"
                );
            }
            Err(err) => {
                self.markers = markers_for(err);
                tracing::warn!(pass = %self.name, markers = self.markers.len(), "{err}");
            }
        }
        result
    }

    fn try_rebuild(
        &mut self,
        gpu: &GpuContext,
        resources: &PassResources,
        vertex: &str,
        fragment: &str,
    ) -> Result<(), ShaderError> {
        self.program.attach(Stage::Vertex, vertex)?;
        self.program.attach(Stage::Fragment, fragment)?;
        let staged = self.program.stage_link()?;

        let format = self.framebuffer.color_format(0).unwrap_or(PASS_FORMAT);
        let pipeline = ProgramPipeline::new(
            gpu,
            resources,
            &self.name,
            &staged.linked,
            staged.uniforms.block_size(),
            format,
        )
        .inspect_err(|_| self.program.invalidate())?;

        self.program.commit(staged);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    /// Mutable access for setting user uniforms.
    pub fn program_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }

    pub fn is_valid(&self) -> bool {
        self.program.is_valid()
    }

    /// Markers from the most recent rebuild; empty after a success.
    pub fn markers(&self) -> &[ErrorMarker] {
        &self.markers
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Put `channel` in slot `index`, returning whatever it replaced.
    pub fn set_channel(
        &mut self,
        index: usize,
        channel: Option<Channel>,
    ) -> Result<Option<Channel>, Error> {
        self.channels
            .set(index, channel)
            .map_err(|_| Error::ChannelIndex(index))
    }

    /// The last completed frame of the first color attachment.
    pub fn output_view(&self) -> Option<&wgpu::TextureView> {
        self.framebuffer.front_view(0)
    }

    pub(crate) fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        self.framebuffer.resize(gpu, width, height);
    }

    pub(crate) fn clear_output(&mut self, encoder: &mut wgpu::CommandEncoder) {
        self.framebuffer.clear(encoder, ClearValues::default());
    }

    pub(crate) fn can_draw(&self) -> bool {
        self.program.is_valid() && self.pipeline.is_some() && self.framebuffer.is_complete()
    }

    /// Set the built-in uniforms, upload and record the draw.
    ///
    /// Returns whether anything was drawn.
    pub(crate) fn draw(&mut self, ctx: &mut RenderContext, channels: &ChannelInputs) -> bool {
        if !self.can_draw() {
            return false;
        }
        let Some(pipeline) = &self.pipeline else {
            return false;
        };

        let inputs = ctx.inputs;
        let program = &mut self.program;
        program.set_uniform(
            "iResolution",
            UniformValue::Vec3(Vec3::new(
                self.framebuffer.width() as f32,
                self.framebuffer.height() as f32,
                0.0,
            )),
        );
        program.set_uniform("iTime", UniformValue::Float(inputs.time));
        program.set_uniform("iTimeDelta", UniformValue::Float(inputs.time_delta));
        program.set_uniform("iFrameRate", UniformValue::Float(inputs.frame_rate));
        program.set_uniform("iFrame", UniformValue::Int(inputs.frame as i32));
        program.set_uniform("iMouse", UniformValue::Vec4(inputs.mouse));
        program.set_uniform_array(
            "iChannelResolution",
            &channels.resolutions.map(UniformValue::Vec3),
        );
        program.set_uniform_array("iChannelTime", &channels.times.map(UniformValue::Float));
        pipeline.upload(ctx.gpu, &program.pack_block());

        let clear = ClearValues {
            color: wgpu::Color::BLACK,
            ..Default::default()
        };
        let Some(mut render_pass) = self.framebuffer.begin(ctx.encoder, clear) else {
            return false;
        };
        pipeline.draw(&mut render_pass, ctx.resources, &channels.bind_group);
        drop(render_pass);

        self.framebuffer.swap();
        true
    }
}

fn markers_for(err: &ShaderError) -> Vec<ErrorMarker> {
    match err {
        ShaderError::Compile { stage, log } => diagnostics::parse(log, *stage),
        ShaderError::Link { log } => diagnostics::parse(log, Stage::Fragment),
        ShaderError::EmptySource { .. } | ShaderError::MissingStage { .. } => Vec::new(),
    }
}

/// Mouse state packed the way `iMouse` expects it.
pub fn mouse_uniform(x: f32, y: f32, left: bool, right: bool) -> Vec4 {
    Vec4::new(x, y, left as u8 as f32, right as u8 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_errors_become_markers_for_their_stage() {
        let err = ShaderError::Compile {
            stage: Stage::Vertex,
            log: "ERROR: 0:4: 'pos' : undeclared identifier\nERROR: 0:9: syntax error".into(),
        };
        let markers = markers_for(&err);
        let lines: Vec<usize> = markers.iter().map(|m| m.line).collect();
        assert_eq!(lines, vec![4, 9]);
        assert!(markers.iter().all(|m| m.stage == Stage::Vertex));
    }

    #[test]
    fn empty_source_has_no_markers() {
        let err = ShaderError::EmptySource {
            stage: Stage::Fragment,
        };
        assert!(markers_for(&err).is_empty());
    }

    #[test]
    fn mouse_buttons_map_to_zero_or_one() {
        assert_eq!(mouse_uniform(3.0, 4.0, true, false), Vec4::new(3.0, 4.0, 1.0, 0.0));
    }
}
