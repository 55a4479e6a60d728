//! # Tincture
//!
//! **A live shader editor for multi-pass GLSL.**
//!
//! A project is a handful of fullscreen passes. Each pass runs a fragment
//! shader written against Shadertoy-style built-ins (`iTime`, `iResolution`,
//! `iMouse`, `iChannel0..15`, ...) and can sample images or the output of any
//! pass, including its own previous frame. Save a shader and it is rebuilt on
//! the next frame; if it fails, the pass keeps showing its last good output
//! and the errors are reported per line.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tincture::{Channel, FrameInputs, GpuContext, RenderGraph};
//!
//! let gpu = GpuContext::headless(640, 360)?;
//! let mut graph = RenderGraph::new(&gpu, 640, 360)?;
//!
//! let feedback = graph.create_pass(&gpu);
//! graph.rebuild_pass(
//!     &gpu,
//!     feedback,
//!     tincture::shader::BASE_VERTEX,
//!     r#"#version 450
//!        layout(location = 0) in vec2 uv;
//!        layout(location = 0) out vec4 color;
//!        uniform float iTime;
//!        void main() {
//!            vec4 last = texture(iChannel0, uv);
//!            color = mix(last, vec4(uv, 0.5 + 0.5 * sin(iTime), 1.0), 0.1);
//!        }"#,
//! )?;
//! graph.set_channel(feedback, 0, Some(Channel::Pass(feedback)))?;
//!
//! for frame in 0..60 {
//!     let inputs = FrameInputs {
//!         time: frame as f32 / 60.0,
//!         frame,
//!         ..Default::default()
//!     };
//!     graph.execute(&gpu, &inputs);
//! }
//! let frame = graph.read_preview(&gpu)?;
//! # Ok::<(), tincture::Error>(())
//! ```
//!
//! ## Layout
//!
//! - [`shader`]: GLSL compile, link, uniform reflection and value store
//! - [`RenderGraph`] / [`RenderPass`]: scheduling, channels, double buffering
//! - [`Framebuffer`]: attachment sets with completeness checks
//! - [`diagnostics`]: compiler logs to per-line markers
//! - [`Session`] and [`run`]: the live editor around all of the above

mod app;
mod cli;
mod clock;
pub mod config;
pub mod diagnostics;
mod error;
mod framebuffer;
mod gpu;
mod hot_shader;
mod image_loader;
mod input;
mod readback;
mod record;
mod render_graph;
mod session;
pub mod shader;
mod texture;

pub use app::{AppConfig, run};
pub use cli::CliArgs;
pub use clock::Clock;
pub use config::{ChannelSource, PassConfig, ProjectConfig};
pub use diagnostics::ErrorMarker;
pub use error::{ConfigError, Error, FramebufferError, RecordError, Result, ShaderError};
pub use framebuffer::{
    AttachmentKind, AttachmentSpec, ClearValues, Framebuffer, FramebufferLimits, check_complete,
};
pub use gpu::GpuContext;
pub use hot_shader::{HotPass, HotShader};
pub use image_loader::{DroppedFile, ImageLoader, ImageTarget, LoadedImage};
pub use input::Input;
pub use readback::{Frame, read_texture};
pub use record::{
    FRAME_RATE_PRESETS, RESOLUTION_PRESETS, RecordSettings, Recorder, save_screenshot,
};
pub use render_graph::{
    CHANNEL_COUNT, Channel, Channels, FrameInputs, PASS_FORMAT, PassId,
    RenderContext, RenderGraph, RenderPass, mouse_uniform,
};
pub use session::Session;
pub use shader::{ShaderProgram, Stage, UniformType, UniformValue};
pub use texture::{DecodedImage, Texture};

// Re-export glam math types for convenience
pub use glam::{Vec2, Vec3, Vec4};
