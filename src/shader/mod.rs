//! Shader compilation, linking and uniform introspection.
//!
//! The CPU half ([`ShaderProgram`]) compiles GLSL through naga and owns the
//! uniform table plus the value store that is carried across recompiles. The
//! GPU half ([`ProgramPipeline`]) turns a linked program into a render pipeline
//! and uploads the packed uniform block each draw.
//!
//! # Rebuild flow
//!
//! ```text
//! attach(vertex) ─┐
//!                 ├─> stage_link ─> ProgramPipeline::new ─> commit
//! attach(fragment)┘        │                 │
//!                          └── error ────────┴──> program invalid, last good state kept
//! ```

mod pipeline;
mod program;
mod reflect;
mod source;
mod uniform;

pub use pipeline::{PassResources, ProgramPipeline, QuadVertex};
pub use program::{LinkedProgram, ShaderProgram, StagedLink};
pub use reflect::CompiledStage;
pub use source::{Stage, channel_index};
pub use uniform::{UniformInfo, UniformStore, UniformTable, UniformType, UniformValue};

/// Default vertex stage: a textured fullscreen quad.
pub const BASE_VERTEX: &str = include_str!("../shaders/base.vert");

/// Default fragment stage for new passes.
pub const BASE_FRAGMENT: &str = include_str!("../shaders/base.frag");

/// Fragment stage that copies `iChannel0` to the target.
pub const PREVIEW_FRAGMENT: &str = include_str!("../shaders/preview.frag");
