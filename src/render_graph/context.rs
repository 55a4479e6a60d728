//! Per-frame inputs and the execution context handed to each pass.

use glam::Vec4;

use crate::gpu::GpuContext;
use crate::shader::PassResources;

/// Everything a frame's built-in uniforms are computed from.
///
/// Produced by the host (clock + input) once per frame and passed down
/// explicitly; nothing in the render graph reads global state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInputs {
    /// Playback time in seconds (`iTime`).
    pub time: f32,
    /// Seconds since the previous frame (`iTimeDelta`).
    pub time_delta: f32,
    /// Frames rendered since the last reset (`iFrame`).
    pub frame: u64,
    /// Measured frames per second (`iFrameRate`).
    pub frame_rate: f32,
    /// Cursor position and button state: `(x, y, left, right)` (`iMouse`).
    pub mouse: Vec4,
}

/// Execution context passed to each render pass during graph traversal.
///
/// The `'a` lifetime ties all references to the frame's scope, so passes
/// cannot hold onto the encoder beyond the current frame.
pub struct RenderContext<'a> {
    /// GPU context providing access to device, queue, and configuration.
    pub gpu: &'a GpuContext,
    /// Command encoder for recording render pass commands.
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Clock and input state for this frame.
    pub inputs: &'a FrameInputs,
    /// Layouts and the fullscreen quad shared by every pass.
    pub resources: &'a PassResources,
}
