//! Multi-pass render graph.
//!
//! A project is a list of fullscreen passes. Each pass owns a shader program
//! and a double-buffered output, and samples up to 16 channels that are
//! either images or the output of some pass (itself included).
//!
//! # Scheduling
//!
//! Passes run once per frame in creation order. Every pass reads the *front*
//! buffer of its sources and writes its own *back* buffer, then swaps:
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  Pass A  │──▶│  Pass B  │──▶│  Pass C  │──▶│ Preview  │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!   front/back     front/back     front/back     (selected pass)
//! ```
//!
//! - reading an earlier pass sees its output from this frame
//! - reading a later pass, or yourself, sees the previous frame
//! - reading a removed pass samples a black placeholder
//!
//! A pass whose program fails to build stops drawing and keeps its last
//! output, so everything downstream keeps working while the shader is
//! being fixed.

mod channel;
mod context;
mod graph;
mod render_pass;

pub use channel::{CHANNEL_COUNT, Channel, Channels};
pub use context::{FrameInputs, RenderContext};
pub use graph::RenderGraph;
pub use render_pass::{PASS_FORMAT, PassId, RenderPass, mouse_uniform};
