//! Error types for every tincture subsystem.
//!
//! Each concern gets its own enum so callers can match on exactly what failed;
//! [`Error`] folds them together for the host-level plumbing.

use std::path::PathBuf;

use crate::shader::Stage;

/// A specialized Result type for tincture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while turning shader text into a linked program.
///
/// None of these are fatal: the owning pass goes invalid and keeps showing
/// its last good frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader source is empty")]
    EmptySource { stage: Stage },

    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: Stage, log: String },

    #[error("program failed to link:\n{log}")]
    Link { log: String },

    #[error("cannot link without a {stage} shader attached")]
    MissingStage { stage: Stage },
}

impl ShaderError {
    /// The raw compiler or linker log, if this error carries one.
    pub fn log(&self) -> Option<&str> {
        match self {
            ShaderError::Compile { log, .. } | ShaderError::Link { log } => Some(log),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramebufferError {
    #[error("framebuffer incomplete: {reason}")]
    Incomplete { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("ffmpeg not found ({0}). Install FFmpeg: https://ffmpeg.org/download.html")]
    EncoderMissing(String),

    #[error("failed to start encoder: {0}")]
    Spawn(std::io::Error),

    #[error("failed to write frame {frame} to encoder: {source}. Encoder stderr: {stderr}")]
    Pipe {
        frame: u64,
        source: std::io::Error,
        stderr: String,
    },

    #[error("encoder exited with status {status}: {stderr}")]
    EncoderFailed { status: String, stderr: String },

    #[error("frame is {got_width}x{got_height}, recording expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("failed to save image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tincture.yaml not found")]
    NotFound,

    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid project: {0}")]
    Invalid(String),
}

/// Top-level error type encompassing all tincture subsystems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("GPU readback failed: {0}")]
    Readback(String),

    #[error("asset error: {message} ({path:?})")]
    Asset { message: String, path: PathBuf },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("surface error: {0}")]
    Present(#[from] wgpu::SurfaceError),

    #[error("unknown render pass: {0}")]
    UnknownPass(String),

    #[error("channel index {0} out of range (0..16)")]
    ChannelIndex(usize),
}

impl Error {
    /// Create an asset error for a file that could not be used.
    pub fn asset(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::Asset {
            message: message.into(),
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_carries_log() {
        let err = ShaderError::Compile {
            stage: Stage::Fragment,
            log: "ERROR: 0:3: 'x' : undeclared identifier".into(),
        };
        assert_eq!(err.log(), Some("ERROR: 0:3: 'x' : undeclared identifier"));
        assert!(err.to_string().starts_with("fragment shader failed to compile"));
    }

    #[test]
    fn shader_error_folds_into_crate_error() {
        let err: Error = ShaderError::MissingStage {
            stage: Stage::Vertex,
        }
        .into();
        assert_eq!(err.to_string(), "cannot link without a vertex shader attached");
    }
}
