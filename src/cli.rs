use std::path::PathBuf;

use clap::Parser;

use crate::app::AppConfig;
use crate::config::{ProjectConfig, find_config, load_config};
use crate::error::{ConfigError, Result};
use crate::record::RecordSettings;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "tincture", version, about = "Live multi-pass GLSL shader editor")]
pub struct CliArgs {
    /// Project file or directory containing tincture.yaml
    pub project: Option<PathBuf>,

    /// Open a single fragment shader instead of a project
    #[arg(long, conflicts_with = "project")]
    pub shader: Option<PathBuf>,

    /// Preview width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Preview height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Record this many seconds of video, then exit
    #[arg(long, value_name = "SECONDS")]
    pub record: Option<f32>,

    /// Video output path (default: recording.mp4 in the project's output directory)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Recording frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Shader seconds per recorded second
    #[arg(long, default_value_t = 1.0)]
    pub speed: f32,

    /// Render one frame and save it as an image
    #[arg(long, value_name = "PATH")]
    pub screenshot: Option<PathBuf>,

    /// Render this many frames without a window, then exit
    #[arg(long, value_name = "FRAMES")]
    pub headless: Option<u64>,

    /// Disable vsync
    #[arg(long)]
    pub no_vsync: bool,
}

impl CliArgs {
    /// The project to open: `--shader`, an explicit path, or `tincture.yaml`
    /// found from the working directory upwards.
    pub fn load_project(&self) -> Result<ProjectConfig> {
        if let Some(shader) = &self.shader {
            return Ok(ProjectConfig::single(shader.clone()));
        }
        let path = match &self.project {
            Some(path) => path.clone(),
            None => {
                let cwd = std::env::current_dir()?;
                find_config(&cwd).ok_or(ConfigError::NotFound)?
            }
        };
        Ok(load_config(&path)?)
    }

    /// Preview size from the flags, falling back to the project, then 1280x720.
    pub fn preview_size(&self, project: &ProjectConfig) -> (u32, u32) {
        let [pw, ph] = project.preview.unwrap_or([1280, 720]);
        (self.width.unwrap_or(pw), self.height.unwrap_or(ph))
    }

    pub fn app_config(&self, project: &ProjectConfig) -> AppConfig {
        let (width, height) = self.preview_size(project);
        AppConfig::new()
            .size(width, height)
            .vsync(!self.no_vsync)
    }

    /// Recording parameters, if `--record` was given.
    pub fn record_settings(&self, project: &ProjectConfig) -> Option<RecordSettings> {
        let seconds = self.record?;
        let (width, height) = self.preview_size(project);
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| project.resolve(&project.recording.output).join("recording.mp4"));
        Some(RecordSettings {
            output,
            width,
            height,
            fps: self.fps.unwrap_or(project.recording.fps),
            speed: self.speed,
            seconds,
            ffmpeg: project.recording.ffmpeg.clone(),
        })
    }
}
