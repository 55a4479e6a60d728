//! Video recording through an external FFmpeg process, and screenshots.
//!
//! Frames are written as raw RGBA8 into the encoder's stdin. The write is
//! blocking: a slow encoder stalls the render loop until it catches up.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::error::RecordError;
use crate::readback::Frame;

/// Resolutions offered for recording, as `(label, width, height)`.
pub const RESOLUTION_PRESETS: [(&str, u32, u32); 4] = [
    ("480p", 854, 480),
    ("720p", 1280, 720),
    ("1080p", 1920, 1080),
    ("4K", 3840, 2160),
];

/// Frame rates offered for recording.
pub const FRAME_RATE_PRESETS: [u32; 3] = [24, 30, 60];

/// Parameters of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSettings {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Playback speed: shader seconds per recorded second.
    pub speed: f32,
    /// Recording length in recorded seconds.
    pub seconds: f32,
    /// FFmpeg executable to run.
    pub ffmpeg: PathBuf,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("recording.mp4"),
            width: 1280,
            height: 720,
            fps: 60,
            speed: 1.0,
            seconds: 10.0,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl RecordSettings {
    /// Shader time advanced per recorded frame.
    pub fn time_step(&self) -> f32 {
        self.speed / self.fps.max(1) as f32
    }

    /// Number of frames the recording will contain.
    pub fn frame_count(&self) -> u64 {
        (self.seconds.max(0.0) * self.fps as f32).round() as u64
    }

    /// Arguments passed to FFmpeg, output path last.
    ///
    /// Only errors reach stderr, so the pipe cannot fill up while frames are
    /// still being written.
    pub fn encoder_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("{}x{}", self.width, self.height));
        args.extend(["-r".to_string(), self.fps.to_string(), "-i".into(), "-".into()]);
        args.extend(
            ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "medium", "-crf", "23"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(self.output.display().to_string());
        args
    }
}

/// A running FFmpeg process accepting raw frames.
pub struct Recorder {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    frames: u64,
    output: PathBuf,
}

impl Recorder {
    /// Check if the encoder can be started at all.
    pub fn is_available(ffmpeg: &Path) -> bool {
        Command::new(ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Spawn the encoder for `settings`.
    pub fn start(settings: &RecordSettings) -> Result<Self, RecordError> {
        if !Self::is_available(&settings.ffmpeg) {
            return Err(RecordError::EncoderMissing(
                settings.ffmpeg.display().to_string(),
            ));
        }
        if let Some(parent) = settings.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(RecordError::Spawn)?;
        }

        let mut child = Command::new(&settings.ffmpeg)
            .args(settings.encoder_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RecordError::Spawn)?;
        let stdin = child.stdin.take();

        tracing::info!(
            output = %settings.output.display(),
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            "recording started"
        );

        Ok(Self {
            child,
            stdin,
            width: settings.width,
            height: settings.height,
            frames: 0,
            output: settings.output.clone(),
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Write one frame, blocking until the encoder has taken it.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), RecordError> {
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(RecordError::FrameSize {
                width: self.width,
                height: self.height,
                got_width: frame.width,
                got_height: frame.height,
            });
        }
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(&frame.data),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder stdin closed",
            )),
        };
        if let Err(source) = result {
            self.stdin = None;
            return Err(RecordError::Pipe {
                frame: self.frames,
                source,
                stderr: self.collect_stderr(),
            });
        }
        self.frames += 1;
        Ok(())
    }

    /// Close the pipe and wait for the encoder to finish the file.
    pub fn finish(mut self) -> Result<PathBuf, RecordError> {
        drop(self.stdin.take());
        let output = self.child.wait_with_output().map_err(RecordError::Spawn)?;
        if !output.status.success() {
            return Err(RecordError::EncoderFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        tracing::info!(
            output = %self.output.display(),
            frames = self.frames,
            "recording finished"
        );
        Ok(self.output)
    }

    fn collect_stderr(&mut self) -> String {
        use std::io::Read;

        let _ = self.child.wait();
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        stderr
    }
}

/// Save a frame as an image, format chosen from the extension.
pub fn save_screenshot(frame: &Frame, path: &Path) -> Result<(), RecordError> {
    image::save_buffer(
        path,
        &frame.data,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgba8,
    )?;
    tracing::info!(path = %path.display(), "screenshot saved");
    Ok(())
}

/// A timestamped screenshot name like `tincture_1700000000.png`.
pub fn screenshot_name() -> PathBuf {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    PathBuf::from(format!("tincture_{secs}.png"))
}
