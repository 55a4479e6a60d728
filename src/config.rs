//! `tincture.yaml` project files.
//!
//! ```yaml
//! preview: [1280, 720]
//! selected: Image
//! passes:
//!   - name: Buffer A
//!     fragment: buffer_a.frag
//!     channels:
//!       0: { pass: Buffer A }
//!       1: { image: textures/noise.png }
//!   - name: Image
//!     vertex: quad.vert
//!     fragment: image.frag
//!     channels:
//!       0: { pass: Buffer A }
//! recording:
//!   fps: 30
//!   output: renders
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::render_graph::CHANNEL_COUNT;

/// File name looked up by [`find_config`].
pub const CONFIG_FILE: &str = "tincture.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub passes: Vec<PassConfig>,
    /// Name of the pass shown in the preview. Defaults to the first pass.
    #[serde(default)]
    pub selected: Option<String>,
    /// Preview resolution `[width, height]`.
    #[serde(default)]
    pub preview: Option<[u32; 2]>,
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Directory relative paths are resolved against. Filled in on load.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassConfig {
    pub name: String,
    /// Vertex shader file; the built-in fullscreen shader when absent.
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    pub fragment: PathBuf,
    #[serde(default)]
    pub channels: BTreeMap<usize, ChannelSource>,
}

/// What a channel slot reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelSource {
    Image { image: PathBuf },
    Pass { pass: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub ffmpeg: PathBuf,
    pub fps: u32,
    pub output: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            fps: 60,
            output: PathBuf::from("."),
        }
    }
}

impl ProjectConfig {
    /// A one-pass project around a single fragment shader.
    pub fn single(fragment: impl Into<PathBuf>) -> Self {
        Self {
            passes: vec![PassConfig {
                name: "Image".to_string(),
                vertex: None,
                fragment: fragment.into(),
                channels: BTreeMap::new(),
            }],
            selected: None,
            preview: None,
            recording: RecordingConfig::default(),
            root: PathBuf::new(),
        }
    }

    /// Resolve a path from the file against the project directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Check names and channel references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.passes.is_empty() {
            return Err(ConfigError::Invalid("project has no passes".into()));
        }
        let mut names = HashSet::new();
        for pass in &self.passes {
            if !names.insert(pass.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate pass name '{}'",
                    pass.name
                )));
            }
        }
        for pass in &self.passes {
            for (&index, source) in &pass.channels {
                if index >= CHANNEL_COUNT {
                    return Err(ConfigError::Invalid(format!(
                        "pass '{}' uses channel {index}, only 0..{CHANNEL_COUNT} exist",
                        pass.name
                    )));
                }
                if let ChannelSource::Pass { pass: source } = source {
                    if !names.contains(source.as_str()) {
                        return Err(ConfigError::Invalid(format!(
                            "pass '{}' channel {index} reads unknown pass '{source}'",
                            pass.name
                        )));
                    }
                }
            }
        }
        if let Some(selected) = &self.selected {
            if !names.contains(selected.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "selected pass '{selected}' does not exist"
                )));
            }
        }
        if let Some([w, h]) = self.preview {
            if w == 0 || h == 0 {
                return Err(ConfigError::Invalid(format!("preview size {w}x{h} is empty")));
            }
        }
        Ok(())
    }
}

/// Walk up from `start` looking for `tincture.yaml`.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// Parse project YAML. `root` is where relative paths point.
pub fn parse_config(yaml: &str, root: &Path, path: &Path) -> Result<ProjectConfig, ConfigError> {
    let mut config: ProjectConfig =
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.root = root.to_path_buf();
    config.validate()?;
    Ok(config)
}

/// Load a project from a file, or from `tincture.yaml` inside a directory.
pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let file = if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    };
    if !file.exists() {
        return Err(ConfigError::NotFound);
    }
    let contents = std::fs::read_to_string(&file).map_err(|source| ConfigError::Io {
        path: file.clone(),
        source,
    })?;
    let root = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let config = parse_config(&contents, &root, &file)?;
    tracing::info!(path = %file.display(), passes = config.passes.len(), "loaded project");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"
preview: [640, 360]
selected: Image
passes:
  - name: Buffer A
    fragment: a.frag
    channels:
      0: { pass: Buffer A }
      2: { image: noise.png }
  - name: Image
    vertex: quad.vert
    fragment: image.frag
    channels:
      0: { pass: Buffer A }
recording:
  fps: 30
"#;

    #[test]
    fn parses_passes_and_channels() {
        let config = parse_config(PROJECT, Path::new("proj"), Path::new("proj/tincture.yaml"))
            .unwrap();
        assert_eq!(config.passes.len(), 2);
        assert_eq!(config.preview, Some([640, 360]));
        assert_eq!(config.recording.fps, 30);
        assert_eq!(config.recording.ffmpeg, PathBuf::from("ffmpeg"));

        let a = &config.passes[0];
        assert_eq!(
            a.channels[&0],
            ChannelSource::Pass {
                pass: "Buffer A".into()
            }
        );
        assert_eq!(
            a.channels[&2],
            ChannelSource::Image {
                image: "noise.png".into()
            }
        );
        assert_eq!(
            config.resolve(&config.passes[1].fragment),
            Path::new("proj").join("image.frag")
        );
    }

    #[test]
    fn rejects_unknown_channel_pass() {
        let yaml = "passes:\n  - name: A\n    fragment: a.frag\n    channels:\n      0: { pass: B }\n";
        let err = parse_config(yaml, Path::new("."), Path::new("t.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("unknown pass 'B'")));
    }

    #[test]
    fn rejects_out_of_range_channel() {
        let yaml = "passes:\n  - name: A\n    fragment: a.frag\n    channels:\n      16: { image: x.png }\n";
        assert!(parse_config(yaml, Path::new("."), Path::new("t.yaml")).is_err());
    }

    #[test]
    fn rejects_duplicate_names_and_empty_projects() {
        let dup = "passes:\n  - { name: A, fragment: a.frag }\n  - { name: A, fragment: b.frag }\n";
        assert!(parse_config(dup, Path::new("."), Path::new("t.yaml")).is_err());
        assert!(parse_config("passes: []\n", Path::new("."), Path::new("t.yaml")).is_err());
    }

    #[test]
    fn finds_config_in_parent_directories() {
        let root = std::env::temp_dir().join(format!("tincture-cfg-{}", std::process::id()));
        let nested = root.join("shaders/deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "passes: []\n").unwrap();

        assert_eq!(find_config(&nested), Some(root.join(CONFIG_FILE)));
        assert!(matches!(load_config(&root), Err(ConfigError::Invalid(_))));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn single_shader_project_is_valid() {
        assert!(ProjectConfig::single("main.frag").validate().is_ok());
    }
}
