use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::diagnostics;
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::render_graph::{PassId, RenderGraph};
use crate::shader::{BASE_VERTEX, Stage};

/// A shader source that can be hot-reloaded from disk.
pub struct HotShader {
    path: PathBuf,
    last_modified: SystemTime,
    source: String,
}

impl HotShader {
    /// Load a shader from the given file path.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let source = fs::read_to_string(&path)?;
        let last_modified = fs::metadata(&path)?.modified()?;

        Ok(Self {
            path,
            last_modified,
            source,
        })
    }

    /// Check if the shader file has been modified and reload if so.
    /// Returns `true` if the shader was reloaded.
    pub fn check_reload(&mut self) -> bool {
        let Ok(metadata) = fs::metadata(&self.path) else {
            return false;
        };

        let Ok(modified) = metadata.modified() else {
            return false;
        };

        if modified != self.last_modified {
            if let Ok(source) = fs::read_to_string(&self.path) {
                self.source = source;
                self.last_modified = modified;
                return true;
            }
        }

        false
    }

    /// Get the current shader source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the shader file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The shader files behind one render pass.
///
/// Without a vertex file the pass uses the built-in fullscreen vertex shader.
/// Whenever either file changes both stages are resubmitted; a failed build
/// leaves the pass showing its last good frame and reports each marker as
/// `file:line: message`.
pub struct HotPass {
    pass: PassId,
    vertex: Option<HotShader>,
    fragment: HotShader,
}

impl HotPass {
    /// Watch `fragment` (and optionally `vertex`) for `pass`, and build once.
    pub fn attach(
        gpu: &GpuContext,
        graph: &mut RenderGraph,
        pass: PassId,
        vertex: Option<&Path>,
        fragment: &Path,
    ) -> Result<Self> {
        let read = |path: &Path| {
            HotShader::new(path).map_err(|e| Error::asset(e.to_string(), path))
        };
        let hot = Self {
            pass,
            vertex: vertex.map(read).transpose()?,
            fragment: read(fragment)?,
        };
        hot.rebuild(gpu, graph);
        Ok(hot)
    }

    pub fn pass(&self) -> PassId {
        self.pass
    }

    pub fn fragment_path(&self) -> &Path {
        self.fragment.path()
    }

    pub fn vertex_path(&self) -> Option<&Path> {
        self.vertex.as_ref().map(HotShader::path)
    }

    /// Poll both files; rebuild if either changed. Returns whether a rebuild
    /// was attempted.
    pub fn check_reload(&mut self, gpu: &GpuContext, graph: &mut RenderGraph) -> bool {
        let vertex_changed = self.vertex.as_mut().is_some_and(HotShader::check_reload);
        let fragment_changed = self.fragment.check_reload();
        if !(vertex_changed || fragment_changed) {
            return false;
        }
        tracing::info!(path = %self.fragment.path().display(), "reloading shader");
        self.rebuild(gpu, graph);
        true
    }

    /// Submit the current file contents. Returns whether the build succeeded.
    pub fn rebuild(&self, gpu: &GpuContext, graph: &mut RenderGraph) -> bool {
        let vertex = self.vertex.as_ref().map_or(BASE_VERTEX, HotShader::source);
        match graph.rebuild_pass(gpu, self.pass, vertex, self.fragment.source()) {
            Ok(()) => true,
            Err(err) => {
                self.report(graph, &err);
                false
            }
        }
    }

    fn report(&self, graph: &RenderGraph, err: &Error) {
        let Some(pass) = graph.pass(self.pass) else {
            tracing::error!("{err}");
            return;
        };
        let markers = pass.markers();
        if markers.is_empty() {
            tracing::warn!(pass = %pass.name(), "{err}");
            return;
        }
        let path_of = |stage: Stage| match (stage, &self.vertex) {
            (Stage::Vertex, Some(vertex)) => vertex.path().display().to_string(),
            (Stage::Vertex, None) => "<builtin vertex>".to_string(),
            (Stage::Fragment, _) => self.fragment.path().display().to_string(),
        };
        for stage in [Stage::Vertex, Stage::Fragment] {
            let of_stage: Vec<_> = markers.iter().filter(|m| m.stage == stage).cloned().collect();
            if !of_stage.is_empty() {
                tracing::warn!(
                    "\n{}",
                    diagnostics::format_markers(&path_of(stage), &of_stage)
                );
            }
        }
    }
}
