//! A loaded project: the render graph plus everything that feeds it each
//! frame. Used by both the windowed host and headless runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use glam::Vec4;

use crate::clock::Clock;
use crate::config::{ChannelSource, ProjectConfig};
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::hot_shader::HotPass;
use crate::image_loader::{DroppedFile, ImageLoader, ImageTarget};
use crate::readback::Frame;
use crate::record::{RecordSettings, Recorder, save_screenshot};
use crate::render_graph::{Channel, PassId, RenderGraph};

pub struct Session {
    graph: RenderGraph,
    hot: Vec<HotPass>,
    clock: Clock,
    loader: ImageLoader,
    /// Render the next frame even while paused.
    redraw: bool,
}

impl Session {
    /// Build every pass of `project`, wire its channels and start loading
    /// its images.
    pub fn open(gpu: &GpuContext, project: &ProjectConfig, width: u32, height: u32) -> Result<Self> {
        let mut graph = RenderGraph::new(gpu, width, height)?;
        let mut ids = HashMap::new();
        for pass in &project.passes {
            ids.insert(pass.name.as_str(), graph.create_pass_named(gpu, pass.name.clone()));
        }

        let mut hot = Vec::with_capacity(project.passes.len());
        let mut loader = ImageLoader::new();
        for pass in &project.passes {
            let id = ids[pass.name.as_str()];
            for (&index, source) in &pass.channels {
                match source {
                    ChannelSource::Pass { pass: name } => {
                        let source = ids
                            .get(name.as_str())
                            .copied()
                            .ok_or_else(|| Error::UnknownPass(name.clone()))?;
                        graph.set_channel(id, index, Some(Channel::Pass(source)))?;
                    }
                    ChannelSource::Image { image } => {
                        loader.request(project.resolve(image), ImageTarget { pass: id, channel: index });
                    }
                }
            }

            let vertex = pass.vertex.as_deref().map(|v| project.resolve(v));
            let fragment = project.resolve(&pass.fragment);
            hot.push(HotPass::attach(gpu, &mut graph, id, vertex.as_deref(), &fragment)?);
        }

        if let Some(name) = &project.selected {
            let id = ids
                .get(name.as_str())
                .copied()
                .ok_or_else(|| Error::UnknownPass(name.clone()))?;
            graph.select(id)?;
        }

        Ok(Self {
            graph,
            hot,
            clock: Clock::new(),
            loader,
            redraw: true,
        })
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// Rebuild passes whose files changed. Returns how many were rebuilt.
    pub fn check_reload(&mut self, gpu: &GpuContext) -> usize {
        let mut rebuilt = 0;
        for hot in &mut self.hot {
            if hot.check_reload(gpu, &mut self.graph) {
                rebuilt += 1;
            }
        }
        rebuilt
    }

    /// Upload images that finished decoding. With `block`, wait for all of
    /// them first. Returns how many finished.
    pub fn apply_loaded_images(&mut self, gpu: &GpuContext, block: bool) -> usize {
        let loaded = if block {
            self.loader.wait()
        } else {
            self.loader.poll()
        };
        let count = loaded.len();
        for image in loaded {
            let path = image.path.clone();
            match image.upload(gpu) {
                Ok((target, texture)) => {
                    if let Err(err) = self.graph.set_channel(
                        target.pass,
                        target.channel,
                        Some(Channel::ExternalImage(texture)),
                    ) {
                        tracing::warn!(path = %path.display(), "{err}");
                    }
                }
                Err(err) => tracing::warn!(path = %path.display(), "failed to load image: {err}"),
            }
        }
        count
    }

    /// Handle a file dropped on the window: images go to channel 0 of the
    /// selected pass.
    pub fn drop_file(&mut self, path: &Path) -> Result<()> {
        match DroppedFile::classify(path) {
            DroppedFile::Image => {
                let pass = self
                    .graph
                    .selected()
                    .ok_or_else(|| Error::asset("no pass to receive the image", path))?;
                self.loader.request(path, ImageTarget { pass, channel: 0 });
                Ok(())
            }
            DroppedFile::Model => Err(Error::asset("3D models are not supported", path)),
            DroppedFile::Unsupported => Err(Error::asset("unsupported file type", path)),
        }
    }

    /// Render one frame driven by the wall clock.
    ///
    /// While paused the graph only runs after something changed, so feedback
    /// passes hold still.
    pub fn frame(&mut self, gpu: &GpuContext, mouse: Vec4) {
        let rebuilt = self.check_reload(gpu);
        let loaded = self.apply_loaded_images(gpu, false);
        self.clock.tick(Instant::now());
        if self.clock.is_playing() || self.redraw || rebuilt > 0 || loaded > 0 {
            self.graph.execute(gpu, &self.clock.inputs(mouse));
            self.redraw = false;
        }
    }

    /// Change the preview resolution; applied on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.graph.set_resolution(width, height);
        self.redraw = true;
    }

    /// Render one frame `dt` seconds after the previous one.
    pub fn frame_fixed(&mut self, gpu: &GpuContext, dt: f32, rate: f32) {
        self.clock.advance_fixed(dt, rate);
        self.graph.execute(gpu, &self.clock.inputs(Vec4::ZERO));
    }

    /// Reset time to zero and clear all feedback buffers.
    pub fn restart(&mut self, gpu: &GpuContext) {
        self.clock.reset();
        self.graph.clear_outputs(gpu);
        self.redraw = true;
        tracing::info!("restarted");
    }

    /// Pause and move the clock by one step. The next [`Session::frame`]
    /// renders the result.
    pub fn step(&mut self, forward: bool) {
        self.clock.pause();
        if forward {
            self.clock.step_forward();
        } else {
            self.clock.step_backward();
        }
        self.redraw = true;
    }

    /// Like [`Session::step`], several steps at once.
    pub fn seek(&mut self, forward: bool) {
        self.clock.pause();
        if forward {
            self.clock.seek_forward();
        } else {
            self.clock.seek_backward();
        }
        self.redraw = true;
    }

    pub fn select_next(&mut self) -> Option<PassId> {
        let id = self.graph.select_next()?;
        self.redraw = true;
        if let Some(pass) = self.graph.pass(id) {
            tracing::info!(pass = %pass.name(), "previewing");
        }
        Some(id)
    }

    /// Save the current preview.
    pub fn screenshot(&self, gpu: &GpuContext, path: &Path) -> Result<Frame> {
        let frame = self.graph.read_preview(gpu)?;
        save_screenshot(&frame, path)?;
        Ok(frame)
    }

    /// Render a video at fixed time steps.
    ///
    /// The preview is switched to the recording resolution for the duration
    /// and the clock is rewound to where it was afterwards. Blocks until the
    /// encoder has every frame.
    pub fn record(&mut self, gpu: &GpuContext, settings: &RecordSettings) -> Result<PathBuf> {
        let mut recorder = Recorder::start(settings)?;
        let previous_size = self.graph.resolution();
        let previous_clock = self.clock.clone();

        self.graph.set_resolution(settings.width, settings.height);
        let result = self.record_frames(gpu, settings, &mut recorder);

        self.graph.set_resolution(previous_size.0, previous_size.1);
        self.clock = previous_clock;
        self.clock.resync();

        if let Err(err) = result {
            let _ = recorder.finish();
            return Err(err);
        }
        Ok(recorder.finish()?)
    }

    fn record_frames(
        &mut self,
        gpu: &GpuContext,
        settings: &RecordSettings,
        recorder: &mut Recorder,
    ) -> Result<()> {
        let step = settings.time_step();
        let total = settings.frame_count();
        for index in 0..total {
            self.frame_fixed(gpu, step, settings.fps as f32);
            let frame = self.graph.read_preview(gpu)?;
            recorder.write_frame(&frame)?;
            if index % u64::from(settings.fps.max(1)) == 0 {
                tracing::info!(frame = index, total, "recording");
            }
        }
        Ok(())
    }

    /// Render `frames` frames at 60 fps without a window.
    pub fn run_headless(&mut self, gpu: &GpuContext, frames: u64) {
        self.apply_loaded_images(gpu, true);
        for _ in 0..frames {
            self.frame_fixed(gpu, 1.0 / 60.0, 60.0);
        }
        tracing::info!(frames, "headless run finished");
    }
}
