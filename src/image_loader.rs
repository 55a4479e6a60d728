//! Background image decoding for channel inputs.
//!
//! Decoding runs on the rayon pool; finished images come back over a channel
//! and are uploaded on the render thread by [`ImageLoader::poll`].

use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};

use crate::error::Error;
use crate::gpu::GpuContext;
use crate::render_graph::PassId;
use crate::texture::{DecodedImage, Texture};

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "tga", "gif", "hdr"];
const MODEL_EXTENSIONS: [&str; 5] = ["obj", "fbx", "gltf", "glb", "stl"];

/// What a dropped file looks like, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroppedFile {
    Image,
    Model,
    Unsupported,
}

impl DroppedFile {
    pub fn classify(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return DroppedFile::Unsupported;
        };
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            DroppedFile::Image
        } else if MODEL_EXTENSIONS.contains(&ext.as_str()) {
            DroppedFile::Model
        } else {
            DroppedFile::Unsupported
        }
    }
}

/// Where a decoded image should end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTarget {
    pub pass: PassId,
    pub channel: usize,
}

/// An image ready to upload, or the reason it failed.
pub struct LoadedImage {
    pub target: ImageTarget,
    pub path: PathBuf,
    pub result: Result<DecodedImage, Error>,
}

impl LoadedImage {
    /// Upload the decoded pixels.
    pub fn upload(self, gpu: &GpuContext) -> Result<(ImageTarget, Texture), Error> {
        let image = self.result?;
        let label = self.path.display().to_string();
        Ok((self.target, Texture::from_image(gpu, &image, &label)))
    }
}

/// Decodes images off the render thread.
pub struct ImageLoader {
    tx: Sender<LoadedImage>,
    rx: Receiver<LoadedImage>,
    in_flight: usize,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Queue `path` for decoding into `target`.
    pub fn request(&mut self, path: impl Into<PathBuf>, target: ImageTarget) {
        let path = path.into();
        let tx = self.tx.clone();
        self.in_flight += 1;
        tracing::debug!(path = %path.display(), pass = %target.pass, channel = target.channel, "decoding image");

        rayon::spawn(move || {
            let result = DecodedImage::open(&path).map_err(Error::from);
            let _ = tx.send(LoadedImage {
                target,
                path,
                result,
            });
        });
    }

    /// Images still being decoded.
    pub fn pending(&self) -> usize {
        self.in_flight
    }

    /// Take every image that finished decoding since the last call.
    pub fn poll(&mut self) -> Vec<LoadedImage> {
        let done: Vec<_> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(done.len());
        done
    }

    /// Block until all queued images are decoded.
    pub fn wait(&mut self) -> Vec<LoadedImage> {
        let mut done = Vec::with_capacity(self.in_flight);
        while self.in_flight > 0 {
            match self.rx.recv() {
                Ok(image) => {
                    done.push(image);
                    self.in_flight -= 1;
                }
                Err(_) => break,
            }
        }
        done
    }
}
