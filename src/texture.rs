use std::path::Path;

use crate::error::Error;
use crate::gpu::GpuContext;

/// Decoded RGBA8 pixels waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Decode an image file into tightly packed RGBA8, top row first.
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            pixels: img.into_raw(),
        })
    }

    /// Decode an in-memory image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            pixels: img.into_raw(),
        })
    }
}

/// A sampled GPU texture used as a channel input.
///
/// Sampling state lives in the pass resources (one sampler shared by all
/// channels), so a texture is only the image and its view.
#[derive(Debug)]
pub struct Texture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    label: String,
}

impl Texture {
    /// Create a texture from raw RGBA data.
    pub fn from_rgba(gpu: &GpuContext, data: &[u8], width: u32, height: u32, label: &str) -> Self {
        use wgpu::util::DeviceExt;

        let texture = gpu.device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                // Linear, like the pass outputs, so images and buffers mix the same way.
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
            label: label.to_string(),
        }
    }

    /// Upload an already decoded image.
    pub fn from_image(gpu: &GpuContext, image: &DecodedImage, label: &str) -> Self {
        Self::from_rgba(gpu, &image.pixels, image.width, image.height, label)
    }

    /// Load a texture from an image file.
    pub fn from_file(gpu: &GpuContext, path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let image = DecodedImage::open(path)?;
        Ok(Self::from_image(gpu, &image, &path.display().to_string()))
    }

    /// A 1x1 opaque black texture bound wherever a channel has nothing to show.
    pub fn placeholder(gpu: &GpuContext) -> Self {
        Self::from_rgba(gpu, &[0, 0, 0, 255], 1, 1, "Channel Placeholder")
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_bytes_to_rgba() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = DecodedImage::from_bytes(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(DecodedImage::from_bytes(b"not an image").is_err());
    }
}
