//! Copying rendered frames back to the CPU.

use crate::error::{Error, Result};
use crate::gpu::GpuContext;

/// A frame read back from the GPU: tightly packed RGBA8, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// The RGBA value at `(x, y)`, with `(0, 0)` in the top-left corner.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 4) as usize;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Convert into an `image` buffer for encoding.
    pub fn into_image(self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data)
    }
}

/// Row pitch of a copy of `width` RGBA8 pixels, padded to the copy alignment.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// Drop the per-row padding of a mapped copy.
pub(crate) fn unpad_rows(padded: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    let pitch = padded_bytes_per_row(width) as usize;
    let mut data = Vec::with_capacity(row * height as usize);
    for chunk in padded.chunks(pitch).take(height as usize) {
        data.extend_from_slice(&chunk[..row]);
    }
    data
}

/// Copy an RGBA8 texture into CPU memory, blocking until the GPU is done.
pub fn read_texture(
    gpu: &GpuContext,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<Frame> {
    let pitch = padded_bytes_per_row(width);
    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: pitch as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pitch),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    let submission = gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    gpu.device
        .poll(wgpu::PollType::Wait {
            submission_index: Some(submission),
            timeout: None,
        })
        .map_err(|e| Error::Readback(format!("device poll failed: {e}")))?;

    rx.recv()
        .map_err(|_| Error::Readback("map callback never ran".into()))?
        .map_err(|e| Error::Readback(format!("failed to map buffer: {e}")))?;

    let data = unpad_rows(&slice.get_mapped_range(), width, height);
    buffer.unmap();

    Ok(Frame {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1), 256);
    }

    #[test]
    fn unpadding_keeps_only_pixel_bytes() {
        let pitch = padded_bytes_per_row(2) as usize;
        let mut padded = vec![0xAA; pitch * 2];
        padded[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        padded[pitch..pitch + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let data = unpad_rows(&padded, 2, 2);
        assert_eq!(data, (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn pixel_lookup_is_top_left_origin() {
        let frame = Frame {
            width: 2,
            height: 2,
            data: vec![
                1, 0, 0, 255, 2, 0, 0, 255, //
                3, 0, 0, 255, 4, 0, 0, 255,
            ],
        };
        assert_eq!(frame.pixel(0, 0), Some([1, 0, 0, 255]));
        assert_eq!(frame.pixel(1, 1), Some([4, 0, 0, 255]));
        assert_eq!(frame.pixel(2, 0), None);
    }
}
