//! Off-screen render targets owned by passes and the preview.
//!
//! A [`Framebuffer`] holds one or more color attachments and at most one
//! depth-stencil attachment, all the same size. Color attachments are double
//! buffered:
//!
//! ```text
//!            draw                 swap
//! back  ────────────> rendered ─────────> front (sampled by channels)
//! front ────────────────────────────────> back  (next frame's target)
//! ```
//!
//! Readers only ever see the front buffer, so a pass may sample its own
//! output (getting last frame) and a skipped draw leaves the last good frame
//! in place.

use crate::error::FramebufferError;
use crate::gpu::GpuContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Color,
    DepthStencil,
}

/// What to allocate for one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub format: wgpu::TextureFormat,
    pub kind: AttachmentKind,
}

impl AttachmentSpec {
    pub fn color(format: wgpu::TextureFormat) -> Self {
        Self {
            format,
            kind: AttachmentKind::Color,
        }
    }

    pub fn depth_stencil(format: wgpu::TextureFormat) -> Self {
        Self {
            format,
            kind: AttachmentKind::DepthStencil,
        }
    }
}

/// Values a render pass starts from.
#[derive(Debug, Clone, Copy)]
pub struct ClearValues {
    pub color: wgpu::Color,
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: wgpu::Color::BLACK,
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Device limits a framebuffer is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferLimits {
    pub max_dimension: u32,
    pub max_color_attachments: u32,
}

impl FramebufferLimits {
    pub fn of(gpu: &GpuContext) -> Self {
        Self {
            max_dimension: gpu.max_texture_dimension(),
            max_color_attachments: gpu.max_color_attachments(),
        }
    }
}

/// Check that a framebuffer of this shape can be allocated and rendered to.
pub fn check_complete(
    width: u32,
    height: u32,
    specs: &[AttachmentSpec],
    limits: FramebufferLimits,
) -> Result<(), FramebufferError> {
    let incomplete = |reason: String| Err(FramebufferError::Incomplete { reason });

    if width == 0 || height == 0 {
        return incomplete(format!("zero-sized ({width}x{height})"));
    }
    if width > limits.max_dimension || height > limits.max_dimension {
        return incomplete(format!(
            "{width}x{height} exceeds the device limit of {}",
            limits.max_dimension
        ));
    }
    let colors = specs
        .iter()
        .filter(|s| s.kind == AttachmentKind::Color)
        .count();
    let depth = specs.len() - colors;
    if colors == 0 {
        return incomplete("no color attachment".to_string());
    }
    if colors > limits.max_color_attachments as usize {
        return incomplete(format!(
            "{colors} color attachments, device allows {}",
            limits.max_color_attachments
        ));
    }
    if depth > 1 {
        return incomplete(format!("{depth} depth-stencil attachments"));
    }
    for spec in specs {
        let is_depth = spec.format.is_depth_stencil_format();
        if is_depth != (spec.kind == AttachmentKind::DepthStencil) {
            return incomplete(format!("{:?} cannot back a {:?} attachment", spec.format, spec.kind));
        }
    }
    Ok(())
}

struct ColorAttachment {
    textures: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
}

struct DepthAttachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// A sized set of attachments a pass renders into.
pub struct Framebuffer {
    label: String,
    width: u32,
    height: u32,
    specs: Vec<AttachmentSpec>,
    colors: Vec<ColorAttachment>,
    depth: Option<DepthAttachment>,
    front: usize,
    frames: u64,
    status: Result<(), FramebufferError>,
}

impl Framebuffer {
    /// Allocate every attachment at `width` x `height`.
    ///
    /// An incomplete shape is logged and remembered rather than returned;
    /// the framebuffer then holds no textures and its pass does not draw.
    pub fn new(
        gpu: &GpuContext,
        label: impl Into<String>,
        width: u32,
        height: u32,
        specs: Vec<AttachmentSpec>,
    ) -> Self {
        let mut framebuffer = Self {
            label: label.into(),
            width,
            height,
            specs,
            colors: Vec::new(),
            depth: None,
            front: 0,
            frames: 0,
            status: Ok(()),
        };
        framebuffer.allocate(gpu);
        framebuffer
    }

    /// Destroy every attachment and recreate it at the new size.
    ///
    /// Pixel contents are not preserved, even when the size is unchanged.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.allocate(gpu);
    }

    fn allocate(&mut self, gpu: &GpuContext) {
        self.colors.clear();
        self.depth = None;
        self.front = 0;
        self.frames = 0;

        self.status = check_complete(self.width, self.height, &self.specs, FramebufferLimits::of(gpu));
        if let Err(err) = &self.status {
            tracing::warn!(framebuffer = %self.label, "{err}");
            return;
        }

        for (index, spec) in self.specs.iter().enumerate() {
            match spec.kind {
                AttachmentKind::Color => {
                    let textures = [0, 1].map(|slot| {
                        self.create_texture(
                            gpu,
                            &format!("{} Color {index}.{slot}", self.label),
                            spec.format,
                            wgpu::TextureUsages::RENDER_ATTACHMENT
                                | wgpu::TextureUsages::TEXTURE_BINDING
                                | wgpu::TextureUsages::COPY_SRC,
                        )
                    });
                    let views = [
                        textures[0].create_view(&wgpu::TextureViewDescriptor::default()),
                        textures[1].create_view(&wgpu::TextureViewDescriptor::default()),
                    ];
                    self.colors.push(ColorAttachment { textures, views });
                }
                AttachmentKind::DepthStencil => {
                    let texture = self.create_texture(
                        gpu,
                        &format!("{} Depth", self.label),
                        spec.format,
                        wgpu::TextureUsages::RENDER_ATTACHMENT,
                    );
                    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                    self.depth = Some(DepthAttachment { texture, view });
                }
            }
        }

        tracing::debug!(
            framebuffer = %self.label,
            width = self.width,
            height = self.height,
            "allocated attachments"
        );
    }

    fn create_texture(
        &self,
        gpu: &GpuContext,
        label: &str,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> wgpu::Texture {
        gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn specs(&self) -> &[AttachmentSpec] {
        &self.specs
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_ok()
    }

    pub fn status(&self) -> Result<(), FramebufferError> {
        self.status.clone()
    }

    /// Number of completed draws since the last (re)allocation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Format of color attachment `index`.
    pub fn color_format(&self, index: usize) -> Option<wgpu::TextureFormat> {
        self.specs
            .iter()
            .filter(|s| s.kind == AttachmentKind::Color)
            .nth(index)
            .map(|s| s.format)
    }

    /// Last completed frame of color attachment `index`.
    pub fn front_view(&self, index: usize) -> Option<&wgpu::TextureView> {
        self.colors.get(index).map(|c| &c.views[self.front])
    }

    pub fn front_texture(&self, index: usize) -> Option<&wgpu::Texture> {
        self.colors.get(index).map(|c| &c.textures[self.front])
    }

    pub fn depth_texture(&self) -> Option<&wgpu::Texture> {
        self.depth.as_ref().map(|d| &d.texture)
    }

    /// Every allocated texture: both buffers of each color attachment, then depth.
    pub fn textures(&self) -> impl Iterator<Item = &wgpu::Texture> {
        self.colors
            .iter()
            .flat_map(|c| c.textures.iter())
            .chain(self.depth_texture())
    }

    /// Start rendering into the back buffers.
    ///
    /// Returns `None` for an incomplete framebuffer. The viewport covers the
    /// whole framebuffer.
    pub fn begin<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        clear: ClearValues,
    ) -> Option<wgpu::RenderPass<'e>> {
        if !self.is_complete() {
            return None;
        }
        let back = 1 - self.front;
        let color_attachments: Vec<_> = self
            .colors
            .iter()
            .map(|c| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &c.views[back],
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear.color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: self.depth.as_ref().map(|d| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &d.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear.depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear.stencil),
                        store: wgpu::StoreOp::Store,
                    }),
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(0.0, 0.0, self.width as f32, self.height as f32, 0.0, 1.0);
        Some(pass)
    }

    /// Publish the back buffers as the new front.
    pub fn swap(&mut self) {
        if self.is_complete() {
            self.front = 1 - self.front;
            self.frames += 1;
        }
    }

    /// Clear both halves of every attachment, discarding history.
    pub fn clear(&mut self, encoder: &mut wgpu::CommandEncoder, clear: ClearValues) {
        for _ in 0..2 {
            drop(self.begin(encoder, clear));
            self.front = 1 - self.front;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: FramebufferLimits = FramebufferLimits {
        max_dimension: 8192,
        max_color_attachments: 8,
    };

    fn color() -> AttachmentSpec {
        AttachmentSpec::color(wgpu::TextureFormat::Rgba8Unorm)
    }

    fn depth() -> AttachmentSpec {
        AttachmentSpec::depth_stencil(wgpu::TextureFormat::Depth24PlusStencil8)
    }

    #[test]
    fn resizing_twice_to_the_same_size_is_stable() {
        let gpu = match GpuContext::headless(4, 4) {
            Ok(gpu) => gpu,
            Err(err) => {
                eprintln!("skipping GPU test: {err}");
                return;
            }
        };
        let mut framebuffer = Framebuffer::new(&gpu, "Resize", 4, 4, vec![color(), depth()]);
        assert!(framebuffer.is_complete());

        for _ in 0..2 {
            framebuffer.resize(&gpu, 48, 20);
            assert_eq!((framebuffer.width(), framebuffer.height()), (48, 20));
            assert!(framebuffer.is_complete());
            assert!(framebuffer.depth_texture().is_some());
            let sizes: Vec<(u32, u32)> = framebuffer
                .textures()
                .map(|t| (t.width(), t.height()))
                .collect();
            assert_eq!(sizes, vec![(48, 20); 3]);
        }

        framebuffer.resize(&gpu, 0, 20);
        assert!(!framebuffer.is_complete());
        assert_eq!(framebuffer.textures().count(), 0);
    }

    #[test]
    fn color_plus_depth_is_complete() {
        assert!(check_complete(640, 480, &[color(), depth()], LIMITS).is_ok());
    }

    #[test]
    fn zero_size_is_incomplete() {
        assert!(check_complete(0, 480, &[color()], LIMITS).is_err());
        assert!(check_complete(640, 0, &[color()], LIMITS).is_err());
    }

    #[test]
    fn oversized_is_incomplete() {
        assert!(check_complete(8193, 16, &[color()], LIMITS).is_err());
    }

    #[test]
    fn attachment_counts_are_bounded() {
        assert!(check_complete(16, 16, &[], LIMITS).is_err());
        assert!(check_complete(16, 16, &[depth()], LIMITS).is_err());
        assert!(check_complete(16, 16, &[color(), depth(), depth()], LIMITS).is_err());
        assert!(check_complete(16, 16, &vec![color(); 9], LIMITS).is_err());
        assert!(check_complete(16, 16, &vec![color(); 8], LIMITS).is_ok());
    }

    #[test]
    fn formats_must_match_their_kind() {
        let wrong = AttachmentSpec::color(wgpu::TextureFormat::Depth32Float);
        let err = check_complete(16, 16, &[wrong], LIMITS).unwrap_err();
        assert!(matches!(err, FramebufferError::Incomplete { .. }));
    }
}
