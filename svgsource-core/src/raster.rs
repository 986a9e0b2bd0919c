//! Rasterization - Markup to Pixel Buffers
//!
//! The pipeline talks to a [`Rasterizer`]; [`ResvgRasterizer`] is the
//! default implementation when the `resvg` feature is enabled.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::Rgba;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("SVG could not be parsed for rendering: {0}")]
    Parse(String),

    #[error("cannot allocate a {width}x{height} pixel buffer")]
    Allocation { width: u32, height: u32 },

    #[error("rasterizer produced {actual_width}x{actual_height}, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Premultiplied RGBA8, row-major, `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.data.get(offset..offset + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }
}

pub trait Rasterizer: Send + Sync {
    /// Must return a buffer of exactly `width` x `height` pixels.
    fn rasterize(&self, markup: &str, width: u32, height: u32, tint: Rgba) -> Result<PixelBuffer, RenderError>;
}

/// Source-in blend of `tint` over premultiplied pixels. A transparent tint is a no-op.
pub fn apply_tint(data: &mut [u8], tint: Rgba) {
    if tint.is_transparent() {
        return;
    }
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u32 * tint.a as u32 / 255;
        px[0] = (tint.r as u32 * alpha / 255) as u8;
        px[1] = (tint.g as u32 * alpha / 255) as u8;
        px[2] = (tint.b as u32 * alpha / 255) as u8;
        px[3] = alpha as u8;
    }
}

#[cfg(feature = "resvg")]
pub use self::resvg_backend::ResvgRasterizer;

#[cfg(feature = "resvg")]
mod resvg_backend {
    use super::*;
    use resvg::{tiny_skia, usvg};

    /// Stretches the document's intrinsic size onto the target pixmap.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ResvgRasterizer;

    impl Rasterizer for ResvgRasterizer {
        fn rasterize(&self, markup: &str, width: u32, height: u32, tint: Rgba) -> Result<PixelBuffer, RenderError> {
            let options = usvg::Options::default();
            let tree = usvg::Tree::from_str(markup, &options).map_err(|e| RenderError::Parse(e.to_string()))?;

            let mut pixmap = tiny_skia::Pixmap::new(width, height)
                .ok_or(RenderError::Allocation { width, height })?;

            let size = tree.size();
            let transform = tiny_skia::Transform::from_scale(
                width as f32 / size.width(),
                height as f32 / size.height(),
            );
            resvg::render(&tree, transform, &mut pixmap.as_mut());

            let mut data = pixmap.take();
            apply_tint(&mut data, tint);
            Ok(PixelBuffer { width, height, data })
        }
    }
}
