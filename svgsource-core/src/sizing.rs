//! Sizing Authority System
//!
//! Decides where a request's logical size and scale come from, so key
//! construction never has to branch on which parameters were supplied.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOGICAL_SIZE: LogicalSize = LogicalSize { width: 100.0, height: 100.0 };
pub const DEFAULT_SCALE: f64 = 1.0;

/// SizeAuthority records which input won for size or scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeAuthority {
    /// Fixed fallback
    Default,
    /// Host rendering context
    Ambient,
    /// Caller-supplied parameter
    Explicit,
}

impl Default for SizeAuthority {
    fn default() -> Self {
        Self::Default
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicalSize {
    pub width: f64,
    pub height: f64,
}

impl LogicalSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Ambient values provided by the host rendering context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContext {
    #[serde(default)]
    pub device_pixel_ratio: Option<f64>,
    #[serde(default)]
    pub size: Option<LogicalSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSizing {
    pub logical: LogicalSize,
    pub scale: f64,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub size_authority: SizeAuthority,
    pub scale_authority: SizeAuthority,
}

fn usable_scale(scale: Option<f64>) -> Option<f64> {
    scale.filter(|s| s.is_finite() && *s > 0.0)
}

/// Logical length times scale, rounded half away from zero, never below one pixel.
pub fn to_pixels(logical: f64, scale: f64) -> u32 {
    let scaled = (logical * scale).round();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// Explicit beats ambient beats default, independently for size and scale.
pub fn resolve(
    explicit_size: Option<LogicalSize>,
    explicit_scale: Option<f64>,
    context: &RenderContext,
) -> ResolvedSizing {
    let (scale, scale_authority) = match (usable_scale(explicit_scale), usable_scale(context.device_pixel_ratio)) {
        (Some(s), _) => (s, SizeAuthority::Explicit),
        (None, Some(s)) => (s, SizeAuthority::Ambient),
        (None, None) => (DEFAULT_SCALE, SizeAuthority::Default),
    };

    let (logical, size_authority) = match (explicit_size, context.size) {
        (Some(size), _) => (size, SizeAuthority::Explicit),
        (None, Some(size)) => (size, SizeAuthority::Ambient),
        (None, None) => (DEFAULT_LOGICAL_SIZE, SizeAuthority::Default),
    };

    ResolvedSizing {
        logical,
        scale,
        pixel_width: to_pixels(logical.width, scale),
        pixel_height: to_pixels(logical.height, scale),
        size_authority,
        scale_authority,
    }
}
