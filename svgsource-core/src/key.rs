//! Request Keys - Immutable Identity of One Load Request
//!
//! A key splits into the cache identity (compared and hashed) and the
//! behavioral retrieval override (carried, never compared).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::ValidationConfig;
use crate::hashing::compute_fingerprint;
use crate::sizing::{self, LogicalSize, RenderContext, ResolvedSizing};
use crate::source::{RetrievalError, SourceKind};
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba { r: 0, g: 0, b: 0, a: 0 };

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Parses `#rrggbb` or `#rrggbbaa`; the leading `#` is optional.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let a = if hex.len() == 8 { channel(6)? } else { 0xff };
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Fields that decide whether two requests are the same request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdentity {
    pub identifier: String,
    pub source_kind: SourceKind,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub tint: Rgba,
    pub scale_factor: f64,
    pub bundle_name: Option<String>,
    pub validation: Option<ValidationConfig>,
}

impl PartialEq for RequestIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.source_kind == other.source_kind
            && self.pixel_width == other.pixel_width
            && self.pixel_height == other.pixel_height
            && self.tint == other.tint
            && self.scale_factor.to_bits() == other.scale_factor.to_bits()
            && self.bundle_name == other.bundle_name
            && self.validation == other.validation
    }
}

impl Eq for RequestIdentity {}

impl Hash for RequestIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
        self.source_kind.hash(state);
        self.pixel_width.hash(state);
        self.pixel_height.hash(state);
        self.tint.hash(state);
        self.scale_factor.to_bits().hash(state);
        self.bundle_name.hash(state);
        self.validation.hash(state);
    }
}

/// Caller hook tried before the default retrieval strategy.
///
/// `Ok(None)` means "no opinion": the default strategy runs instead.
#[async_trait]
pub trait RetrievalOverride: Send + Sync {
    async fn retrieve(&self, identity: &RequestIdentity) -> Result<Option<String>, RetrievalError>;
}

#[async_trait]
impl<F> RetrievalOverride for F
where
    F: Fn(&RequestIdentity) -> Result<Option<String>, RetrievalError> + Send + Sync,
{
    async fn retrieve(&self, identity: &RequestIdentity) -> Result<Option<String>, RetrievalError> {
        self(identity)
    }
}

#[derive(Clone)]
pub struct RequestKey {
    identity: RequestIdentity,
    sizing: ResolvedSizing,
    retrieval_override: Option<Arc<dyn RetrievalOverride>>,
}

impl RequestKey {
    pub fn builder(identifier: impl Into<String>, source_kind: SourceKind) -> RequestKeyBuilder {
        RequestKeyBuilder {
            identifier: identifier.into(),
            source_kind,
            size: None,
            scale: None,
            tint: None,
            bundle_name: None,
            validation: None,
            retrieval_override: None,
        }
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    pub fn identifier(&self) -> &str {
        &self.identity.identifier
    }

    pub fn source_kind(&self) -> SourceKind {
        self.identity.source_kind
    }

    pub fn pixel_width(&self) -> u32 {
        self.identity.pixel_width
    }

    pub fn pixel_height(&self) -> u32 {
        self.identity.pixel_height
    }

    pub fn tint(&self) -> Rgba {
        self.identity.tint
    }

    pub fn scale_factor(&self) -> f64 {
        self.identity.scale_factor
    }

    pub fn bundle_name(&self) -> Option<&str> {
        self.identity.bundle_name.as_deref()
    }

    pub fn validation(&self) -> Option<&ValidationConfig> {
        self.identity.validation.as_ref()
    }

    pub fn sizing(&self) -> &ResolvedSizing {
        &self.sizing
    }

    pub fn retrieval_override(&self) -> Option<&Arc<dyn RetrievalOverride>> {
        self.retrieval_override.as_ref()
    }

    /// Stable string form of the identity, usable as an out-of-process cache key.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        compute_fingerprint(&self.identity, ENGINE_VERSION)
    }
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for RequestKey {}

impl Hash for RequestKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestKey")
            .field("identity", &self.identity)
            .field("sizing", &self.sizing)
            .field("retrieval_override", &self.retrieval_override.is_some())
            .finish()
    }
}

/// Loose caller parameters, resolved against a [`RenderContext`] by `build`.
pub struct RequestKeyBuilder {
    identifier: String,
    source_kind: SourceKind,
    size: Option<LogicalSize>,
    scale: Option<f64>,
    tint: Option<Rgba>,
    bundle_name: Option<String>,
    validation: Option<ValidationConfig>,
    retrieval_override: Option<Arc<dyn RetrievalOverride>>,
}

impl RequestKeyBuilder {
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.size = Some(LogicalSize::new(width, height));
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn tint(mut self, tint: Rgba) -> Self {
        self.tint = Some(tint);
        self
    }

    pub fn bundle_name(mut self, bundle_name: impl Into<String>) -> Self {
        self.bundle_name = Some(bundle_name.into());
        self
    }

    pub fn validation(mut self, config: ValidationConfig) -> Self {
        self.validation = Some(config);
        self
    }

    pub fn retrieval_override(mut self, hook: Arc<dyn RetrievalOverride>) -> Self {
        self.retrieval_override = Some(hook);
        self
    }

    pub fn build(self, context: &RenderContext) -> RequestKey {
        let sizing = sizing::resolve(self.size, self.scale, context);
        RequestKey {
            identity: RequestIdentity {
                identifier: self.identifier,
                source_kind: self.source_kind,
                pixel_width: sizing.pixel_width,
                pixel_height: sizing.pixel_height,
                tint: self.tint.unwrap_or(Rgba::TRANSPARENT),
                scale_factor: sizing.scale,
                bundle_name: self.bundle_name,
                validation: self.validation,
            },
            sizing,
            retrieval_override: self.retrieval_override,
        }
    }
}
