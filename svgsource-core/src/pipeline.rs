//! Load Pipeline - Single Entry Point
//!
//! retrieval (override first) -> validation (when configured) -> rasterization.
//! Every failure leaves as one `LoadError`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::key::{RequestKey, Rgba};
use crate::raster::{PixelBuffer, Rasterizer, RenderError};
use crate::source::{RetrievalError, SourceKind, SourceRetriever};
use crate::validation::{ValidationError, Validator};
use crate::ENGINE_VERSION;

/// Internal cause of a failed load.
#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Retrieval(RetrievalError),

    #[error(transparent)]
    Validation(ValidationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

impl From<RetrievalError> for LoadFailure {
    fn from(e: RetrievalError) -> Self {
        if e.is_argument_error() {
            LoadFailure::Argument(e.to_string())
        } else {
            LoadFailure::Retrieval(e)
        }
    }
}

impl From<ValidationError> for LoadFailure {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::EmptyInput => LoadFailure::Argument(e.to_string()),
            rule => LoadFailure::Validation(rule),
        }
    }
}

/// The one outward failure type of the pipeline.
#[derive(Debug, Error)]
#[error("Failed to load SVG {identifier} ({kind}): {cause}")]
pub struct LoadError {
    pub identifier: String,
    pub kind: SourceKind,
    #[source]
    pub cause: LoadFailure,
}

impl LoadError {
    fn new(key: &RequestKey, cause: impl Into<LoadFailure>) -> Self {
        Self {
            identifier: key.identifier().to_string(),
            kind: key.source_kind(),
            cause: cause.into(),
        }
    }

    /// Message of the underlying cause.
    pub fn message(&self) -> String {
        self.cause.to_string()
    }

    pub fn is_argument_error(&self) -> bool {
        matches!(self.cause, LoadFailure::Argument(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterizedImage {
    pub pixels: PixelBuffer,
    pub tint: Rgba,
}

impl RasterizedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width
    }

    pub fn height(&self) -> u32 {
        self.pixels.height
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadManifest {
    pub id: String,
    pub fingerprint: String,
    pub identifier: String,
    pub source_kind: SourceKind,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub validated: bool,
    pub engine_version: String,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub manifest: LoadManifest,
    pub image: RasterizedImage,
}

/// The load pipeline - retriever, validator and rasterizer in sequence
pub struct LoadPipeline {
    retriever: SourceRetriever,
    validator: Validator,
    rasterizer: Arc<dyn Rasterizer>,
}

impl LoadPipeline {
    pub fn new(retriever: SourceRetriever, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            retriever,
            validator: Validator::new(),
            rasterizer,
        }
    }

    #[cfg(feature = "resvg")]
    pub fn from_config(config: &crate::config::RetrieverConfig) -> Result<Self, reqwest::Error> {
        let retriever = SourceRetriever::from_config(config)?;
        Ok(Self::new(retriever, Arc::new(crate::raster::ResvgRasterizer)))
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn retriever(&self) -> &SourceRetriever {
        &self.retriever
    }

    /// Markup for `key`, from the override or the default retriever.
    pub async fn retrieve_markup(&self, key: &RequestKey) -> Result<String, LoadError> {
        if let Some(hook) = key.retrieval_override() {
            match hook.retrieve(key.identity()).await {
                Ok(Some(markup)) => {
                    tracing::debug!(identifier = key.identifier(), "Retrieval override supplied markup");
                    return Ok(markup);
                }
                Ok(None) => {}
                Err(e) => return Err(LoadError::new(key, e)),
            }
        }

        self.retriever
            .retrieve(key.source_kind(), key.identifier(), key.bundle_name())
            .await
            .map_err(|e| LoadError::new(key, e))
    }

    /// Retrieval plus validation, without rendering.
    pub async fn resolve_markup(&self, key: &RequestKey) -> Result<String, LoadError> {
        let markup = self.retrieve_markup(key).await?;

        if let Some(config) = key.validation() {
            self.validator
                .validate(&markup, config)
                .map_err(|e| LoadError::new(key, e))?;
        }
        Ok(markup)
    }

    pub async fn load(&self, key: &RequestKey) -> Result<RasterizedImage, LoadError> {
        tracing::debug!(
            identifier = key.identifier(),
            kind = %key.source_kind(),
            width = key.pixel_width(),
            height = key.pixel_height(),
            "Loading SVG"
        );

        let result = self.load_inner(key).await;
        if let Err(e) = &result {
            tracing::warn!(identifier = key.identifier(), error = %e, "SVG load failed");
        }
        result
    }

    async fn load_inner(&self, key: &RequestKey) -> Result<RasterizedImage, LoadError> {
        let markup = self.resolve_markup(key).await?;

        let (width, height) = (key.pixel_width(), key.pixel_height());
        let pixels = self
            .rasterizer
            .rasterize(&markup, width, height, key.tint())
            .map_err(|e| LoadError::new(key, e))?;

        if (pixels.width, pixels.height) != (width, height) {
            return Err(LoadError::new(
                key,
                RenderError::SizeMismatch {
                    width,
                    height,
                    actual_width: pixels.width,
                    actual_height: pixels.height,
                },
            ));
        }

        Ok(RasterizedImage { pixels, tint: key.tint() })
    }

    /// Load and stamp the result with an id, fingerprint and timestamp.
    pub async fn load_with_manifest(&self, key: &RequestKey) -> Result<LoadedImage, LoadError> {
        let fingerprint = key.fingerprint().map_err(|e| LoadError::new(key, e))?;
        let image = self.load(key).await?;

        let manifest = LoadManifest {
            id: Uuid::new_v4().to_string(),
            fingerprint,
            identifier: key.identifier().to_string(),
            source_kind: key.source_kind(),
            pixel_width: image.width(),
            pixel_height: image.height(),
            validated: key.validation().is_some(),
            engine_version: ENGINE_VERSION.to_string(),
            loaded_at: Utc::now(),
        };

        tracing::info!(id = %manifest.id, fingerprint = %manifest.fingerprint, "SVG loaded");
        Ok(LoadedImage { manifest, image })
    }
}
