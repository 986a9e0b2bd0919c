//! svgsource Core - SVG Source Resolution and Validation
//!
//! # Pipeline
//! 1. Resolve markup (retrieval override first, then the source kind's strategy)
//! 2. Validate markup against the request's rules, when it carries any
//! 3. Rasterize to the exact pixel size, applying the tint
//!
//! Request keys are immutable and compare on their cache identity only.

pub mod config;
pub mod validation;
pub mod source;
pub mod sizing;
pub mod key;
pub mod hashing;
pub mod raster;
pub mod pipeline;

pub use config::{ValidationConfig, ValidationPreset, RetrieverConfig};
pub use validation::{validate, ValidationError, ValidationReport, ValidationRule, Validator, RuleKind};
pub use source::{SourceKind, SourceRetriever, RetrievalError, FileSystem, AssetBundle, HttpTransport, HttpResponse};
pub use sizing::{RenderContext, LogicalSize, SizeAuthority};
pub use key::{RequestKey, RequestIdentity, RetrievalOverride, Rgba};
pub use hashing::{canonical_json, compute_fingerprint};
pub use raster::{PixelBuffer, Rasterizer, RenderError};
pub use pipeline::{LoadPipeline, LoadError, LoadFailure, LoadedImage, LoadManifest, RasterizedImage};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
