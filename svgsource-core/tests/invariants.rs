//! Contract Invariant Tests
//!
//! These tests verify the load contract through the public API only.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use svgsource_core::{
    source::{BoxError, TransportError},
    validate, AssetBundle, FileSystem, HttpResponse, HttpTransport, LoadFailure, LoadPipeline,
    PixelBuffer, Rasterizer, RenderContext, RenderError, RequestIdentity, RequestKey,
    RetrievalError, RetrievalOverride, Rgba, SourceKind, SourceRetriever, ValidationConfig,
    ValidationError, RuleKind,
};

const MINIMAL: &str =
    r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0h1v1H0z"/></svg>"#;

#[derive(Default)]
struct CountingFs {
    files: HashMap<String, String>,
    calls: AtomicUsize,
}

#[async_trait]
impl FileSystem for CountingFs {
    async fn exists(&self, path: &Path) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files.contains_key(path.to_string_lossy().as_ref())
    }

    async fn read_text(&self, path: &Path) -> std::io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(path.to_string_lossy().as_ref())
            .cloned()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}

#[derive(Default)]
struct CountingAssets {
    calls: AtomicUsize,
}

#[async_trait]
impl AssetBundle for CountingAssets {
    async fn load_text(&self, key: &str) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(format!("no such asset: {}", key).into())
    }
}

struct SlowHttp;

#[async_trait]
impl HttpTransport for SlowHttp {
    async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, TransportError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(HttpResponse { status: 200, body: MINIMAL.to_string() })
    }
}

struct BlankRasterizer;

impl Rasterizer for BlankRasterizer {
    fn rasterize(&self, _markup: &str, width: u32, height: u32, _tint: Rgba) -> Result<PixelBuffer, RenderError> {
        Ok(PixelBuffer { width, height, data: vec![0; (width * height * 4) as usize] })
    }
}

struct Harness {
    fs: Arc<CountingFs>,
    assets: Arc<CountingAssets>,
    pipeline: LoadPipeline,
}

fn harness() -> Harness {
    let mut fs = CountingFs::default();
    fs.files.insert("/icons/home.svg".to_string(), MINIMAL.to_string());
    let fs = Arc::new(fs);
    let assets = Arc::new(CountingAssets::default());

    let retriever = SourceRetriever::new(fs.clone(), assets.clone(), Arc::new(SlowHttp));
    let pipeline = LoadPipeline::new(retriever, Arc::new(BlankRasterizer));
    Harness { fs, assets, pipeline }
}

#[test]
fn invariant_none_preset_accepts_any_non_empty_text() {
    for text in ["x", "<svg>", "<script>alert(1)</script>", "{}"] {
        assert!(validate(text, &ValidationConfig::NONE).is_ok());
    }
    assert_eq!(validate(" ", &ValidationConfig::NONE), Err(ValidationError::EmptyInput));
}

#[test]
fn invariant_strict_minimal_document() {
    assert!(validate(MINIMAL, &ValidationConfig::STRICT).is_ok());

    let without_ns = MINIMAL.replace(r#"xmlns="http://www.w3.org/2000/svg""#, "");
    let err = validate(&without_ns, &ValidationConfig::STRICT).unwrap_err();
    assert_eq!(err.rule_kind(), Some(RuleKind::Structure));
    assert!(err.to_string().contains("namespace"));
}

#[test]
fn invariant_oversized_width_rejected() {
    let markup = MINIMAL.replace("<svg ", r#"<svg width="20000" "#);
    let err = validate(&markup, &ValidationConfig::STRICT).unwrap_err();
    assert_eq!(err.rule_kind(), Some(RuleKind::Dimensions));
    assert!(err.to_string().contains("width"));
}

#[test]
fn invariant_key_pixel_sizes() {
    let key = RequestKey::builder(MINIMAL, SourceKind::RawText)
        .size(100.0, 100.0)
        .scale(2.0)
        .build(&RenderContext::default());
    assert_eq!((key.pixel_width(), key.pixel_height()), (200, 200));

    let key = RequestKey::builder(MINIMAL, SourceKind::RawText).build(&RenderContext::default());
    assert_eq!((key.pixel_width(), key.pixel_height()), (100, 100));
    assert_eq!(key.scale_factor(), 1.0);
}

#[tokio::test]
async fn invariant_file_source_end_to_end() {
    let h = harness();
    let key = RequestKey::builder("/icons/home.svg", SourceKind::File)
        .size(24.0, 24.0)
        .scale(3.0)
        .validation(ValidationConfig::STRICT)
        .build(&RenderContext::default());

    let image = h.pipeline.load(&key).await.unwrap();
    assert_eq!((image.width(), image.height()), (72, 72));
}

#[tokio::test]
async fn invariant_missing_file_is_not_found() {
    let h = harness();
    let key = RequestKey::builder("/icons/nope.svg", SourceKind::File).build(&RenderContext::default());

    let err = h.pipeline.load(&key).await.unwrap_err();
    assert!(matches!(err.cause, LoadFailure::Retrieval(RetrievalError::NotFound(_))));
    assert!(err.to_string().contains("Failed to load SVG"));
}

#[tokio::test]
async fn invariant_bundle_name_checked_before_retrieval() {
    let h = harness();
    let key = RequestKey::builder("home.svg", SourceKind::NamedBundleAsset).build(&RenderContext::default());

    let err = h.pipeline.load(&key).await.unwrap_err();
    assert!(err.is_argument_error());
    assert_eq!(h.assets.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn invariant_network_timeout_distinct() {
    let h = harness();
    let key = RequestKey::builder("https://slow.example/icon.svg", SourceKind::Network)
        .build(&RenderContext::default());

    let err = h.pipeline.load(&key).await.unwrap_err();
    assert!(matches!(err.cause, LoadFailure::Retrieval(RetrievalError::Timeout { .. })));
}

#[tokio::test]
async fn invariant_override_bypasses_default_path() {
    let h = harness();
    let hook: Arc<dyn RetrievalOverride> = Arc::new(|_: &RequestIdentity| -> Result<Option<String>, RetrievalError> {
        Ok(Some(MINIMAL.to_string()))
    });
    let key = RequestKey::builder("/icons/elsewhere.svg", SourceKind::File)
        .validation(ValidationConfig::STRICT)
        .retrieval_override(hook)
        .build(&RenderContext::default());

    h.pipeline.load(&key).await.unwrap();
    assert_eq!(h.fs.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invariant_validation_failure_is_uniform_load_error() {
    let h = harness();
    let key = RequestKey::builder("<svg><script/></svg>", SourceKind::RawText)
        .validation(ValidationConfig { elements: true, ..ValidationConfig::NONE })
        .build(&RenderContext::default());

    let err = h.pipeline.load(&key).await.unwrap_err();
    assert!(matches!(err.cause, LoadFailure::Validation(_)));
    assert!(err.message().contains("unsupported element: <script>"));
}

#[cfg(feature = "resvg")]
#[tokio::test]
async fn invariant_resvg_renders_exact_size() {
    let retriever = SourceRetriever::new(
        Arc::new(CountingFs::default()),
        Arc::new(CountingAssets::default()),
        Arc::new(SlowHttp),
    );
    let pipeline = LoadPipeline::new(retriever, Arc::new(svgsource_core::raster::ResvgRasterizer));
    let key = RequestKey::builder(MINIMAL, SourceKind::RawText)
        .size(32.0, 16.0)
        .scale(1.5)
        .validation(ValidationConfig::STRICT)
        .build(&RenderContext::default());

    let image = pipeline.load(&key).await.unwrap();
    assert_eq!((image.width(), image.height()), (48, 24));
    assert_eq!(image.pixels.data.len(), 48 * 24 * 4);
}
