//! Source Retrieval - Markup from Files, Assets, Bundles, Network and Raw Text
//!
//! Each source kind resolves its identifier through an injected collaborator,
//! so hosts and tests can substitute their own filesystem, asset bundle or
//! HTTP transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RetrieverConfig, DEFAULT_NETWORK_TIMEOUT_SECS};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Prefix joining a bundle name and an asset path into one asset key.
pub const BUNDLE_PREFIX: &str = "packages";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Asset,
    Network,
    NamedBundleAsset,
    RawText,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Asset => "asset",
            SourceKind::Network => "network",
            SourceKind::NamedBundleAsset => "named_bundle_asset",
            SourceKind::RawText => "raw_text",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "file" => Ok(SourceKind::File),
            "asset" => Ok(SourceKind::Asset),
            "network" | "url" => Ok(SourceKind::Network),
            "named_bundle_asset" | "bundle" => Ok(SourceKind::NamedBundleAsset),
            "raw_text" | "raw" | "string" => Ok(SourceKind::RawText),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Caller misuse, raised before any collaborator is consulted
    #[error("bundle name required to load {identifier}")]
    MissingBundleName { identifier: String },

    #[error("SVG source not found: {0}")]
    NotFound(String),

    #[error("timed out after {}s fetching {url}", .timeout.as_secs_f64())]
    Timeout { url: String, timeout: Duration },

    #[error("failed to retrieve {kind} source {identifier}: {message}")]
    RetrievalFailed {
        kind: SourceKind,
        identifier: String,
        status: Option<u16>,
        message: String,
        #[source]
        cause: Option<BoxError>,
    },
}

impl RetrievalError {
    fn failed(kind: SourceKind, identifier: &str, cause: BoxError) -> Self {
        RetrievalError::RetrievalFailed {
            kind,
            identifier: identifier.to_string(),
            status: None,
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    pub fn is_argument_error(&self) -> bool {
        matches!(self, RetrievalError::MissingBundleName { .. })
    }
}

// --- Collaborators ---

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// True only for regular files.
    async fn exists(&self, path: &Path) -> bool;
    async fn read_text(&self, path: &Path) -> std::io::Result<String>;
}

#[async_trait]
pub trait AssetBundle: Send + Sync {
    async fn load_text(&self, key: &str) -> Result<String, BoxError>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Other(BoxError),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.map_or(false, |m| m.is_file())
    }

    async fn read_text(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// Asset bundle backed by a directory; keys are relative paths under `root`.
pub struct DirectoryAssetBundle {
    root: PathBuf,
}

impl DirectoryAssetBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        confined.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl AssetBundle for DirectoryAssetBundle {
    async fn load_text(&self, key: &str) -> Result<String, BoxError> {
        let path = self
            .resolve(key)
            .ok_or_else(|| format!("asset key escapes bundle root: {}", key))?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

/// Placeholder bundle for hosts that ship no assets.
pub struct NoAssetBundle;

#[async_trait]
impl AssetBundle for NoAssetBundle {
    async fn load_text(&self, key: &str) -> Result<String, BoxError> {
        Err(format!("no asset bundle configured for {}", key).into())
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Other(Box::new(e))
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(HttpResponse { status, body })
    }
}

// --- Retriever ---

pub fn bundle_asset_key(bundle_name: &str, identifier: &str) -> String {
    format!("{}/{}/{}", BUNDLE_PREFIX, bundle_name, identifier.trim_start_matches('/'))
}

/// Resolves (kind, identifier, bundle) to markup text.
pub struct SourceRetriever {
    fs: Arc<dyn FileSystem>,
    assets: Arc<dyn AssetBundle>,
    http: Arc<dyn HttpTransport>,
    network_timeout: Duration,
}

impl SourceRetriever {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        assets: Arc<dyn AssetBundle>,
        http: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            fs,
            assets,
            http,
            network_timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
        }
    }

    /// Default collaborators: tokio filesystem, directory bundle (if configured), reqwest.
    pub fn from_config(config: &RetrieverConfig) -> Result<Self, reqwest::Error> {
        let assets: Arc<dyn AssetBundle> = match &config.asset_root {
            Some(root) => Arc::new(DirectoryAssetBundle::new(root)),
            None => Arc::new(NoAssetBundle),
        };
        let http = Arc::new(ReqwestTransport::new(&config.user_agent)?);

        Ok(Self::new(Arc::new(TokioFileSystem), assets, http)
            .with_network_timeout(config.network_timeout()))
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn network_timeout(&self) -> Duration {
        self.network_timeout
    }

    pub async fn retrieve(
        &self,
        kind: SourceKind,
        identifier: &str,
        bundle_name: Option<&str>,
    ) -> Result<String, RetrievalError> {
        tracing::debug!(kind = %kind, identifier, bundle = ?bundle_name, "Retrieving SVG source");

        let result = match kind {
            SourceKind::RawText => Ok(identifier.to_string()),
            SourceKind::File => self.retrieve_file(identifier).await,
            SourceKind::Asset => self.retrieve_asset(kind, identifier).await,
            SourceKind::NamedBundleAsset => match bundle_name {
                Some(bundle) => {
                    let key = bundle_asset_key(bundle, identifier);
                    self.retrieve_asset(kind, &key).await
                }
                None => Err(RetrievalError::MissingBundleName {
                    identifier: identifier.to_string(),
                }),
            },
            SourceKind::Network => self.retrieve_network(identifier).await,
        };

        if let Err(e) = &result {
            tracing::warn!(kind = %kind, identifier, error = %e, "SVG retrieval failed");
        }
        result
    }

    async fn retrieve_file(&self, path: &str) -> Result<String, RetrievalError> {
        let path = Path::new(path);
        if !self.fs.exists(path).await {
            return Err(RetrievalError::NotFound(path.display().to_string()));
        }
        self.fs
            .read_text(path)
            .await
            .map_err(|e| RetrievalError::failed(SourceKind::File, &path.display().to_string(), Box::new(e)))
    }

    async fn retrieve_asset(&self, kind: SourceKind, key: &str) -> Result<String, RetrievalError> {
        self.assets
            .load_text(key)
            .await
            .map_err(|e| RetrievalError::failed(kind, key, e))
    }

    async fn retrieve_network(&self, url: &str) -> Result<String, RetrievalError> {
        let timeout = self.network_timeout;
        let timed_out = || RetrievalError::Timeout { url: url.to_string(), timeout };

        // Enforced here as well, in case the transport ignores its own bound.
        let response = match tokio::time::timeout(timeout, self.http.get(url, timeout)).await {
            Err(_) => return Err(timed_out()),
            Ok(Err(TransportError::Timeout)) => return Err(timed_out()),
            Ok(Err(TransportError::Other(cause))) => {
                return Err(RetrievalError::failed(SourceKind::Network, url, cause))
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(RetrievalError::RetrievalFailed {
                kind: SourceKind::Network,
                identifier: url.to_string(),
                status: Some(response.status),
                message: format!("HTTP status {}", response.status),
                cause: None,
            });
        }
        Ok(response.body)
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockFileSystem {
        pub files: HashMap<PathBuf, String>,
        pub calls: AtomicUsize,
    }

    impl MockFileSystem {
        pub fn with_file(path: &str, content: &str) -> Self {
            let mut files = HashMap::new();
            files.insert(PathBuf::from(path), content.to_string());
            Self { files, calls: AtomicUsize::new(0) }
        }
    }

    /// Reports every path as present but cannot read any of them.
    pub struct UnreadableFileSystem;

    #[async_trait]
    impl FileSystem for UnreadableFileSystem {
        async fn exists(&self, _path: &Path) -> bool {
            true
        }

        async fn read_text(&self, _path: &Path) -> std::io::Result<String> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"))
        }
    }

    #[async_trait]
    impl FileSystem for MockFileSystem {
        async fn exists(&self, path: &Path) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.files.contains_key(path)
        }

        async fn read_text(&self, path: &Path) -> std::io::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        }
    }

    #[derive(Default)]
    pub struct MockAssetBundle {
        pub assets: HashMap<String, String>,
        pub requested: Mutex<Vec<String>>,
    }

    impl MockAssetBundle {
        pub fn with_asset(key: &str, content: &str) -> Self {
            let mut assets = HashMap::new();
            assets.insert(key.to_string(), content.to_string());
            Self { assets, requested: Mutex::new(vec![]) }
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AssetBundle for MockAssetBundle {
        async fn load_text(&self, key: &str) -> Result<String, BoxError> {
            self.requested.lock().unwrap().push(key.to_string());
            self.assets
                .get(key)
                .cloned()
                .ok_or_else(|| format!("asset not bundled: {}", key).into())
        }
    }

    pub struct MockHttp {
        pub status: u16,
        pub body: String,
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl MockHttp {
        pub fn ok(body: &str) -> Self {
            Self::respond(200, body)
        }

        pub fn respond(status: u16, body: &str) -> Self {
            Self {
                status,
                body: body.to_string(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn hanging() -> Self {
            Self { delay: Duration::from_secs(3600), ..Self::ok("") }
        }
    }

    /// Transport that fails immediately with a fixed fault.
    pub enum FailingHttp {
        TimedOut,
        Refused,
    }

    #[async_trait]
    impl HttpTransport for FailingHttp {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, TransportError> {
            match self {
                FailingHttp::TimedOut => Err(TransportError::Timeout),
                FailingHttp::Refused => Err(TransportError::Other("connection refused".into())),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for MockHttp {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(HttpResponse { status: self.status, body: self.body.clone() })
        }
    }
}
