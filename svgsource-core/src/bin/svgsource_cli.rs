//! svgsource CLI - Resolve, validate and rasterize SVG sources
//!
//! Commands: validate, key, load
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on validation or load failure, 1 on usage errors

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use svgsource_core::{
    LoadPipeline, RenderContext, RequestKey, RetrieverConfig, Rgba, SourceKind, ValidationConfig,
    ValidationPreset, Validator,
};

#[derive(Parser)]
#[command(name = "svgsource-cli")]
#[command(about = "svgsource CLI - SVG source resolution and validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Retriever config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory that asset keys resolve against (overrides the config file)
    #[arg(long, global = true)]
    asset_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled validation rule and report all violations
    Validate {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Print the resolved request key and its fingerprint
    Key {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Retrieve, validate and rasterize
    Load {
        #[command(flatten)]
        request: RequestArgs,

        /// Write raw premultiplied RGBA bytes here instead of embedding base64
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// Path, asset key, URL or literal markup, depending on --kind
    identifier: String,

    /// file | asset | network | named-bundle-asset | raw-text
    #[arg(short, long, default_value = "file")]
    kind: SourceKind,

    #[arg(long)]
    bundle: Option<String>,

    #[arg(long)]
    width: Option<f64>,

    #[arg(long)]
    height: Option<f64>,

    #[arg(long)]
    scale: Option<f64>,

    /// Ambient device pixel ratio, used when --scale is absent
    #[arg(long)]
    device_pixel_ratio: Option<f64>,

    /// #rrggbb or #rrggbbaa
    #[arg(long, value_parser = parse_tint)]
    tint: Option<Rgba>,

    /// none | basic | strict
    #[arg(short, long)]
    preset: Option<ValidationPreset>,

    /// Validation config file (JSON), takes precedence over --preset
    #[arg(long)]
    rules: Option<PathBuf>,
}

fn parse_tint(s: &str) -> Result<Rgba, String> {
    Rgba::from_hex(s).ok_or_else(|| format!("invalid color: {}", s))
}

impl RequestArgs {
    fn validation(&self) -> Result<Option<ValidationConfig>, String> {
        match (&self.rules, self.preset) {
            (Some(path), _) => ValidationConfig::load_from_file(path).map(Some).map_err(|e| e.to_string()),
            (None, Some(preset)) => Ok(Some(preset.config())),
            (None, None) => Ok(None),
        }
    }

    fn key(&self, validation: Option<ValidationConfig>) -> RequestKey {
        let mut builder = RequestKey::builder(self.identifier.clone(), self.kind);
        if self.width.is_some() || self.height.is_some() {
            let width = self.width.or(self.height).unwrap_or_default();
            let height = self.height.or(self.width).unwrap_or_default();
            builder = builder.size(width, height);
        }
        if let Some(scale) = self.scale {
            builder = builder.scale(scale);
        }
        if let Some(tint) = self.tint {
            builder = builder.tint(tint);
        }
        if let Some(bundle) = &self.bundle {
            builder = builder.bundle_name(bundle.clone());
        }
        if let Some(config) = validation {
            builder = builder.validation(config);
        }

        let context = RenderContext {
            device_pixel_ratio: self.device_pixel_ratio,
            size: None,
        };
        builder.build(&context)
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn fail(message: impl std::fmt::Display, code: u8) -> ExitCode {
    print_json(&serde_json::json!({ "success": false, "error": message.to_string() }));
    ExitCode::from(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "svgsource_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut retriever_config = match &cli.config {
        Some(path) => match RetrieverConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => return fail(e, 1),
        },
        None => RetrieverConfig::default(),
    };
    if cli.asset_root.is_some() {
        retriever_config.asset_root = cli.asset_root.clone();
    }

    let pipeline = match LoadPipeline::from_config(&retriever_config) {
        Ok(p) => p,
        Err(e) => return fail(format!("Failed to initialise HTTP client: {}", e), 1),
    };

    match cli.command {
        Commands::Validate { request } => {
            let config = match request.validation() {
                Ok(c) => c.unwrap_or(ValidationConfig::STRICT),
                Err(e) => return fail(e, 1),
            };

            // Retrieve only; the report below runs every rule.
            let key = request.key(None);
            let markup = match pipeline.retrieve_markup(&key).await {
                Ok(m) => m,
                Err(e) => return fail(e, 2),
            };

            let report = Validator::new().report(&markup, &config);
            print_json(&serde_json::json!(report));
            if report.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Key { request } => {
            let validation = match request.validation() {
                Ok(v) => v,
                Err(e) => return fail(e, 1),
            };
            let key = request.key(validation);
            let fingerprint = match key.fingerprint() {
                Ok(f) => f,
                Err(e) => return fail(e, 1),
            };

            print_json(&serde_json::json!({
                "identity": key.identity(),
                "sizing": key.sizing(),
                "fingerprint": fingerprint,
            }));
            ExitCode::SUCCESS
        }

        Commands::Load { request, out } => {
            let validation = match request.validation() {
                Ok(v) => v,
                Err(e) => return fail(e, 1),
            };
            let key = request.key(validation);

            let loaded = match pipeline.load_with_manifest(&key).await {
                Ok(l) => l,
                Err(e) => return fail(e, 2),
            };

            let data = &loaded.image.pixels.data;
            let mut output = serde_json::json!({
                "success": true,
                "manifest": loaded.manifest,
            });
            match &out {
                Some(path) => {
                    if let Err(e) = std::fs::write(path, data) {
                        return fail(format!("Failed to write {}: {}", path.display(), e), 1);
                    }
                    output["out"] = serde_json::json!(path);
                }
                None => {
                    output["data_base64"] = serde_json::json!(base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD,
                        data,
                    ));
                }
            }
            print_json(&output);
            ExitCode::SUCCESS
        }
    }
}
