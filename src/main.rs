//! Kata Uploadr - resumable multipart uploader
//!
//! Uploads training videos through the upload service's multipart contract,
//! resuming interrupted uploads from a local snapshot store.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kata_uploadr::backend::{BearerToken, HttpBackend, TokenSource};
use kata_uploadr::config::{Config, ConfigLoader};
use kata_uploadr::resume::{FileFingerprint, FileStore, ResumeStore};
use kata_uploadr::transport::HttpPartTransport;
use kata_uploadr::upload::{
    compute_parts, finalize, ByteSource, CoordinatorOptions, DeviceClass, FileSource,
    UploadCoordinator, UploadFile,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Kata Uploadr - resumable, concurrent multipart uploads
#[derive(Parser, Debug)]
#[command(name = "kata-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Bearer token for the upload service
    #[arg(long, global = true, env = "KATA_UPLOAD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print Prometheus metrics after the command finishes
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file, resuming a previous attempt when possible
    Upload {
        file: PathBuf,

        /// Override the content type guessed from the extension
        #[arg(long)]
        content_type: Option<String>,

        /// Use small parts for constrained or mobile links
        #[arg(long)]
        constrained: bool,

        /// Maximum parallel part transfers
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show how a file of SIZE would be split (e.g. 26MiB, 4GB, 1048576)
    Plan {
        size: String,

        #[arg(long)]
        constrained: bool,
    },

    /// Show the resume snapshot for a file
    Status { file: PathBuf },

    /// Drop the resume snapshot for a file
    Forget { file: PathBuf },

    /// Release a server-side upload session
    Abort {
        #[arg(long)]
        upload_id: String,

        #[arg(long)]
        object_key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ConfigLoader::load_or_default(args.config.as_ref())?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config)?;

    info!("Starting Kata Uploadr v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let result = run(&args, config).await;

    if args.metrics {
        print!("{}", kata_uploadr::metrics::gather_text());
    }
    result
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.logging.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run(args: &Args, config: Config) -> anyhow::Result<()> {
    match &args.command {
        Command::Plan { size, constrained } => {
            let file_size = parse_size(size)?;
            anyhow::ensure!(file_size > 0, "size must be greater than zero");
            let plan = compute_parts(file_size, *constrained);
            println!(
                "{}",
                serde_json::json!({
                    "fileSize": file_size,
                    "partSize": plan.part_size,
                    "partCount": plan.part_count,
                })
            );
            Ok(())
        }
        Command::Status { file } => {
            let store = open_store(&config).await?;
            let source = FileSource::open(file).await?;
            let fingerprint = FileFingerprint::new(source.name(), source.len());
            match store.load(&fingerprint).await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("No resumable upload for {}", file.display()),
            }
            Ok(())
        }
        Command::Forget { file } => {
            let store = open_store(&config).await?;
            let source = FileSource::open(file).await?;
            let fingerprint = FileFingerprint::new(source.name(), source.len());
            match store.load(&fingerprint).await? {
                Some(snapshot) => {
                    store.clear(&snapshot.object_key).await?;
                    println!("Forgot upload {}", snapshot.upload_id);
                }
                None => println!("No resumable upload for {}", file.display()),
            }
            Ok(())
        }
        Command::Abort {
            upload_id,
            object_key,
        } => {
            let token = resolve_token(args, &config)?;
            let backend = HttpBackend::new((&config.backend).into())?;
            let acknowledged =
                finalize::abort_upload(&backend, &token, upload_id, object_key).await;
            open_store(&config).await?.clear(object_key).await?;
            anyhow::ensure!(acknowledged, "backend did not acknowledge abort of {upload_id}");
            println!("Aborted upload {upload_id}");
            Ok(())
        }
        Command::Upload {
            file,
            content_type,
            constrained,
            concurrency,
        } => {
            let token = resolve_token(args, &config)?;
            let mut options = CoordinatorOptions::from(&config.upload);
            if let Some(concurrency) = concurrency {
                options.concurrency = (*concurrency).max(1);
            }

            let source = FileSource::open(file)
                .await
                .with_context(|| format!("cannot open {}", file.display()))?;
            let mut upload = UploadFile::new(Arc::new(source)).with_device_class(
                if *constrained {
                    DeviceClass::Constrained
                } else {
                    config.upload.device_class
                },
            );
            if let Some(content_type) = content_type {
                upload = upload.with_content_type(content_type.clone());
            }

            let mut coordinator = UploadCoordinator::new(
                Arc::new(HttpBackend::new((&config.backend).into())?),
                Arc::new(HttpPartTransport::new()?),
                open_store(&config).await?,
                token,
                options,
            );
            coordinator.initialize(upload).await?;

            let cancel = coordinator.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; cancelling upload");
                    cancel.cancel();
                }
            });

            let mut progress = coordinator.subscribe();
            let reporter = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let p = progress.borrow_and_update().clone();
                    info!(
                        state = %p.state,
                        parts = %format!("{}/{}", p.completed_parts, p.total_parts),
                        percent = %format!("{:.1}", p.percent()),
                        "Progress"
                    );
                }
            });

            let outcome = coordinator.start().await;
            drop(coordinator);
            let _ = reporter.await;

            let done = outcome?;
            println!("{}", done.locator);
            Ok(())
        }
    }
}

fn resolve_token(args: &Args, config: &Config) -> anyhow::Result<BearerToken> {
    TokenSource::select(args.token.as_deref(), &config.auth)
        .resolve()
        .context("no usable bearer token (use --token or KATA_UPLOAD_TOKEN)")
}

async fn open_store(config: &Config) -> anyhow::Result<ResumeStore> {
    let directory = config.resume.resolved_directory();
    let kv = FileStore::open(&directory)
        .await
        .with_context(|| format!("cannot open resume store at {}", directory.display()))?;
    Ok(ResumeStore::new(Arc::new(kv))
        .with_namespace(config.resume.namespace.clone())
        .with_ttl(config.resume.ttl()))
}

/// Parse `1048576`, `26MiB`, `4GB`, `512k` into bytes (binary multiples)
fn parse_size(input: &str) -> anyhow::Result<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .with_context(|| format!("invalid size '{input}'"))?;
    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        other => anyhow::bail!("unknown size unit '{other}'"),
    };
    value
        .checked_mul(multiplier)
        .with_context(|| format!("size '{input}' is too large"))
}
