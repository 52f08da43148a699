//! Kata Uploadr Library
//!
//! Resumable, concurrent multipart uploads of large files against signed URLs.
//!
//! # Features
//!
//! - **Bounded Concurrency**: Parts transfer in parallel under a fixed limit
//! - **Retry with Backoff**: One policy applied to every part attempt
//! - **Resumable**: Completed parts are persisted and skipped on restart
//! - **Cancellable**: Cancellation aborts in-flight transfers and releases the session
//! - **Explicit Credentials**: Every backend call carries a caller-supplied bearer token
//!
//! # Example
//!
//! ```no_run
//! use kata_uploadr::backend::{BearerToken, HttpBackend};
//! use kata_uploadr::resume::{FileStore, ResumeStore};
//! use kata_uploadr::transport::HttpPartTransport;
//! use kata_uploadr::upload::{FileSource, UploadCoordinator, UploadFile};
//! use kata_uploadr::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let store = FileStore::open(config.resume.resolved_directory()).await?;
//!
//!     let mut coordinator = UploadCoordinator::new(
//!         Arc::new(HttpBackend::new((&config.backend).into())?),
//!         Arc::new(HttpPartTransport::new()?),
//!         ResumeStore::new(Arc::new(store)),
//!         BearerToken::new("user-session-token")?,
//!         (&config.upload).into(),
//!     );
//!
//!     let source = FileSource::open("lesson-01.mp4").await?;
//!     coordinator.initialize(UploadFile::new(Arc::new(source))).await?;
//!     let done = coordinator.start().await?;
//!     println!("{}", done.locator);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod metrics;
pub mod resume;
pub mod transport;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::{CompletedUpload, UploadCoordinator, UploadError, UploadFailure};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
