use std::path::PathBuf;

use thiserror::Error;

/// Precondition failures returned synchronously by coordinator calls.
///
/// Task-level failures (network, parse, checksum) travel through the
/// asynchronous event callbacks instead and never surface here.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("another {0} is already running")]
    Busy(&'static str),

    #[error("manifest has no download URL")]
    InvalidManifest,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("installer not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("unsupported installer format: {0}")]
    InvalidFormat(String),

    #[error("failed to start installer: {0}")]
    Launch(#[source] std::io::Error),
}
