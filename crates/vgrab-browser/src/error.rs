//! Browser error types.

use thiserror::Error;

/// Result type for browser operations.
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Errors that can occur in the browser layer.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("No browser executable found")]
    ExecutableNotFound,

    #[error("Browser {0} is not in the pool")]
    UnknownBrowser(u64),

    #[error("Page operation failed: {0}")]
    PageFailed(String),

    #[error("Render timed out after {0} ms")]
    Timeout(u64),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    pub fn launch_failed(msg: impl Into<String>) -> Self {
        Self::LaunchFailed(msg.into())
    }

    pub fn page_failed(msg: impl Into<String>) -> Self {
        Self::PageFailed(msg.into())
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        Self::Cdp(e.to_string())
    }
}
