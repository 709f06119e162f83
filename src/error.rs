use thiserror::Error;

/// Result alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors produced by a scroll capture session.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Another session holds the registry. Nothing was mutated.
    #[error("A scroll capture is already in progress")]
    CaptureInProgress,

    /// The viewport snapshot provider could not be reached.
    #[error("Viewport snapshot unavailable: {0}")]
    SnapshotUnavailable(#[source] anyhow::Error),

    /// A snapshot came back but could not be decoded or cropped.
    #[error("Failed to render snapshot: {0}")]
    RenderError(String),

    /// Zoom detection failed. Never returned from a capture, the session falls back to 1.0.
    #[error("Zoom query failed: {0}")]
    ZoomQueryFailed(String),

    #[error("Invalid capture options: {0}")]
    InvalidOptions(String),

    /// The container has no width or no height to capture.
    #[error("Container has an empty layout box")]
    EmptyContainer,

    /// Reading or mutating the page (scroll offset, styles, layout) failed.
    #[error("Page access failed: {0}")]
    Page(#[source] anyhow::Error),
}

impl CaptureError {
    /// Short machine-friendly name, used in notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::CaptureInProgress => "capture_in_progress",
            CaptureError::SnapshotUnavailable(_) => "snapshot_unavailable",
            CaptureError::RenderError(_) => "render_error",
            CaptureError::ZoomQueryFailed(_) => "zoom_query_failed",
            CaptureError::InvalidOptions(_) => "invalid_options",
            CaptureError::EmptyContainer => "empty_container",
            CaptureError::Page(_) => "page",
        }
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::RenderError(err.to_string())
    }
}

impl From<base64::DecodeError> for CaptureError {
    fn from(err: base64::DecodeError) -> Self {
        CaptureError::RenderError(format!("invalid base64 payload: {err}"))
    }
}
