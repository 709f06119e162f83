use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolution at which one CSS pixel maps to one output pixel (at zoom 1.0).
pub const BASE_RESOLUTION: f64 = 72.0;

/// Default pause after each scroll mutation before snapshotting.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Share of the viewport height advanced per step.
pub const DEFAULT_STEP_RATIO: f64 = 0.9;

/// Rows (CSS pixels) re-captured at each step boundary.
pub const DEFAULT_OVERLAP_MARGIN: u32 = 50;

/// Viewport configuration for controlling page dimensions and device emulation.
#[derive(Debug, Clone)]
pub struct Viewport {
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Device scale factor (DPR). Snapshots are taken at this density. A tab reports
    /// DPR-density snapshots, so the capture engine reads it as the zoom on every OS.
    pub device_scale_factor: f64,
    /// Whether to emulate a mobile device. Default is false.
    pub is_mobile: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 1600,
            device_scale_factor: 1.0,
            is_mobile: false,
        }
    }
}

impl Viewport {
    /// Creates a new viewport with specified dimensions and default settings.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_device_scale_factor(mut self, factor: f64) -> Self {
        self.device_scale_factor = factor;
        self
    }

    pub fn with_mobile(mut self, is_mobile: bool) -> Self {
        self.is_mobile = is_mobile;
        self
    }
}

/// A bounding client rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    /// Strict containment, a point on the border is outside.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x > self.left && x < self.right() && y > self.top && y < self.bottom()
    }
}

/// Scroll and layout metrics of a scroll container, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: u32,
    pub client_width: u32,
    pub client_height: u32,
    /// Left border width, offset of the client box inside the bounding rect.
    #[serde(default)]
    pub client_left: f64,
    /// Top border width.
    #[serde(default)]
    pub client_top: f64,
}

/// The five inline declarations that control positioning.
///
/// Values are the literal author-set inline strings, an empty string meaning
/// "no inline declaration".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InlinePosition {
    pub position: String,
    pub top: String,
    pub left: String,
    pub right: String,
    pub bottom: String,
}

impl InlinePosition {
    /// Override applied to neutralized elements.
    pub fn neutral() -> Self {
        Self {
            position: "static".to_string(),
            ..Default::default()
        }
    }
}

/// Resolved (computed) style and box of a descendant element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComputedLayout {
    pub position: String,
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub rect: Rect,
}

impl ComputedLayout {
    pub fn is_viewport_tracking(&self) -> bool {
        matches!(self.position.as_str(), "fixed" | "sticky")
    }

    pub fn is_visible(&self) -> bool {
        self.rect.width > 0.0
            && self.rect.height > 0.0
            && self.display != "none"
            && self.visibility != "hidden"
            && self.opacity != "0"
    }
}

/// A descendant of a scroll container together with its computed layout.
#[derive(Debug, Clone)]
pub struct NodeProbe<N> {
    pub node: N,
    pub layout: ComputedLayout,
}

/// Configuration options for a scroll capture.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub(crate) resolution: f64,
    pub(crate) settle_delay: Duration,
    pub(crate) step_ratio: f64,
    pub(crate) overlap_margin: u32,
    pub(crate) viewport: Option<Viewport>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            resolution: BASE_RESOLUTION,
            settle_delay: DEFAULT_SETTLE_DELAY,
            step_ratio: DEFAULT_STEP_RATIO,
            overlap_margin: DEFAULT_OVERLAP_MARGIN,
            viewport: None,
        }
    }
}

impl CaptureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output resolution in DPI, 72 keeps one output pixel per device pixel.
    pub fn with_resolution(mut self, dpi: f64) -> Self {
        self.resolution = dpi;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_step_ratio(mut self, ratio: f64) -> Self {
        self.step_ratio = ratio;
        self
    }

    pub fn with_overlap_margin(mut self, margin: u32) -> Self {
        self.overlap_margin = margin;
        self
    }

    /// Emulate device metrics on the tab before capturing.
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Print-quality preset, 144 DPI.
    pub fn hidpi() -> Self {
        Self::new().with_resolution(144.0)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CaptureError;

        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(CaptureError::InvalidOptions(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !self.step_ratio.is_finite() || self.step_ratio <= 0.0 || self.step_ratio > 1.0 {
            return Err(CaptureError::InvalidOptions(format!(
                "step ratio must be in (0, 1], got {}",
                self.step_ratio
            )));
        }
        Ok(())
    }
}
