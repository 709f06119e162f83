//! Zoom detection and output scaling.
//!
//! Zoom is read through a chain of [`ZoomStrategy`] objects. Which strategies are
//! trusted depends on the host platform: the device pixel ratio is only accurate on
//! some OS families, elsewhere the host's own page zoom is asked. A new platform
//! adds an entry to [`PlatformFamily::zoom_strategies`], not a branch in the engine.

use crate::error::{CaptureError, Result};
use crate::surface::ZoomHost;
use crate::types::BASE_RESOLUTION;
use async_trait::async_trait;
use log::{debug, warn};

/// Zoom used when no strategy produces a reading.
pub const DEFAULT_ZOOM: f64 = 1.0;

/// Combined multiplier of device zoom and requested resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    zoom: f64,
    value: f64,
}

impl ScaleFactor {
    pub fn new(zoom: f64, resolution: f64) -> Result<Self> {
        let value = zoom * resolution / BASE_RESOLUTION;
        if !value.is_finite() || value <= 0.0 {
            return Err(CaptureError::InvalidOptions(format!(
                "scale factor must be positive (zoom {zoom}, resolution {resolution})"
            )));
        }
        Ok(Self { zoom, value })
    }

    /// Device zoom: CSS pixels to snapshot pixels.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// CSS pixels to output pixels.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn to_output(self, css_px: f64) -> u32 {
        (css_px * self.value).round().max(0.0) as u32
    }

    pub(crate) fn to_snapshot(self, css_px: f64) -> u32 {
        (css_px * self.zoom).round().max(0.0) as u32
    }
}

/// One way of reading the current zoom level.
#[async_trait]
pub trait ZoomStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn read(&self, host: &dyn ZoomHost) -> Result<f64>;
}

/// `window.devicePixelRatio`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevicePixelRatio;

/// Zoom level reported by the privileged host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPageZoom;

fn positive(name: &str, reading: anyhow::Result<f64>) -> Result<f64> {
    match reading {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        Ok(value) => Err(CaptureError::ZoomQueryFailed(format!(
            "{name} returned unusable value {value}"
        ))),
        Err(e) => Err(CaptureError::ZoomQueryFailed(format!("{name}: {e}"))),
    }
}

#[async_trait]
impl ZoomStrategy for DevicePixelRatio {
    fn name(&self) -> &'static str {
        "device-pixel-ratio"
    }

    async fn read(&self, host: &dyn ZoomHost) -> Result<f64> {
        positive(self.name(), host.device_pixel_ratio().await)
    }
}

#[async_trait]
impl ZoomStrategy for HostPageZoom {
    fn name(&self) -> &'static str {
        "host-page-zoom"
    }

    async fn read(&self, host: &dyn ZoomHost) -> Result<f64> {
        positive(self.name(), host.page_zoom().await)
    }
}

/// Operating system family of the browsing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl PlatformFamily {
    pub fn from_user_agent(user_agent: &str) -> Self {
        if user_agent.contains("Windows") {
            PlatformFamily::Windows
        } else if user_agent.contains("Mac OS X") || user_agent.contains("Macintosh") {
            PlatformFamily::MacOs
        } else if user_agent.contains("Linux") || user_agent.contains("X11") {
            PlatformFamily::Linux
        } else {
            PlatformFamily::Other
        }
    }

    /// Strategies trusted on this family, in order of preference.
    pub fn zoom_strategies(self) -> Vec<Box<dyn ZoomStrategy>> {
        match self {
            PlatformFamily::Windows => vec![Box::new(DevicePixelRatio), Box::new(HostPageZoom)],
            PlatformFamily::MacOs | PlatformFamily::Linux | PlatformFamily::Other => {
                vec![Box::new(HostPageZoom)]
            }
        }
    }
}

/// How the zoom chain of a session is chosen.
#[derive(Default)]
pub enum ZoomSelection {
    /// Detect the platform family from the host's user agent.
    #[default]
    Platform,
    /// Use this chain as is.
    Fixed(Vec<Box<dyn ZoomStrategy>>),
}

impl std::fmt::Debug for ZoomSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoomSelection::Platform => f.write_str("Platform"),
            ZoomSelection::Fixed(chain) => f
                .debug_list()
                .entries(chain.iter().map(|s| s.name()))
                .finish(),
        }
    }
}

impl ZoomSelection {
    /// Chain for a DevTools-driven tab, where the device pixel ratio is exact on every OS.
    pub fn devtools() -> Self {
        ZoomSelection::Fixed(devtools_chain())
    }

    pub(crate) async fn resolve(&self, host: &dyn ZoomHost) -> f64 {
        match self {
            ZoomSelection::Fixed(chain) => resolve_zoom(chain, host).await,
            ZoomSelection::Platform if host.device_pixel_snapshots() => {
                debug!("Host snapshots at device pixel ratio, using the devtools chain");
                resolve_zoom(&devtools_chain(), host).await
            }
            ZoomSelection::Platform => {
                let family = match host.user_agent().await {
                    Ok(ua) => PlatformFamily::from_user_agent(&ua),
                    Err(e) => {
                        warn!("Could not read user agent, assuming generic platform: {e}");
                        PlatformFamily::Other
                    }
                };
                debug!("Zoom chain selected for {family:?}");
                resolve_zoom(&family.zoom_strategies(), host).await
            }
        }
    }
}

fn devtools_chain() -> Vec<Box<dyn ZoomStrategy>> {
    vec![Box::new(DevicePixelRatio), Box::new(HostPageZoom)]
}

/// Runs the chain and returns the first usable reading, or [`DEFAULT_ZOOM`].
pub async fn resolve_zoom(chain: &[Box<dyn ZoomStrategy>], host: &dyn ZoomHost) -> f64 {
    for strategy in chain {
        match strategy.read(host).await {
            Ok(zoom) => {
                debug!("Zoom {zoom} from {}", strategy.name());
                return zoom;
            }
            Err(e) => warn!("{e}"),
        }
    }
    warn!("No zoom strategy succeeded, falling back to {DEFAULT_ZOOM}");
    DEFAULT_ZOOM
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedHost {
        dpr: Option<f64>,
        page: Option<f64>,
        ua: &'static str,
        pixel_snapshots: bool,
    }

    #[async_trait]
    impl ZoomHost for FixedHost {
        async fn device_pixel_ratio(&self) -> anyhow::Result<f64> {
            self.dpr.ok_or_else(|| anyhow!("no dpr"))
        }

        async fn page_zoom(&self) -> anyhow::Result<f64> {
            self.page.ok_or_else(|| anyhow!("host unreachable"))
        }

        async fn user_agent(&self) -> anyhow::Result<String> {
            Ok(self.ua.to_string())
        }

        fn device_pixel_snapshots(&self) -> bool {
            self.pixel_snapshots
        }
    }

    const WINDOWS_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
    const MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

    #[test]
    fn scale_factor_combines_zoom_and_resolution() {
        let scale = ScaleFactor::new(1.25, 144.0).unwrap();
        assert_eq!(scale.value(), 2.5);
        assert_eq!(scale.zoom(), 1.25);
        assert_eq!(scale.to_output(400.0), 1000);
        assert_eq!(scale.to_snapshot(400.0), 500);
    }

    #[test]
    fn scale_factor_rejects_non_positive() {
        assert!(ScaleFactor::new(1.0, 0.0).is_err());
        assert!(ScaleFactor::new(-1.0, 72.0).is_err());
        assert!(ScaleFactor::new(f64::NAN, 72.0).is_err());
    }

    #[test]
    fn platform_detection() {
        assert_eq!(PlatformFamily::from_user_agent(WINDOWS_UA), PlatformFamily::Windows);
        assert_eq!(PlatformFamily::from_user_agent(MAC_UA), PlatformFamily::MacOs);
        assert_eq!(
            PlatformFamily::from_user_agent("Mozilla/5.0 (X11; Linux x86_64)"),
            PlatformFamily::Linux
        );
        assert_eq!(PlatformFamily::from_user_agent("curl/8"), PlatformFamily::Other);
    }

    #[tokio::test]
    async fn windows_prefers_device_pixel_ratio() {
        let host = FixedHost {
            dpr: Some(1.5),
            page: Some(1.1),
            ua: WINDOWS_UA,
            pixel_snapshots: false,
        };
        assert_eq!(ZoomSelection::Platform.resolve(&host).await, 1.5);
    }

    #[tokio::test]
    async fn windows_falls_back_to_host_zoom() {
        let host = FixedHost {
            dpr: Some(0.0),
            page: Some(1.1),
            ua: WINDOWS_UA,
            pixel_snapshots: false,
        };
        assert_eq!(ZoomSelection::Platform.resolve(&host).await, 1.1);
    }

    #[tokio::test]
    async fn mac_ignores_device_pixel_ratio() {
        let host = FixedHost {
            dpr: Some(2.0),
            page: Some(1.0),
            ua: MAC_UA,
            pixel_snapshots: false,
        };
        assert_eq!(ZoomSelection::Platform.resolve(&host).await, 1.0);
    }

    #[tokio::test]
    async fn failed_queries_default_to_one() {
        let host = FixedHost {
            dpr: None,
            page: None,
            ua: WINDOWS_UA,
            pixel_snapshots: false,
        };
        assert_eq!(ZoomSelection::Platform.resolve(&host).await, DEFAULT_ZOOM);
        assert_eq!(ZoomSelection::devtools().resolve(&host).await, DEFAULT_ZOOM);
    }

    #[tokio::test]
    async fn devtools_chain_reads_dpr_on_any_platform() {
        let host = FixedHost {
            dpr: Some(2.0),
            page: None,
            ua: MAC_UA,
            pixel_snapshots: false,
        };
        assert_eq!(ZoomSelection::devtools().resolve(&host).await, 2.0);
    }

    #[tokio::test]
    async fn device_pixel_hosts_skip_platform_detection() {
        let host = FixedHost {
            dpr: Some(2.0),
            page: Some(1.0),
            ua: MAC_UA,
            pixel_snapshots: true,
        };
        assert_eq!(ZoomSelection::Platform.resolve(&host).await, 2.0);
    }
}
