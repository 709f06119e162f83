//! Collaborator seams of the capture engine.
//!
//! The engine never talks to a browser directly. It scrolls a [`ScrollContainer`],
//! asks a [`SnapshotProvider`] for what is on screen and a [`ZoomHost`] for the
//! device density. [`crate::Tab`] and [`crate::Element`] implement these over CDP.

use crate::types::{InlinePosition, NodeProbe, Rect, ScrollMetrics};
use anyhow::Result;
use async_trait::async_trait;

/// The element whose overflow is being captured.
#[async_trait]
pub trait ScrollContainer: Send + Sync {
    /// Handle to a descendant element.
    type Node: Clone + Send + Sync;

    async fn metrics(&self) -> Result<ScrollMetrics>;

    /// Current bounding client rect of the container itself.
    async fn bounding_rect(&self) -> Result<Rect>;

    async fn set_scroll_top(&self, top: f64) -> Result<()>;

    /// Every descendant with its resolved position, visibility and box.
    async fn probe_descendants(&self) -> Result<Vec<NodeProbe<Self::Node>>>;

    /// Literal inline style values of a descendant.
    async fn inline_position(&self, node: &Self::Node) -> Result<InlinePosition>;

    async fn set_inline_position(&self, node: &Self::Node, style: &InlinePosition)
    -> Result<()>;

    /// Frees whatever the container holds on to for probed descendants. Nodes from
    /// earlier probes must not be used afterwards.
    async fn release_descendants(&self) -> Result<()> {
        Ok(())
    }
}

/// Renders whatever is currently visible.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Base64 encoded PNG of the visible surface. Must never return a cached frame.
    async fn snapshot(&self) -> Result<String>;
}

/// Source of zoom readings used by [`crate::zoom`] strategies.
#[async_trait]
pub trait ZoomHost: Send + Sync {
    async fn device_pixel_ratio(&self) -> Result<f64>;

    /// Page zoom as reported by the privileged host.
    async fn page_zoom(&self) -> Result<f64>;

    async fn user_agent(&self) -> Result<String>;

    /// True when snapshots are rasterized at the device pixel ratio whatever the OS,
    /// as with DevTools screenshots. Platform detection is skipped for such hosts.
    fn device_pixel_snapshots(&self) -> bool {
        false
    }
}
