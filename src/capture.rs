//! The scroll-and-stitch capture engine.

use crate::error::{CaptureError, Result};
use crate::neutralize::{self, NeutralizedElement};
use crate::plan::ScrollPlan;
use crate::session::SessionRegistry;
use crate::stitch::{Canvas, StitchedImage, TileSource};
use crate::surface::{ScrollContainer, SnapshotProvider, ZoomHost};
use crate::types::{CaptureOptions, ScrollMetrics};
use crate::zoom::{ScaleFactor, ZoomSelection};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Notification sent to subscribers once a session has ended and cleaned up.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Completed {
        width: u32,
        height: u32,
        /// Number of snapshots composited.
        steps: usize,
    },
    Failed {
        kind: &'static str,
        message: String,
    },
}

/// Scrolls a container stop by stop and stitches the snapshots into one image.
///
/// Sessions are admitted through a [`SessionRegistry`], by default the process-wide
/// one, so at most one capture runs at a time.
pub struct ScrollCapturer {
    options: CaptureOptions,
    zoom: ZoomSelection,
    registry: Arc<SessionRegistry>,
    events: broadcast::Sender<CaptureEvent>,
}

impl ScrollCapturer {
    pub fn new(options: CaptureOptions) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            options,
            zoom: ZoomSelection::default(),
            registry: SessionRegistry::global(),
            events,
        }
    }

    pub fn with_zoom(mut self, zoom: ZoomSelection) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Receives a [`CaptureEvent`] after each admitted session.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Captures the full scroll height of `container` as one PNG.
    ///
    /// Fails with [`CaptureError::CaptureInProgress`] without touching the page when
    /// another session is active. Any other failure is returned after the scroll
    /// offset and every neutralized element have been restored.
    pub async fn capture<C, P>(&self, container: &C, page: &P) -> Result<StitchedImage>
    where
        C: ScrollContainer + ?Sized,
        P: SnapshotProvider + ZoomHost,
    {
        let session = self.registry.try_acquire()?;
        let result = self.run(container, page).await;
        session.release();

        let event = match &result {
            Ok((image, steps)) => {
                info!(
                    "Scroll capture finished: {}x{} from {steps} snapshots",
                    image.width, image.height
                );
                CaptureEvent::Completed {
                    width: image.width,
                    height: image.height,
                    steps: *steps,
                }
            }
            Err(e) => {
                warn!("Scroll capture failed: {e}");
                CaptureEvent::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        // No subscribers is fine.
        let _ = self.events.send(event);

        result.map(|(image, _)| image)
    }

    async fn run<C, P>(&self, container: &C, page: &P) -> Result<(StitchedImage, usize)>
    where
        C: ScrollContainer + ?Sized,
        P: SnapshotProvider + ZoomHost,
    {
        self.options.validate()?;

        let metrics = container.metrics().await.map_err(CaptureError::Page)?;
        let zoom = self.zoom.resolve(page).await;
        let scale = ScaleFactor::new(zoom, self.options.resolution)?;
        let plan = ScrollPlan::new(
            metrics.scroll_height,
            metrics.client_height,
            self.options.step_ratio,
            self.options.overlap_margin,
        )?;
        let mut canvas = Canvas::new(metrics.client_width, metrics.scroll_height, scale)?;
        info!(
            "Scroll capture started: {}px of content through a {}px viewport, scale {:.3}, {} stops",
            metrics.scroll_height,
            metrics.client_height,
            scale.value(),
            plan.offsets().len()
        );

        let mut neutralized = match neutralize::neutralize(container).await {
            Ok(neutralized) => neutralized,
            Err(e) => {
                Self::release_descendants(container).await;
                return Err(CaptureError::Page(e));
            }
        };

        let outcome = self
            .composite_steps(container, page, &plan, &metrics, &mut canvas)
            .await;
        self.cleanup(container, metrics.scroll_top, &mut neutralized)
            .await;
        outcome?;

        Ok((canvas.finish()?, plan.offsets().len()))
    }

    async fn composite_steps<C, P>(
        &self,
        container: &C,
        page: &P,
        plan: &ScrollPlan,
        metrics: &ScrollMetrics,
        canvas: &mut Canvas,
    ) -> Result<()>
    where
        C: ScrollContainer + ?Sized,
        P: SnapshotProvider,
    {
        let stops = plan.offsets().len();
        for (index, &offset) in plan.offsets().iter().enumerate() {
            let cursor = f64::from(offset);
            container
                .set_scroll_top(cursor)
                .await
                .map_err(CaptureError::Page)?;
            if !self.options.settle_delay.is_zero() {
                tokio::time::sleep(self.options.settle_delay).await;
            }

            let encoded = page
                .snapshot()
                .await
                .map_err(CaptureError::SnapshotUnavailable)?;
            let rect = container.bounding_rect().await.map_err(CaptureError::Page)?;
            let source = TileSource {
                left: rect.left + metrics.client_left,
                top: rect.top + metrics.client_top,
                width: f64::from(metrics.client_width),
                height: f64::from(metrics.client_height),
            };
            canvas.draw_snapshot(&encoded, source, cursor)?;
            debug!("Composited stop {}/{stops} at offset {offset}", index + 1);
        }
        Ok(())
    }

    /// Puts the page back. Failures are logged, they never replace the session outcome.
    async fn cleanup<C>(
        &self,
        container: &C,
        original_scroll_top: f64,
        neutralized: &mut Vec<NeutralizedElement<C::Node>>,
    ) where
        C: ScrollContainer + ?Sized,
    {
        if let Err(e) = container.set_scroll_top(original_scroll_top).await {
            warn!("Failed to restore scroll offset {original_scroll_top}: {e:?}");
        }
        if let Err(e) = neutralize::restore(container, neutralized).await {
            warn!("Failed to restore neutralized elements: {e:?}");
        }
        Self::release_descendants(container).await;
    }

    async fn release_descendants<C: ScrollContainer + ?Sized>(container: &C) {
        if let Err(e) = container.release_descendants().await {
            warn!("Failed to release descendant handles: {e:?}");
        }
    }
}

impl Default for ScrollCapturer {
    fn default() -> Self {
        Self::new(CaptureOptions::default())
    }
}
