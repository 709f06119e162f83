//! Temporary neutralization of fixed and sticky descendants.
//!
//! Elements positioned against the viewport stay put while the container scrolls,
//! so every snapshot would show them again. They are switched to `position: static`
//! for the duration of a capture. Display and transform are left alone so the
//! element keeps its place in the flow and nothing around it reflows.

use crate::surface::ScrollContainer;
use crate::types::{InlinePosition, NodeProbe, Rect};
use anyhow::Result;
use log::{debug, warn};

/// An element whose inline positioning was overridden, with the values to put back.
#[derive(Debug, Clone)]
pub struct NeutralizedElement<N> {
    pub node: N,
    pub original: InlinePosition,
}

/// Whether a probed descendant tracks the viewport inside the container.
///
/// Only visible fixed/sticky elements whose center lies inside the container qualify;
/// page chrome outside the capture target is left untouched.
pub fn is_candidate<N>(probe: &NodeProbe<N>, container: &Rect) -> bool {
    let layout = &probe.layout;
    if !layout.is_viewport_tracking() || !layout.is_visible() {
        return false;
    }
    let (cx, cy) = layout.rect.center();
    container.contains_point(cx, cy)
}

/// Overrides every candidate descendant and returns the records needed to undo it.
///
/// If an override fails partway, the ones already applied are restored before the
/// error is returned.
pub async fn neutralize<C: ScrollContainer + ?Sized>(
    container: &C,
) -> Result<Vec<NeutralizedElement<C::Node>>> {
    let bounds = container.bounding_rect().await?;
    let probes = container.probe_descendants().await?;
    let total = probes.len();

    let mut applied = Vec::new();
    for probe in probes.into_iter().filter(|p| is_candidate(p, &bounds)) {
        if let Err(e) = apply(container, &probe.node, &mut applied).await {
            if let Err(undo) = restore(container, &mut applied).await {
                warn!("Failed to undo partial neutralization: {undo:?}");
            }
            return Err(e);
        }
    }

    debug!("Neutralized {} of {total} descendants", applied.len());
    Ok(applied)
}

async fn apply<C: ScrollContainer + ?Sized>(
    container: &C,
    node: &C::Node,
    applied: &mut Vec<NeutralizedElement<C::Node>>,
) -> Result<()> {
    let original = container.inline_position(node).await?;
    // Record before writing, a half-applied override must still be undone.
    applied.push(NeutralizedElement {
        node: node.clone(),
        original,
    });
    container
        .set_inline_position(node, &InlinePosition::neutral())
        .await
}

/// Writes back the saved inline values and empties the list.
///
/// Every entry is attempted; the first failure is returned afterwards. Calling this
/// on an empty (or already restored) list does nothing.
pub async fn restore<C: ScrollContainer + ?Sized>(
    container: &C,
    neutralized: &mut Vec<NeutralizedElement<C::Node>>,
) -> Result<()> {
    let mut first_err = None;
    let count = neutralized.len();
    for entry in neutralized.drain(..) {
        if let Err(e) = container
            .set_inline_position(&entry.node, &entry.original)
            .await
        {
            warn!("Failed to restore inline position: {e:?}");
            first_err.get_or_insert(e);
        }
    }
    if count > 0 {
        debug!("Restored {count} neutralized elements");
    }
    first_err.map_or(Ok(()), Err)
}
