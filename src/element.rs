use crate::surface::ScrollContainer;
use crate::tab::Tab;
use crate::types::{ComputedLayout, InlinePosition, NodeProbe, Rect, ScrollMetrics};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const METRICS_JS: &str = "function() {
    return {
        scrollTop: this.scrollTop,
        scrollHeight: this.scrollHeight,
        clientWidth: this.clientWidth,
        clientHeight: this.clientHeight,
        clientLeft: this.clientLeft,
        clientTop: this.clientTop,
    };
}";

// The root scroller's rect moves with its own scroll offset, its client box is the viewport.
const RECT_JS: &str = "function() {
    if (this === document.scrollingElement) {
        return { left: 0, top: 0, width: this.clientWidth, height: this.clientHeight };
    }
    const r = this.getBoundingClientRect();
    return { left: r.left, top: r.top, width: r.width, height: r.height };
}";

const SET_SCROLL_TOP_JS: &str = "function(top) { this.scrollTop = top; }";

const DESCENDANTS_JS: &str = "function() { return Array.from(this.querySelectorAll('*')); }";

const PROBE_JS: &str = "function() {
    return this.map((el) => {
        const s = getComputedStyle(el);
        const r = el.getBoundingClientRect();
        return {
            position: s.position,
            display: s.display,
            visibility: s.visibility,
            opacity: s.opacity,
            rect: { left: r.left, top: r.top, width: r.width, height: r.height },
        };
    });
}";

const READ_INLINE_JS: &str = "function(i) {
    const s = this[i].style;
    return { position: s.position, top: s.top, left: s.left, right: s.right, bottom: s.bottom };
}";

const WRITE_INLINE_JS: &str = "function(i, p) {
    const s = this[i].style;
    s.position = p.position;
    s.top = p.top;
    s.left = p.left;
    s.right = p.right;
    s.bottom = p.bottom;
}";

const SCROLLABLE_JS: &str = "function() {
    const s = getComputedStyle(this);
    const scrolls = [s.overflow, s.overflowY].some((v) =>
        v.split(' ').some((k) => k === 'auto' || k === 'scroll'));
    return (scrolls || this === document.scrollingElement) && this.scrollHeight > this.clientHeight;
}";

/// A descendant of a scroll container, addressed by its index in a page-side array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantRef {
    list: Arc<str>,
    index: usize,
}

/// Represents a DOM element controlled via CDP.
pub struct Element<'a> {
    parent: &'a Tab,
    object_id: String,
    /// Page-side arrays created by `probe_descendants`, freed on release.
    probed: Mutex<Vec<Arc<str>>>,
}

impl<'a> Element<'a> {
    pub(crate) async fn new(parent: &'a Tab, node_id: u64) -> Result<Self> {
        let described = parent
            .send_cmd("DOM.describeNode", json!({ "nodeId": node_id }))
            .await?;
        let backend_node_id = described["result"]["node"]["backendNodeId"]
            .as_u64()
            .context("Missing backendNodeId")?;

        let resolved = parent
            .send_cmd(
                "DOM.resolveNode",
                json!({ "backendNodeId": backend_node_id }),
            )
            .await?;
        let object_id = resolved["result"]["object"]["objectId"]
            .as_str()
            .context("Missing objectId")?
            .to_string();

        Ok(Self {
            parent,
            object_id,
            probed: Mutex::new(Vec::new()),
        })
    }

    async fn call(&self, declaration: &str, args: &[Value]) -> Result<Value> {
        let remote = self
            .parent
            .call_function_on(&self.object_id, declaration, args, true)
            .await?;
        Ok(remote["value"].clone())
    }

    /// True when the element scrolls vertically: overflow `auto`/`scroll` with
    /// more content than fits.
    pub async fn is_scrollable(&self) -> Result<bool> {
        Ok(self.call(SCROLLABLE_JS, &[]).await?.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl ScrollContainer for Element<'_> {
    type Node = DescendantRef;

    async fn metrics(&self) -> Result<ScrollMetrics> {
        let value = self.call(METRICS_JS, &[]).await?;
        serde_json::from_value(value).context("Malformed scroll metrics")
    }

    async fn bounding_rect(&self) -> Result<Rect> {
        let value = self.call(RECT_JS, &[]).await?;
        serde_json::from_value(value).context("Malformed bounding rect")
    }

    async fn set_scroll_top(&self, top: f64) -> Result<()> {
        self.call(SET_SCROLL_TOP_JS, &[json!(top)]).await?;
        Ok(())
    }

    async fn probe_descendants(&self) -> Result<Vec<NodeProbe<DescendantRef>>> {
        let remote = self
            .parent
            .call_function_on(&self.object_id, DESCENDANTS_JS, &[], false)
            .await?;
        let list: Arc<str> = remote["objectId"]
            .as_str()
            .context("Descendant list has no objectId")?
            .into();
        if let Ok(mut probed) = self.probed.lock() {
            probed.push(list.clone());
        }

        let probed = self
            .parent
            .call_function_on(&list, PROBE_JS, &[], true)
            .await?;
        let layouts: Vec<ComputedLayout> =
            serde_json::from_value(probed["value"].clone()).context("Malformed layout probe")?;
        debug!("Probed {} descendants", layouts.len());

        Ok(layouts
            .into_iter()
            .enumerate()
            .map(|(index, layout)| NodeProbe {
                node: DescendantRef {
                    list: list.clone(),
                    index,
                },
                layout,
            })
            .collect())
    }

    async fn inline_position(&self, node: &DescendantRef) -> Result<InlinePosition> {
        let remote = self
            .parent
            .call_function_on(&node.list, READ_INLINE_JS, &[json!(node.index)], true)
            .await?;
        serde_json::from_value(remote["value"].clone()).context("Malformed inline style")
    }

    async fn set_inline_position(&self, node: &DescendantRef, style: &InlinePosition) -> Result<()> {
        self.parent
            .call_function_on(
                &node.list,
                WRITE_INLINE_JS,
                &[json!(node.index), serde_json::to_value(style)?],
                true,
            )
            .await?;
        Ok(())
    }

    async fn release_descendants(&self) -> Result<()> {
        let lists = self
            .probed
            .lock()
            .map(|mut probed| std::mem::take(&mut *probed))
            .unwrap_or_default();
        for list in &lists {
            self.parent.release_object(list).await?;
        }
        debug!("Released {} descendant lists", lists.len());
        Ok(())
    }
}
