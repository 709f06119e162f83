//! In-memory page used to drive the capture engine without a browser.
//!
//! The container's content is a tall image whose every row has a distinct color.
//! Snapshots render the viewport: gray page background, the container's visible
//! rows at its on-screen position, and a red band for each fixed/sticky element
//! that is still positioned against the viewport.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use cdp_scroll_shot::surface::{ScrollContainer, SnapshotProvider, ZoomHost};
use cdp_scroll_shot::types::{ComputedLayout, InlinePosition, NodeProbe, Rect, ScrollMetrics};
use image::imageops;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Mutex;

pub const BACKGROUND: Rgba<u8> = Rgba([200, 200, 200, 255]);
pub const STICKY_BAND: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BORDER: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const BAND_HEIGHT: u32 = 20;

pub const WINDOWS_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Color of content row `y`.
pub fn row_color(y: u32) -> Rgba<u8> {
    Rgba([(y % 256) as u8, (y / 256) as u8, 0x80, 255])
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    /// Position from the stylesheet, used when no inline position is set.
    pub sheet_position: String,
    pub inline: InlinePosition,
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub rect: Rect,
}

impl FakeElement {
    pub fn new(sheet_position: &str, rect: Rect) -> Self {
        Self {
            sheet_position: sheet_position.to_string(),
            inline: InlinePosition::default(),
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: "1".to_string(),
            rect,
        }
    }

    pub fn with_inline(mut self, inline: InlinePosition) -> Self {
        self.inline = inline;
        self
    }

    pub fn resolved_position(&self) -> &str {
        if self.inline.position.is_empty() {
            &self.sheet_position
        } else {
            &self.inline.position
        }
    }

    fn tracks_viewport(&self) -> bool {
        matches!(self.resolved_position(), "fixed" | "sticky")
    }
}

#[derive(Debug, Default)]
pub struct PageState {
    pub scroll_top: f64,
    pub scroll_history: Vec<f64>,
    pub elements: Vec<FakeElement>,
    pub snapshots: usize,
    pub style_writes: usize,
    pub probes: usize,
    pub releases: usize,
    /// Snapshots rendered while some sticky element was still viewport-tracking.
    pub snapshots_with_sticky: usize,
}

pub struct FakePage {
    pub content: RgbaImage,
    /// Client box of the container in the viewport.
    pub container: Rect,
    /// Border width around the client box.
    pub border: f64,
    pub viewport: (u32, u32),
    pub dpr: Option<f64>,
    pub page_zoom: Option<f64>,
    pub user_agent: &'static str,
    pub device_pixel_snapshots: bool,
    /// 1-based snapshot number that fails to be delivered.
    pub fail_snapshot: Option<usize>,
    /// 1-based snapshot number that comes back as garbage.
    pub corrupt_snapshot: Option<usize>,
    /// 1-based style write number that fails.
    pub fail_style_write: Option<usize>,
    pub state: Mutex<PageState>,
}

impl FakePage {
    /// A `width × client_height` container showing `scroll_height` rows, placed at (40, 60)
    /// in an 800×900 viewport.
    pub fn new(width: u32, scroll_height: u32, client_height: u32) -> Self {
        let content = RgbaImage::from_fn(width, scroll_height, |_, y| row_color(y));
        Self {
            content,
            container: Rect::new(40.0, 60.0, f64::from(width), f64::from(client_height)),
            border: 0.0,
            viewport: (800, 900),
            dpr: Some(1.0),
            page_zoom: Some(1.0),
            user_agent: WINDOWS_UA,
            device_pixel_snapshots: false,
            fail_snapshot: None,
            corrupt_snapshot: None,
            fail_style_write: None,
            state: Mutex::new(PageState::default()),
        }
    }

    pub fn with_scroll_top(self, top: f64) -> Self {
        self.state.lock().unwrap().scroll_top = top;
        self
    }

    pub fn with_element(self, element: FakeElement) -> Self {
        self.state.lock().unwrap().elements.push(element);
        self
    }

    /// Moves the client box to (`left`, `top`), which may lie partly off-screen.
    pub fn at(mut self, left: f64, top: f64) -> Self {
        self.container.left = left;
        self.container.top = top;
        self
    }

    pub fn with_border(mut self, width: f64) -> Self {
        self.border = width;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &'static str) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_device_pixel_snapshots(mut self) -> Self {
        self.device_pixel_snapshots = true;
        self
    }

    pub fn with_dpr(mut self, dpr: Option<f64>) -> Self {
        self.dpr = dpr;
        self
    }

    pub fn with_page_zoom(mut self, zoom: Option<f64>) -> Self {
        self.page_zoom = zoom;
        self
    }

    /// Sticky header at the top edge of the container.
    pub fn sticky_header(&self) -> FakeElement {
        FakeElement::new(
            "sticky",
            Rect::new(
                self.container.left,
                self.container.top,
                self.container.width,
                f64::from(BAND_HEIGHT),
            ),
        )
    }

    pub fn scroll_top(&self) -> f64 {
        self.state.lock().unwrap().scroll_top
    }

    pub fn history(&self) -> Vec<f64> {
        self.state.lock().unwrap().scroll_history.clone()
    }

    pub fn elements(&self) -> Vec<FakeElement> {
        self.state.lock().unwrap().elements.clone()
    }

    fn client_height(&self) -> u32 {
        self.container.height as u32
    }

    /// Border box of the container.
    fn outer_rect(&self) -> Rect {
        let b = self.border;
        Rect::new(
            self.container.left - b,
            self.container.top - b,
            self.container.width + 2.0 * b,
            self.container.height + 2.0 * b,
        )
    }

    fn render(&self, state: &PageState, zoom: f64) -> RgbaImage {
        let (vw, vh) = self.viewport;
        let mut frame = RgbaImage::from_pixel(vw, vh, BACKGROUND);

        let outer = self.outer_rect();
        let frame_box = RgbaImage::from_pixel(outer.width as u32, outer.height as u32, BORDER);
        imageops::replace(&mut frame, &frame_box, outer.left as i64, outer.top as i64);

        let top = state.scroll_top as u32;
        let (width, height) = (self.content.width(), self.client_height());
        let visible = imageops::crop_imm(&self.content, 0, top, width, height).to_image();
        imageops::replace(
            &mut frame,
            &visible,
            self.container.left as i64,
            self.container.top as i64,
        );

        for element in state.elements.iter().filter(|e| e.tracks_viewport()) {
            let band = RgbaImage::from_pixel(
                element.rect.width as u32,
                element.rect.height as u32,
                STICKY_BAND,
            );
            let (x, y) = (element.rect.left as i64, element.rect.top as i64);
            imageops::replace(&mut frame, &band, x, y);
        }

        if zoom == 1.0 {
            frame
        } else {
            let w = (f64::from(vw) * zoom).round() as u32;
            let h = (f64::from(vh) * zoom).round() as u32;
            RgbaImage::from_fn(w, h, |x, y| {
                let sx = ((f64::from(x) / zoom) as u32).min(vw - 1);
                let sy = ((f64::from(y) / zoom) as u32).min(vh - 1);
                *frame.get_pixel(sx, sy)
            })
        }
    }
}

pub fn encode_png(img: &RgbaImage) -> String {
    let mut data = Vec::new();
    img.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .expect("encode png");
    BASE64.encode(data)
}

pub fn decode_png(data: &[u8]) -> RgbaImage {
    image::load_from_memory_with_format(data, ImageFormat::Png)
        .expect("decode png")
        .to_rgba8()
}

#[async_trait]
impl ScrollContainer for FakePage {
    type Node = usize;

    async fn metrics(&self) -> Result<ScrollMetrics> {
        Ok(ScrollMetrics {
            scroll_top: self.scroll_top(),
            scroll_height: self.content.height(),
            client_width: self.content.width(),
            client_height: self.client_height(),
            client_left: self.border,
            client_top: self.border,
        })
    }

    async fn bounding_rect(&self) -> Result<Rect> {
        Ok(self.outer_rect())
    }

    async fn set_scroll_top(&self, top: f64) -> Result<()> {
        let max = f64::from(self.content.height().saturating_sub(self.client_height()));
        let top = top.clamp(0.0, max);
        let mut state = self.state.lock().unwrap();
        state.scroll_top = top;
        state.scroll_history.push(top);
        Ok(())
    }

    async fn probe_descendants(&self) -> Result<Vec<NodeProbe<usize>>> {
        let mut state = self.state.lock().unwrap();
        state.probes += 1;
        Ok(state
            .elements
            .iter()
            .enumerate()
            .map(|(node, e)| NodeProbe {
                node,
                layout: ComputedLayout {
                    position: e.resolved_position().to_string(),
                    display: e.display.clone(),
                    visibility: e.visibility.clone(),
                    opacity: e.opacity.clone(),
                    rect: e.rect,
                },
            })
            .collect())
    }

    async fn inline_position(&self, node: &usize) -> Result<InlinePosition> {
        let state = self.state.lock().unwrap();
        state
            .elements
            .get(*node)
            .map(|e| e.inline.clone())
            .ok_or_else(|| anyhow!("no element {node}"))
    }

    async fn set_inline_position(&self, node: &usize, style: &InlinePosition) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.style_writes += 1;
        if self.fail_style_write == Some(state.style_writes) {
            return Err(anyhow!("style write {} rejected", state.style_writes));
        }
        let element = state
            .elements
            .get_mut(*node)
            .ok_or_else(|| anyhow!("no element {node}"))?;
        element.inline = style.clone();
        Ok(())
    }

    async fn release_descendants(&self) -> Result<()> {
        self.state.lock().unwrap().releases += 1;
        Ok(())
    }
}

#[async_trait]
impl SnapshotProvider for FakePage {
    async fn snapshot(&self) -> Result<String> {
        let zoom = self.dpr.unwrap_or(1.0);
        let mut state = self.state.lock().unwrap();
        state.snapshots += 1;
        let n = state.snapshots;
        if self.fail_snapshot == Some(n) {
            return Err(anyhow!("capture port closed"));
        }
        if self.corrupt_snapshot == Some(n) {
            return Ok(BASE64.encode(b"definitely not a png"));
        }
        if state.elements.iter().any(FakeElement::tracks_viewport) {
            state.snapshots_with_sticky += 1;
        }
        Ok(encode_png(&self.render(&state, zoom)))
    }
}

#[async_trait]
impl ZoomHost for FakePage {
    async fn device_pixel_ratio(&self) -> Result<f64> {
        self.dpr.ok_or_else(|| anyhow!("devicePixelRatio unavailable"))
    }

    async fn page_zoom(&self) -> Result<f64> {
        self.page_zoom.ok_or_else(|| anyhow!("zoom query failed"))
    }

    async fn user_agent(&self) -> Result<String> {
        Ok(self.user_agent.to_string())
    }

    fn device_pixel_snapshots(&self) -> bool {
        self.device_pixel_snapshots
    }
}
