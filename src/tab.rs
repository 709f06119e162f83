use crate::capture::ScrollCapturer;
use crate::element::Element;
use crate::error::{CaptureError, Result as CaptureResult};
use crate::stitch::StitchedImage;
use crate::surface::{SnapshotProvider, ZoomHost};
use crate::transport::{Transport, TransportResponse, next_id};
use crate::types::{CaptureOptions, Viewport};
use crate::utils::{self, send_and_get_msg};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Represents a CDP browser tab (target) session.
pub struct Tab {
    pub(crate) transport: Arc<Transport>,
    pub(crate) session_id: String,
    pub(crate) target_id: String,
}

impl Tab {
    /// Creates a new blank tab and attaches to it.
    pub(crate) async fn new(transport: Arc<Transport>) -> Result<Self> {
        let TransportResponse::Response(res_create) = transport
            .send(json!({ "id": next_id(), "method": "Target.createTarget", "params": { "url": "about:blank" } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let target_id = res_create.result["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        let TransportResponse::Response(res_attach) = transport
            .send(json!({ "id": next_id(), "method": "Target.attachToTarget", "params": { "targetId": target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let session_id = res_attach.result["sessionId"]
            .as_str()
            .context("No sessionId")?
            .to_string();

        Ok(Self {
            transport,
            session_id,
            target_id,
        })
    }

    /// Sends a command to this tab and returns the parsed reply message.
    pub(crate) async fn send_cmd(&self, method: &str, params: Value) -> Result<Value> {
        let msg_id = next_id();
        let msg = json!({
            "id": msg_id,
            "method": method,
            "params": params
        })
        .to_string();
        let res = send_and_get_msg(self.transport.clone(), msg_id, &self.session_id, msg)
            .await
            .with_context(|| format!("{method} failed"))?;
        utils::serde_msg(&res)
    }

    /// Emulates device metrics. The device scale factor becomes the snapshot density.
    pub async fn set_viewport(&self, viewport: &Viewport) -> Result<&Self> {
        self.send_cmd(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": viewport.device_scale_factor,
                "mobile": viewport.is_mobile,
            }),
        )
        .await?;
        Ok(self)
    }

    /// Replaces the document with `content` and waits for its load event.
    pub async fn set_content(&self, content: &str) -> Result<&Self> {
        self.send_cmd("Page.enable", json!({})).await?;

        let load = self
            .transport
            .listen_for_event(&self.session_id, "Page.loadEventFired")
            .await?;

        let js_write = format!(
            "document.open(); document.write({}); document.close();",
            serde_json::to_string(content)?
        );
        self.evaluate(&js_write).await?;

        time::timeout(LOAD_TIMEOUT, load)
            .await
            .map_err(|_| anyhow!("Timeout waiting for Page.loadEventFired"))?
            .map_err(|_| anyhow!("Event channel closed"))?;
        self.wait_for_fonts().await?;
        Ok(self)
    }

    /// Navigates to `url` and waits for its load event.
    pub async fn goto(&self, url: &str) -> Result<&Self> {
        self.send_cmd("Page.enable", json!({})).await?;

        let load = self
            .transport
            .listen_for_event(&self.session_id, "Page.loadEventFired")
            .await?;

        let res = self.send_cmd("Page.navigate", json!({ "url": url })).await?;
        if let Some(err) = res["result"]["errorText"].as_str() {
            return Err(anyhow!("Navigation to {url} failed: {err}"));
        }

        time::timeout(LOAD_TIMEOUT, load)
            .await
            .map_err(|_| anyhow!("Timeout waiting for {url} to load"))?
            .map_err(|_| anyhow!("Event channel closed"))?;
        self.wait_for_fonts().await?;
        Ok(self)
    }

    async fn wait_for_fonts(&self) -> Result<()> {
        self.evaluate("document.fonts ? document.fonts.ready.then(() => true) : true")
            .await?;
        Ok(())
    }

    /// Evaluates an expression in the page and returns its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let res = self
            .send_cmd(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        check_exception(&res)?;
        Ok(res["result"]["result"]["value"].clone())
    }

    /// Calls `declaration` with `this` bound to the remote object `object_id`.
    ///
    /// Returns the CDP `RemoteObject`, which carries `value` when `by_value` is set and
    /// `objectId` otherwise.
    pub(crate) async fn call_function_on(
        &self,
        object_id: &str,
        declaration: &str,
        args: &[Value],
        by_value: bool,
    ) -> Result<Value> {
        let arguments: Vec<Value> = args.iter().map(|v| json!({ "value": v })).collect();
        let res = self
            .send_cmd(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": declaration,
                    "arguments": arguments,
                    "returnByValue": by_value,
                    "awaitPromise": true
                }),
            )
            .await?;
        check_exception(&res)?;
        Ok(res["result"]["result"].clone())
    }

    /// Frees a remote object handle obtained with `returnByValue: false`.
    pub(crate) async fn release_object(&self, object_id: &str) -> Result<()> {
        self.send_cmd("Runtime.releaseObject", json!({ "objectId": object_id }))
            .await?;
        Ok(())
    }

    /// Finds the first element matching the given CSS selector.
    pub async fn find_element(&self, selector: &str) -> Result<Element<'_>> {
        let doc = self.send_cmd("DOM.getDocument", json!({})).await?;
        let root_node_id = doc["result"]["root"]["nodeId"]
            .as_u64()
            .context("No root node")?;

        let found = self
            .send_cmd(
                "DOM.querySelector",
                json!({ "nodeId": root_node_id, "selector": selector }),
            )
            .await?;
        let node_id = found["result"]["nodeId"]
            .as_u64()
            .filter(|id| *id != 0)
            .with_context(|| format!("Element not found: {selector}"))?;

        Element::new(self, node_id).await
    }

    /// Polls for `selector` until it appears or `timeout_ms` elapses.
    pub async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<Element<'_>> {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            match self.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(_) if start.elapsed() < timeout => {
                    time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Captures the scrollable element matching `selector` as one tall image.
    pub async fn capture_scrollable(
        &self,
        selector: &str,
        options: CaptureOptions,
    ) -> CaptureResult<StitchedImage> {
        let capturer = ScrollCapturer::new(options);
        self.capture_scrollable_with(&capturer, selector).await
    }

    /// Same as [`Tab::capture_scrollable`] with a caller-owned capturer, e.g. to subscribe
    /// to its events or share a session registry.
    pub async fn capture_scrollable_with(
        &self,
        capturer: &ScrollCapturer,
        selector: &str,
    ) -> CaptureResult<StitchedImage> {
        if let Some(viewport) = &capturer.options().viewport {
            self.set_viewport(viewport)
                .await
                .map_err(CaptureError::Page)?;
        }
        let element = self
            .find_element(selector)
            .await
            .map_err(CaptureError::Page)?;
        match element.is_scrollable().await {
            Ok(true) => {}
            Ok(false) => warn!("{selector} does not scroll vertically, capturing a single stop"),
            Err(e) => debug!("Could not check scrollability of {selector}: {e}"),
        }
        capturer.capture(&element, self).await
    }

    /// Activates the target tab to bring it to the foreground.
    pub async fn activate(&self) -> Result<&Self> {
        let TransportResponse::Response(_) = self
            .transport
            .send(json!({ "id": next_id(), "method": "Target.activateTarget", "params": { "targetId": self.target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };
        Ok(self)
    }

    /// Closes the target tab.
    pub async fn close(&self) -> Result<()> {
        self.transport
            .send(json!({ "id": next_id(), "method": "Target.closeTarget", "params": { "targetId": self.target_id } }))
            .await?;
        Ok(())
    }
}

fn check_exception(res: &Value) -> Result<()> {
    if let Some(details) = res["result"].get("exceptionDetails") {
        let text = details["exception"]["description"]
            .as_str()
            .or_else(|| details["text"].as_str())
            .unwrap_or("unknown exception");
        return Err(anyhow!("Script threw: {text}"));
    }
    Ok(())
}

#[async_trait]
impl SnapshotProvider for Tab {
    async fn snapshot(&self) -> Result<String> {
        self.activate().await?;
        let res = self
            .send_cmd(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "fromSurface": true,
                    "captureBeyondViewport": false,
                }),
            )
            .await?;
        res["result"]["data"]
            .as_str()
            .map(str::to_string)
            .context("No image data received")
    }
}

#[async_trait]
impl ZoomHost for Tab {
    async fn device_pixel_ratio(&self) -> Result<f64> {
        self.evaluate("window.devicePixelRatio")
            .await?
            .as_f64()
            .context("devicePixelRatio is not a number")
    }

    /// Window width over layout viewport width, which grows with the browser zoom level.
    async fn page_zoom(&self) -> Result<f64> {
        let ratio = self
            .evaluate("window.innerWidth > 0 ? window.outerWidth / window.innerWidth : 0")
            .await?
            .as_f64()
            .context("Zoom ratio is not a number")?;
        Ok((ratio * 100.0).round() / 100.0)
    }

    async fn user_agent(&self) -> Result<String> {
        self.evaluate("navigator.userAgent")
            .await?
            .as_str()
            .map(str::to_string)
            .context("userAgent is not a string")
    }

    fn device_pixel_snapshots(&self) -> bool {
        true
    }
}
