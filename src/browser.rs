mod browser_config;

pub use browser_config::BrowserConfig;

use crate::error::{CaptureError, Result as CaptureResult};
use crate::stitch::StitchedImage;
use crate::tab::Tab;
use crate::transport::Transport;
use crate::types::CaptureOptions;
use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use regex::Regex;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

static GLOBAL_BROWSER: Mutex<Option<Browser>> = Mutex::const_new(None);

/// Milliseconds to wait for the capture target to appear on a navigated page.
const SELECTOR_TIMEOUT_MS: u64 = 10_000;

/// Holds the browser process and its user data directory.
struct BrowserProcess {
    child: Child,
    _temp: TempDir,
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        // `_temp` is dropped afterwards, deleting the profile directory.
    }
}

/// A browser instance driven over the DevTools protocol.
#[derive(Clone)]
pub struct Browser {
    transport: Arc<Transport>,
    process: Arc<Mutex<Option<BrowserProcess>>>,
}

impl Browser {
    /// Launches a new headless browser instance.
    pub async fn new() -> Result<Self> {
        Self::launch(BrowserConfig::new()?).await
    }

    /// Launches a new browser instance with a visible window.
    pub async fn new_with_head() -> Result<Self> {
        Self::launch(BrowserConfig::new()?.headless(false)).await
    }

    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let args = config.get_browser_args();

        #[cfg(windows)]
        let mut cmd = {
            use std::os::windows::process::CommandExt;
            let mut c = Command::new(&config.executable_path);
            c.creation_flags(0x08000000); // CREATE_NO_WINDOW
            c
        };
        #[cfg(not(windows))]
        let mut cmd = Command::new(&config.executable_path);

        let mut child = cmd
            .args(args)
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", config.executable_path.display()))?;
        let stderr = child.stderr.take().context("No stderr")?;
        let process = BrowserProcess {
            child,
            _temp: config.temp_dir,
        };
        let ws_url = Self::wait_for_ws(stderr).await?;
        info!("Browser listening on {ws_url}");

        Ok(Self {
            transport: Arc::new(Transport::new(&ws_url).await?),
            process: Arc::new(Mutex::new(Some(process))),
        })
    }

    /// Reads browser stderr lines to extract the WebSocket debugging URL.
    async fn wait_for_ws(stderr: std::process::ChildStderr) -> Result<String> {
        let reader = BufReader::new(stderr);
        let re = Regex::new(r"listening on (.*/devtools/browser/.*)$")?;
        tokio::task::spawn_blocking(move || {
            for line in reader.lines() {
                let l = line?;
                if let Some(cap) = re.captures(&l) {
                    return Ok(cap[1].to_string());
                }
            }
            Err(anyhow!("WS URL not found in stderr"))
        })
        .await?
    }

    /// Opens a new blank tab.
    pub async fn new_tab(&self) -> Result<Tab> {
        Tab::new(self.transport.clone()).await
    }

    /// Loads `html` into a fresh tab and captures the scroll container matching `selector`.
    pub async fn capture_scrollable_html(
        &self,
        html: &str,
        selector: &str,
        options: CaptureOptions,
    ) -> CaptureResult<StitchedImage> {
        let tab = self.new_tab().await.map_err(CaptureError::Page)?;

        let result = async {
            tab.set_content(html).await.map_err(CaptureError::Page)?;
            tab.capture_scrollable(selector, options).await
        }
        .await;

        if let Err(e) = tab.close().await {
            warn!("Failed to close tab after capture: {e:?}");
        }
        result
    }

    /// Navigates a fresh tab to `url` and captures the scroll container matching `selector`.
    pub async fn capture_scrollable_url(
        &self,
        url: &str,
        selector: &str,
        options: CaptureOptions,
    ) -> CaptureResult<StitchedImage> {
        let tab = self.new_tab().await.map_err(CaptureError::Page)?;

        let result = async {
            tab.goto(url).await.map_err(CaptureError::Page)?;
            tab.wait_for_selector(selector, SELECTOR_TIMEOUT_MS)
                .await
                .map_err(CaptureError::Page)?;
            tab.capture_scrollable(selector, options).await
        }
        .await;

        if let Err(e) = tab.close().await {
            warn!("Failed to close tab after capture: {e:?}");
        }
        result
    }

    /// Closes the browser process and cleans up resources.
    pub async fn close_async(&self) -> Result<()> {
        self.transport.shutdown().await;
        let mut lock = self.process.lock().await;
        // Dropping the process kills it and removes the profile directory.
        lock.take();
        Ok(())
    }

    /// Returns a shared browser instance, launching it on first use.
    pub async fn instance() -> Result<Self> {
        let mut lock = GLOBAL_BROWSER.lock().await;
        if let Some(b) = &*lock {
            return Ok(b.clone());
        }
        let b = Self::new().await?;
        *lock = Some(b.clone());
        Ok(b)
    }

    /// Shuts down the shared instance, if one was launched.
    pub async fn close_instance() -> Result<()> {
        let browser = GLOBAL_BROWSER.lock().await.take();
        if let Some(b) = browser {
            b.close_async().await?;
        }
        Ok(())
    }
}
