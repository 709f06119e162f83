use anyhow::{Context, Result, anyhow};
use rand::prelude::SliceRandom;
use std::net;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use which::which;

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

static DEFAULT_ARGS: [&str; 17] = [
    "--no-sandbox",
    "--no-zygote",
    "--in-process-gpu",
    "--disable-dev-shm-usage",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-sync",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--force-color-profile=srgb",
    // Scrollbars would otherwise be composited into every tile.
    "--hide-scrollbars",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
    "--metrics-recording-only",
];

/// Launch settings for a browser process.
pub struct BrowserConfig {
    debug_port: u16,
    pub(crate) headless: bool,
    pub(crate) executable_path: PathBuf,
    pub(crate) window_size: (u32, u32),
    pub(crate) temp_dir: TempDir,
}

impl BrowserConfig {
    /// Auto-detects the executable (`CHROME` env var first) and picks a free debugging port.
    pub fn new() -> Result<Self> {
        Ok(Self {
            headless: true,
            executable_path: default_executable()?,
            debug_port: get_available_port().context("Failed to get available port")?,
            window_size: (1200, 1600),
            temp_dir: tempfile::Builder::new()
                .prefix("cdp-scroll-shot")
                .tempdir()
                .context("Failed to create user data directory")?,
        })
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = path.into();
        self
    }

    /// Window size; the viewport height is the tile height of full-page captures.
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    pub(crate) fn get_browser_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.debug_port),
            format!("--user-data-dir={}", self.temp_dir.path().display()),
            format!("--window-size={},{}", self.window_size.0, self.window_size.1),
        ];

        args.extend(DEFAULT_ARGS.iter().map(|s| s.to_string()));
        if self.headless {
            args.push("--headless=new".to_string());
        }

        args
    }
}

fn default_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME")
        && Path::new(&path).exists()
    {
        return Ok(path.into());
    }

    let apps = [
        "google-chrome-stable",
        "google-chrome",
        "chromium",
        "chromium-browser",
        "microsoft-edge-stable",
        "chrome",
        "msedge",
        "microsoft-edge",
    ];
    for app in apps {
        if let Ok(path) = which(app) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let macos_apps = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        for path in macos_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = get_chrome_path_from_registry().filter(|p| p.exists()) {
            return Ok(path);
        }

        let windows_apps = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for path in windows_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    Err(anyhow!("Could not auto detect a chrome executable, set CHROME"))
}

#[cfg(windows)]
fn get_chrome_path_from_registry() -> Option<PathBuf> {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey("SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths\\chrome.exe")
        .and_then(|key| key.get_value::<String, _>(""))
        .map(PathBuf::from)
        .ok()
}

fn get_available_port() -> Option<u16> {
    let mut ports: Vec<u16> = (8000..9000).collect();
    ports.shuffle(&mut rand::thread_rng());
    ports.iter().find(|port| port_is_available(**port)).copied()
}

fn port_is_available(port: u16) -> bool {
    net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}
