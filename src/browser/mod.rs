//! Native browser management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (Chrome → Chromium → Brave, cross-platform).
//! * `BrowserPool`: shared persistent browser process with a fresh tab per fetch.
//! * Launching a headless browser session with stealth defaults.
//!
//! Stealth model:
//! - This module provides *process-level* defaults (fixed desktop profile, browser flags).
//! - JS-level fingerprint overrides are installed per page in the fetch pipeline
//!   (see `fetch/stealth.rs`).

pub mod driver;

use crate::core::config;
use crate::fetch::headers::HEADER_PROFILE;
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    // 1. Explicit env override
    if let Some(p) = config::chrome_executable_override() {
        return Some(p);
    }

    // 2. PATH scan (Linux / macOS / Windows package managers)
    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    // 3. Platform-specific well-known paths
    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Returns `true` when a usable browser binary is present on this machine.
pub fn native_browser_available() -> bool {
    find_chrome_executable().is_some()
}

// ── Headless browser config builder ──────────────────────────────────────────

/// Build a `BrowserConfig` for headless operation with stealth defaults.
///
/// Flags chosen for:
/// * Compatibility with CI / restricted environments (`--no-sandbox`, `--disable-dev-shm-usage`).
/// * Stealth: `--disable-blink-features=AutomationControlled` hides the
///   `navigator.webdriver` flag; the user agent is the fixed desktop profile
///   so header-based and client-hint fingerprinting agree.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        // Headless flags compatible with Chrome, Chromium and Brave
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage") // avoids /dev/shm OOM in constrained environments
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        // Stealth: suppress CDP automation fingerprint
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", HEADER_PROFILE.user_agent))
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Browser pool (shared browser process) ────────────────────────────────────

/// A shared, long-lived browser process that hands out a fresh tab per fetch.
///
/// Instead of launching/destroying a full browser on every fetch (slow), the
/// pool keeps one browser alive and opens a fresh `Page` per request. If the
/// process crashes, the next `new_page()` restarts it transparently.
///
/// Each fetch owns its `Page` exclusively and closes it when done; the
/// browser stays alive. Process startup/shutdown lives entirely here; the
/// fetch pipeline only consumes the [`driver::PageProvider`] seam.
pub struct BrowserPool {
    exe: String,
    inner: Mutex<Option<Browser>>,
}

impl BrowserPool {
    /// Create a pool for the given executable. Browser is lazy-started.
    pub fn new(exe: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            exe: exe.into(),
            inner: Mutex::new(None),
        })
    }

    /// Create a pool using the auto-discovered executable.
    /// Returns `None` if no browser is installed on this machine.
    pub fn new_auto() -> Option<Arc<Self>> {
        find_chrome_executable().map(Self::new)
    }

    /// Open a fresh tab from the persistent browser.
    ///
    /// * Lazy-starts the browser on first call.
    /// * Restarts transparently if the process has crashed.
    /// * Close the returned `Page` when done; the browser stays alive.
    pub async fn open_page(&self) -> Result<Page> {
        let mut guard = self.inner.lock().await;

        // Probe: try opening a blank tab to test if the browser is still alive.
        let probe = match guard.as_mut() {
            Some(b) => b.new_page("about:blank").await.ok(),
            None => None,
        };
        if let Some(page) = probe {
            return Ok(page);
        }

        if guard.is_some() {
            warn!("Browser pool: instance dead, restarting...");
            if let Some(mut old) = guard.take() {
                let _ = old.close().await;
            }
        }
        info!("Browser pool: launching new instance ({})", self.exe);
        let config = build_headless_config(&self.exe, 1920, 1080)?;
        let (new_browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Pool: failed to launch ({}): {}", self.exe, e))?;
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Pool CDP handler error: {}", e);
                }
            }
        });
        *guard = Some(new_browser);

        let b = guard.as_mut().expect("browser present after init");
        b.new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Pool: failed to open tab: {}", e))
    }

    /// Gracefully close the pooled browser instance.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut b) = guard.take() {
            let _ = b.close().await;
            info!("Browser pool shut down");
        }
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        // Best-effort cleanup. Drop cannot await; if we're inside a tokio runtime,
        // spawn a task to close the browser to avoid zombie Chromium processes.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        if let Ok(mut guard) = self.inner.try_lock() {
            if let Some(mut browser) = guard.take() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}
