//! Trait seam between the fetch pipeline and the browser process.
//!
//! The fetch pipeline never touches `chromiumoxide` directly: it consumes
//! [`PageProvider`] / [`PageDriver`], so tests can substitute scripted doubles
//! and verify the acquire/release contract. [`CdpPage`] is the production
//! implementation over a `chromiumoxide::Page`.

use crate::browser::BrowserPool;
use crate::fetch::headers::HeaderProfile;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams, UserAgentBrandVersion,
    UserAgentMetadata,
};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use std::time::Duration;
use tracing::debug;

/// Hands out one exclusively-owned page per fetch invocation.
///
/// The browser process behind it is shared and externally synchronized; this
/// trait is the only operation the fetch core needs from it.
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>>;
}

/// Page-level primitives used by one fetch session.
///
/// All scripts passed in are self-contained: they run in the remote document
/// context and return plain data. No method may be assumed idempotent except
/// `close`, which callers invoke exactly once.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Install a script that runs in every future document loaded in this page,
    /// before any page script executes.
    async fn install_bootstrap_script(&self, script: &str) -> Result<()>;

    /// Attach extra HTTP headers to every request this page issues.
    async fn set_extra_headers(&self, headers: Vec<(String, String)>) -> Result<()>;

    /// Override the user agent string together with client-hint metadata so
    /// header-based and client-hint-based fingerprinting agree.
    async fn set_user_agent(&self, profile: &HeaderProfile) -> Result<()>;

    /// Emulate a fixed desktop viewport.
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Navigate and wait until outstanding network activity is quiet.
    /// Callers bound this with their own timeout.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait for the next navigation event (e.g. a challenge redirecting to the
    /// real page). Callers bound this with their own timeout.
    async fn wait_for_navigation(&self) -> Result<()>;

    /// Evaluate a self-contained expression in the document, expecting a bool.
    async fn eval_bool(&self, expr: &str) -> Result<bool>;

    /// Serialize the full current document markup.
    async fn content(&self) -> Result<String>;

    /// Release the page resource. Invoked exactly once per session.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl PageProvider for BrowserPool {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>> {
        let page = self.open_page().await?;
        Ok(Box::new(CdpPage::new(page)))
    }
}

// ── chromiumoxide-backed implementation ──────────────────────────────────────

/// Production [`PageDriver`] over a `chromiumoxide::Page`.
pub struct CdpPage {
    page: Page,
    /// Quiet window for the post-navigation network-idle heuristic.
    quiet_ms: u64,
    /// Internal cap on the quiet wait; the caller's navigation timeout is the
    /// real bound.
    quiet_cap_ms: u64,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            quiet_ms: 500,
            quiet_cap_ms: 30_000,
        }
    }

    /// Wait until no new resource entries appear for `quiet_ms` consecutive ms
    /// or until `quiet_cap_ms` has elapsed.
    ///
    /// Polls `performance.getEntriesByType("resource").length` every 250 ms;
    /// a Playwright-style networkidle heuristic that works without CDP Network
    /// events.
    async fn wait_until_quiet(&self) -> Result<()> {
        let poll_ms = 250u64;
        let start = std::time::Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = std::time::Instant::now();

        loop {
            if start.elapsed().as_millis() as u64 >= self.quiet_cap_ms {
                debug!("wait_until_quiet: cap reached after {}ms", self.quiet_cap_ms);
                break;
            }

            let count: u64 = self
                .page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_u64())
                .unwrap_or(0);

            let ready_complete: bool = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_str().map(|s| s == "complete"))
                .unwrap_or(false);

            if !ready_complete {
                // DOM not fully loaded; keep waiting and do not allow "idle" to trigger.
                stable_since = std::time::Instant::now();
                last_count = count;
            } else if count != last_count {
                last_count = count;
                stable_since = std::time::Instant::now();
            } else if stable_since.elapsed().as_millis() as u64 >= self.quiet_ms {
                debug!(
                    "wait_until_quiet: idle after {}ms ({} resources)",
                    start.elapsed().as_millis(),
                    count
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn install_bootstrap_script(&self, script: &str) -> Result<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
            .await
            .map_err(|e| anyhow!("Failed to install bootstrap script: {}", e))?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: Vec<(String, String)>) -> Result<()> {
        let map: serde_json::Map<String, serde_json::Value> = headers
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        let params = SetExtraHttpHeadersParams::builder()
            .headers(Headers::new(serde_json::Value::Object(map)))
            .build()
            .map_err(|e| anyhow!("Failed to build extra-headers params: {}", e))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| anyhow!("Failed to set extra headers: {}", e))?;
        Ok(())
    }

    async fn set_user_agent(&self, profile: &HeaderProfile) -> Result<()> {
        // Keeps navigator.userAgentData consistent with the Sec-CH-UA request
        // headers in the header profile; a mismatch is a detection vector.
        let metadata = UserAgentMetadata {
            brands: Some(
                profile
                    .brands
                    .iter()
                    .map(|(brand, version)| UserAgentBrandVersion::new(*brand, *version))
                    .collect(),
            ),
            full_version_list: Some(
                profile
                    .brands
                    .iter()
                    .map(|(brand, version)| {
                        UserAgentBrandVersion::new(*brand, format!("{}.0.0.0", version))
                    })
                    .collect(),
            ),
            platform: profile.ch_platform.to_string(),
            platform_version: profile.ch_platform_version.to_string(),
            architecture: profile.ch_architecture.to_string(),
            model: String::new(),
            mobile: false,
            bitness: Some("64".to_string()),
            wow64: Some(false),
            form_factors: None,
        };

        let params = SetUserAgentOverrideParams::builder()
            .user_agent(profile.user_agent)
            .platform(profile.ch_platform)
            .user_agent_metadata(metadata)
            .build()
            .map_err(|e| anyhow!("Failed to build UA override params: {}", e))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| anyhow!("Failed to set UA override: {}", e))?;
        Ok(())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!("Failed to build device-metrics params: {}", e))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| anyhow!("Failed to set viewport: {}", e))?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate: {}", e))?;
        self.wait_until_quiet().await
    }

    async fn wait_for_navigation(&self) -> Result<()> {
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| anyhow!("Navigation wait failed: {}", e))?;
        self.wait_until_quiet().await
    }

    async fn eval_bool(&self, expr: &str) -> Result<bool> {
        let value = self
            .page
            .evaluate(expr)
            .await
            .map_err(|e| anyhow!("Script evaluation failed: {}", e))?
            .into_value::<serde_json::Value>()
            .map_err(|e| anyhow!("Script result decode failed: {}", e))?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow!("Failed to get page content: {}", e))
    }

    async fn close(&self) -> Result<()> {
        // Page is a cheap Arc handle; close() consumes one.
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| anyhow!("Failed to close page: {}", e))
    }
}
