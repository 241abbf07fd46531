//! Stealth render-aware page fetcher.
//!
//! One fetch invocation is a single linear flow: acquire a page from the
//! shared browser process, install fingerprint overrides, shape the request,
//! navigate under a deadline, wait out an anti-bot interstitial if one shows,
//! poll for content readiness, serialize the document. The page is released
//! exactly once on every exit path; a hard failure surfaces as the
//! empty-string sentinel, telling the caller to use a non-browser fallback.

pub mod headers;
mod readiness;
mod stealth;

use crate::browser::driver::{PageDriver, PageProvider};
use crate::core::config::FetchBudgets;
use headers::HEADER_PROFILE;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Non-fatal failure taxonomy for one fetch invocation. Callers never see
/// these across the output boundary (they collapse to the empty-string
/// sentinel) but the warning channel records which one fired.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The shared browser process could not supply a page.
    #[error("browser page unavailable: {0}")]
    PageUnavailable(String),
    /// Navigation raised an error (a navigation *timeout* is soft and does
    /// not produce this).
    #[error("navigation failed: {0}")]
    Navigation(String),
    /// Anything else unexpected between bootstrap and extraction.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Session status, one terminal outcome per invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchStage {
    Navigating,
    Challenged,
    Polling,
    Done,
    Failed,
}

impl FetchStage {
    fn admits(self, next: FetchStage) -> bool {
        use FetchStage::*;
        matches!(
            (self, next),
            (Navigating, Challenged)
                | (Navigating, Polling)
                | (Challenged, Polling)
                | (Polling, Done)
                | (Navigating, Failed)
                | (Challenged, Failed)
                | (Polling, Failed)
        )
    }
}

/// What one invocation did, for observability and tests. The string output
/// contract is unchanged: an unresolved challenge is indistinguishable from
/// no challenge there, but `challenge_detected` records that the recovery
/// branch ran.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub stage: FetchStage,
    pub challenge_detected: bool,
    pub content_ready: bool,
    pub elapsed: Duration,
}

/// Mutable per-invocation state, scoped to a single call.
pub(crate) struct SessionState {
    pub(crate) url: String,
    stage: FetchStage,
    challenge_detected: bool,
    content_ready: bool,
    started: Instant,
}

impl SessionState {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            stage: FetchStage::Navigating,
            challenge_detected: false,
            content_ready: false,
            started: Instant::now(),
        }
    }

    pub(crate) fn transition(&mut self, next: FetchStage) {
        debug_assert!(
            self.stage.admits(next),
            "invalid stage transition {:?} -> {:?}",
            self.stage,
            next
        );
        debug!(url = %self.url, from = ?self.stage, to = ?next, "fetch stage transition");
        if next == FetchStage::Challenged {
            self.challenge_detected = true;
        }
        self.stage = next;
    }

    fn into_report(self) -> FetchReport {
        FetchReport {
            stage: self.stage,
            challenge_detected: self.challenge_detected,
            content_ready: self.content_ready,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Render-aware stealth fetcher over a shared browser process.
pub struct StealthFetcher {
    pages: Arc<dyn PageProvider>,
    pub(crate) budgets: FetchBudgets,
}

impl StealthFetcher {
    pub fn new(pages: Arc<dyn PageProvider>) -> Self {
        Self {
            pages,
            budgets: FetchBudgets::default(),
        }
    }

    /// Builder: override the default timing budgets.
    pub fn with_budgets(mut self, budgets: FetchBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Fetch the fully rendered HTML of `url`.
    ///
    /// Returns a non-empty markup string on success (including the
    /// soft-timeout case where readiness was never confirmed; partial
    /// content is preferable to none), or the empty string on hard failure.
    /// Callers must treat the empty string as "use an alternate, non-browser
    /// retrieval path". Never panics, never raises.
    pub async fn fetch_rendered(&self, url: &str) -> String {
        self.fetch_with_report(url).await.0
    }

    /// Like [`fetch_rendered`](Self::fetch_rendered), also returning the
    /// session report.
    pub async fn fetch_with_report(&self, url: &str) -> (String, FetchReport) {
        let mut state = SessionState::new(url);
        match self.try_fetch(&mut state).await {
            Ok(html) => (html, state.into_report()),
            Err(e) => {
                warn!(url, error = %e, "browser fetch failed, falling back to empty sentinel");
                state.transition(FetchStage::Failed);
                (String::new(), state.into_report())
            }
        }
    }

    async fn try_fetch(&self, state: &mut SessionState) -> Result<String, FetchError> {
        let page = self
            .pages
            .new_page()
            .await
            .map_err(|e| FetchError::PageUnavailable(e.to_string()))?;

        let result = self.drive(page.as_ref(), state).await;

        // Release exactly once on every exit path; a close error must not
        // shadow the drive result.
        if let Err(e) = page.close().await {
            debug!(url = %state.url, "page close error (non-fatal): {}", e);
        }

        let html = result?;
        state.transition(FetchStage::Done);
        Ok(html)
    }

    async fn drive(
        &self,
        page: &dyn PageDriver,
        state: &mut SessionState,
    ) -> Result<String, FetchError> {
        // Fingerprint overrides must land before any navigation occurs.
        page.install_bootstrap_script(Self::fingerprint_override_script())
            .await?;

        // Request shaping. Ordering is part of the contract: headers, then
        // user agent + client hints, then viewport, all before navigation.
        let referer = headers::choose_referer(&state.url, &mut rand::rng());
        let mut header_list: Vec<(String, String)> = HEADER_PROFILE
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        header_list.push(("Referer".to_string(), referer));
        page.set_extra_headers(header_list).await?;
        page.set_user_agent(&HEADER_PROFILE).await?;
        page.set_viewport(HEADER_PROFILE.viewport_width, HEADER_PROFILE.viewport_height)
            .await?;

        // Navigation under the hard deadline. A timeout is not retried; the
        // flow falls through to whatever partial document state exists.
        let nav_timeout = Duration::from_millis(self.budgets.nav_timeout_ms);
        match tokio::time::timeout(nav_timeout, page.navigate(&state.url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(FetchError::Navigation(e.to_string())),
            Err(_) => {
                debug!(url = %state.url, "navigation timed out, proceeding with partial document")
            }
        }

        self.recover_from_challenge(page, state).await?;

        state.content_ready = self.poll_until_ready(page, state).await?;

        let html = page.content().await?;
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        use FetchStage::*;
        assert!(Navigating.admits(Challenged));
        assert!(Navigating.admits(Polling));
        assert!(Challenged.admits(Polling));
        assert!(Polling.admits(Done));
        assert!(Polling.admits(Failed));

        // Terminal states admit nothing; the challenge branch cannot repeat.
        assert!(!Done.admits(Failed));
        assert!(!Failed.admits(Done));
        assert!(!Challenged.admits(Challenged));
        assert!(!Polling.admits(Challenged));
    }

    #[test]
    fn test_challenge_transition_marks_report() {
        let mut state = SessionState::new("https://example.com/");
        state.transition(FetchStage::Challenged);
        state.transition(FetchStage::Polling);
        state.transition(FetchStage::Done);
        let report = state.into_report();
        assert_eq!(report.stage, FetchStage::Done);
        assert!(report.challenge_detected);
    }
}
