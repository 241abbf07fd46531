//! Challenge detection and the content-readiness poll.
//!
//! Both probes are self-contained expressions evaluated in the document
//! context, returning a plain bool. The poll loop runs host-side: one probe
//! per tick, first satisfied heuristic wins, bounded by the readiness budget.

use super::{FetchStage, SessionState, StealthFetcher};
use crate::browser::driver::PageDriver;
use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// True when the document shows an anti-bot interstitial: a known challenge
/// title, known challenge body text, or the challenge-specific DOM node.
pub(super) const CHALLENGE_PROBE: &str = r#"
(() => {
    return document.title.includes('Just a moment')
        || (document.body !== null
            && document.body.textContent !== null
            && document.body.textContent.includes('Checking your browser'))
        || document.querySelector('#challenge-running') !== null;
})()
"#;

/// True when the page's primary content has materialized. Heuristics in
/// priority order:
/// 1. a JSON-LD block mentioning "recipe" (case-insensitive),
/// 2. an ingredient container with more than 20 chars of trimmed text,
/// 3. an instruction/step/direction container with more than 20 chars,
/// 4. a schema.org Recipe microdata element with more than 100 chars.
pub(super) const READINESS_PROBE: &str = r#"
(() => {
    const jsonLd = document.querySelector('script[type="application/ld+json"]');
    if (jsonLd !== null
        && jsonLd.textContent !== null
        && jsonLd.textContent.toLowerCase().includes('recipe')) {
        return true;
    }

    const ingredientContainers = document.querySelectorAll(
        '.ingredients, .ingredient, [class*="ingredient"], [id*="ingredient"]'
    );
    for (const el of ingredientContainers) {
        if (el.textContent && el.textContent.trim().length > 20) {
            return true;
        }
    }

    const instructionContainers = document.querySelectorAll(
        '.steps, .instructions, .directions, [class*="instruction"], [class*="direction"], [class*="step"], [id*="instruction"], [id*="step"]'
    );
    for (const el of instructionContainers) {
        if (el.textContent && el.textContent.trim().length > 20) {
            return true;
        }
    }

    const schemaRecipe = document.querySelector('[itemtype*="Recipe"]');
    if (schemaRecipe !== null
        && schemaRecipe.textContent !== null
        && schemaRecipe.textContent.trim().length > 100) {
        return true;
    }

    return false;
})()
"#;

impl StealthFetcher {
    /// Detect the interstitial and, if present, wait it out: up to the
    /// challenge budget for the follow-up navigation (timeout and error both
    /// swallowed; the flow proceeds on whatever DOM state exists), then an
    /// unconditional settle delay for trailing script execution.
    pub(super) async fn recover_from_challenge(
        &self,
        page: &dyn PageDriver,
        state: &mut SessionState,
    ) -> Result<()> {
        if !page.eval_bool(CHALLENGE_PROBE).await? {
            return Ok(());
        }

        state.transition(FetchStage::Challenged);
        debug!(url = %state.url, "challenge interstitial detected, waiting for it to resolve");

        let wait = Duration::from_millis(self.budgets.challenge_timeout_ms);
        match tokio::time::timeout(wait, page.wait_for_navigation()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(url = %state.url, "challenge navigation wait failed (swallowed): {}", e)
            }
            Err(_) => debug!(url = %state.url, "challenge navigation wait timed out"),
        }

        tokio::time::sleep(Duration::from_millis(self.budgets.settle_ms)).await;
        Ok(())
    }

    /// Poll the document until a readiness heuristic fires or the budget is
    /// spent. Probes immediately, so content present at navigation time is
    /// detected on the first tick without consuming an interval.
    ///
    /// Returns `true` when content was found. "Not ready" is a soft condition,
    /// not an error.
    pub(super) async fn poll_until_ready(
        &self,
        page: &dyn PageDriver,
        state: &mut SessionState,
    ) -> Result<bool> {
        state.transition(FetchStage::Polling);

        let budget = Duration::from_millis(self.budgets.readiness_budget_ms);
        let interval = Duration::from_millis(self.budgets.poll_interval_ms);
        let start = Instant::now();

        loop {
            if page.eval_bool(READINESS_PROBE).await? {
                return Ok(true);
            }
            if start.elapsed() + interval > budget {
                debug!(url = %state.url, "content containers remain empty after waiting");
                return Ok(false);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_probe_signals() {
        assert!(CHALLENGE_PROBE.contains("Just a moment"));
        assert!(CHALLENGE_PROBE.contains("Checking your browser"));
        assert!(CHALLENGE_PROBE.contains("#challenge-running"));
    }

    #[test]
    fn test_readiness_probe_priority_order() {
        let ld = READINESS_PROBE.find("application/ld+json").unwrap();
        let ingredient = READINESS_PROBE.find("ingredientContainers").unwrap();
        let instruction = READINESS_PROBE.find("instructionContainers").unwrap();
        let microdata = READINESS_PROBE.find("itemtype*=\"Recipe\"").unwrap();
        assert!(ld < ingredient && ingredient < instruction && instruction < microdata);
    }
}
