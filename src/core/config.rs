use std::path::Path;

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (recipe-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Fetch sub-config (mirrors the `fetch` key in recipe-scout.json).
///
/// Every field is optional; absent fields fall back to an env var, then to the
/// built-in default. All durations are milliseconds.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScoutFetchConfig {
    /// Upper bound on navigation + network-quiet wait. Default: 30 000.
    pub nav_timeout_ms: Option<u64>,
    /// Upper bound on the post-challenge navigation wait. Default: 15 000.
    pub challenge_timeout_ms: Option<u64>,
    /// Fixed settle delay after the challenge wait. Default: 2 000.
    pub settle_ms: Option<u64>,
    /// Total budget for the content-readiness poll. Default: 8 000.
    pub readiness_budget_ms: Option<u64>,
    /// Interval between readiness probes. Default: 200.
    pub poll_interval_ms: Option<u64>,
}

/// Top-level config loaded from `recipe-scout.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScoutConfig {
    #[serde(default)]
    pub fetch: ScoutFetchConfig,
}

/// Load `recipe-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `RECIPE_SCOUT_CONFIG` env var path
/// 2. `./recipe-scout.json`  (process cwd)
/// 3. `../recipe-scout.json` (one level up, when running from a subdir)
///
/// Missing file → `ScoutConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_scout_config() -> ScoutConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("recipe-scout.json"),
            std::path::PathBuf::from("../recipe-scout.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ScoutConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("recipe-scout.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "recipe-scout.json parse error at {}: {}; using defaults",
                        path.display(),
                        e
                    );
                    return ScoutConfig::default();
                }
            },
            Err(_) => continue, // file not found at this path, try next
        }
    }

    ScoutConfig::default()
}

// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "RECIPE_SCOUT_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_NAV_TIMEOUT_MS: &str = "RECIPE_SCOUT_NAV_TIMEOUT_MS";
pub const ENV_CHALLENGE_TIMEOUT_MS: &str = "RECIPE_SCOUT_CHALLENGE_TIMEOUT_MS";
pub const ENV_SETTLE_MS: &str = "RECIPE_SCOUT_SETTLE_MS";
pub const ENV_READINESS_BUDGET_MS: &str = "RECIPE_SCOUT_READINESS_BUDGET_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "RECIPE_SCOUT_POLL_INTERVAL_MS";

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `browser::find_chrome_executable`).
/// This function only returns a value when `CHROME_EXECUTABLE` is set to an
/// existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

fn env_ms(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Resolved timing budgets for one fetch invocation.
///
/// Worst case a single invocation can take roughly
/// `nav_timeout + challenge_timeout + settle + readiness_budget` (~55s with
/// defaults) before returning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchBudgets {
    pub nav_timeout_ms: u64,
    pub challenge_timeout_ms: u64,
    pub settle_ms: u64,
    pub readiness_budget_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for FetchBudgets {
    fn default() -> Self {
        Self {
            nav_timeout_ms: 30_000,
            challenge_timeout_ms: 15_000,
            settle_ms: 2_000,
            readiness_budget_ms: 8_000,
            poll_interval_ms: 200,
        }
    }
}

impl FetchBudgets {
    /// Resolve budgets: JSON field → `RECIPE_SCOUT_*` env var → default.
    pub fn resolve(cfg: &ScoutFetchConfig) -> Self {
        let d = Self::default();
        Self {
            nav_timeout_ms: cfg
                .nav_timeout_ms
                .or_else(|| env_ms(ENV_NAV_TIMEOUT_MS))
                .unwrap_or(d.nav_timeout_ms),
            challenge_timeout_ms: cfg
                .challenge_timeout_ms
                .or_else(|| env_ms(ENV_CHALLENGE_TIMEOUT_MS))
                .unwrap_or(d.challenge_timeout_ms),
            settle_ms: cfg
                .settle_ms
                .or_else(|| env_ms(ENV_SETTLE_MS))
                .unwrap_or(d.settle_ms),
            readiness_budget_ms: cfg
                .readiness_budget_ms
                .or_else(|| env_ms(ENV_READINESS_BUDGET_MS))
                .unwrap_or(d.readiness_budget_ms),
            poll_interval_ms: cfg
                .poll_interval_ms
                .or_else(|| env_ms(ENV_POLL_INTERVAL_MS))
                .unwrap_or(d.poll_interval_ms)
                .max(1),
        }
    }

    /// Resolve from the config file in the standard locations.
    pub fn from_config_file() -> Self {
        Self::resolve(&load_scout_config().fetch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let b = FetchBudgets::default();
        assert_eq!(b.nav_timeout_ms, 30_000);
        assert_eq!(b.challenge_timeout_ms, 15_000);
        assert_eq!(b.settle_ms, 2_000);
        assert_eq!(b.readiness_budget_ms, 8_000);
        assert_eq!(b.poll_interval_ms, 200);
    }

    #[test]
    fn test_json_fields_win() {
        let cfg: ScoutFetchConfig =
            serde_json::from_str(r#"{"nav_timeout_ms": 5000, "poll_interval_ms": 50}"#).unwrap();
        let b = FetchBudgets::resolve(&cfg);
        assert_eq!(b.nav_timeout_ms, 5_000);
        assert_eq!(b.poll_interval_ms, 50);
        assert_eq!(b.readiness_budget_ms, 8_000);
    }

    #[test]
    fn test_missing_fetch_key_defaults() {
        let cfg: ScoutConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(FetchBudgets::resolve(&cfg.fetch), FetchBudgets::default());
    }
}
