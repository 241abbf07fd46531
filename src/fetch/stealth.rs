use super::StealthFetcher;

impl StealthFetcher {
    /// Fingerprint-evasion overrides installed before any navigation.
    ///
    /// Runs in every future document loaded in the page, ahead of page
    /// scripts. Self-contained: no host-side state crosses the automation
    /// boundary.
    pub(super) fn fingerprint_override_script() -> &'static str {
        r#"
// Mask the automation flag headless drivers expose
Object.defineProperty(navigator, 'webdriver', { get: () => false });

// Real browsers almost never report zero plugins
Object.defineProperty(navigator, 'plugins', {
    get: () => [1, 2, 3, 4, 5],
});

// Fixed, plausible language preferences
Object.defineProperty(navigator, 'languages', {
    get: () => ['en-US', 'en', 'nl'],
});

// Notifications permission reads as denied; everything else passes through
if (window.navigator.permissions && window.navigator.permissions.query) {
    const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);

    window.navigator.permissions.query = (parameters) =>
        parameters.name === 'notifications'
            ? Promise.resolve({ state: 'denied' })
            : originalQuery(parameters);
}
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_script_covers_all_probes() {
        let script = StealthFetcher::fingerprint_override_script();
        assert!(script.contains("webdriver"));
        assert!(script.contains("plugins"));
        assert!(script.contains("'en-US', 'en', 'nl'"));
        assert!(script.contains("notifications"));
        assert!(script.contains("denied"));
    }
}
