//! User-Agent strings for outgoing requests.

/// Browser User-Agent used when fetching pages, which many sites only
/// render fully for browsers.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for media requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    format!("{name}/{version} (media-detection-tool)")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_carries_name_and_version() {
        let ua = default_user_agent();
        let version = ua
            .strip_prefix(concat!(env!("CARGO_PKG_NAME"), "/"))
            .and_then(|s| s.split(' ').next())
            .unwrap();
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
        assert!(ua.contains("media-detection-tool"), "unexpected UA: {ua}");
    }

    #[test]
    fn test_browser_user_agent_looks_like_a_browser() {
        assert!(BROWSER_USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(!BROWSER_USER_AGENT.contains(env!("CARGO_PKG_NAME")));
    }
}
