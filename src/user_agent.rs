//! Shared User-Agent string for source API and page download traffic.

/// Default User-Agent sent with every request (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mangas/{version} (series-archiver)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_crate_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("mangas/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
    }
}
