//! Object and event name patterns.
//!
//! A pattern is either an exact name or a prefix terminated by `*`.
//! `*` alone matches every name.

/// Whether `name` matches `pattern`.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything() {
        assert!(pattern_matches("*", "network.interface"));
        assert!(pattern_matches("*", ""));
    }

    #[test]
    fn exact_match() {
        assert!(pattern_matches("system", "system"));
        assert!(!pattern_matches("system", "system.info"));
    }

    #[test]
    fn prefix_match() {
        assert!(pattern_matches("network.*", "network.interface.lan"));
        assert!(pattern_matches("ubus.object.*", "ubus.object.add"));
        assert!(!pattern_matches("network.*", "netw"));
    }

    #[test]
    fn star_only_at_end_is_special() {
        assert!(!pattern_matches("a*b", "axxb"));
        assert!(pattern_matches("a*b", "a*b"));
    }
}
