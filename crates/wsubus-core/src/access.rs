//! Access control for event forwarding.
//!
//! Every event matched by a subscription passes through an
//! [`AccessPolicy`] before it is written to the subscriber. The check is
//! asynchronous: a policy may consult an external session service and
//! answer much later, or never.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pattern::pattern_matches;

/// Decides whether a session may receive an event.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Whether `session` may receive events of type `event_type`.
    async fn check_event(&self, event_type: &str, session: &str) -> bool;
}

/// Allows everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessPolicy for AllowAll {
    async fn check_event(&self, _event_type: &str, _session: &str) -> bool {
        true
    }
}

/// Denies everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenyAll;

#[async_trait]
impl AccessPolicy for DenyAll {
    async fn check_event(&self, _event_type: &str, _session: &str) -> bool {
        false
    }
}

/// One allow rule: sessions matching `session` may receive events matching
/// `event`. Both fields are patterns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Session pattern.
    pub session: String,
    /// Event type pattern.
    pub event: String,
}

impl AccessRule {
    /// Create a rule.
    pub fn new(session: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            event: event.into(),
        }
    }
}

/// Allow-list of [`AccessRule`]s. Anything not matched is denied.
#[derive(Clone, Debug, Default)]
pub struct StaticAcl {
    rules: Vec<AccessRule>,
}

impl StaticAcl {
    /// Create from rules.
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// Synchronous evaluation.
    pub fn allows(&self, event_type: &str, session: &str) -> bool {
        self.rules
            .iter()
            .any(|r| pattern_matches(&r.session, session) && pattern_matches(&r.event, event_type))
    }
}

#[async_trait]
impl AccessPolicy for StaticAcl {
    async fn check_event(&self, event_type: &str, session: &str) -> bool {
        self.allows(event_type, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_and_deny_all() {
        assert!(AllowAll.check_event("x", "s").await);
        assert!(!DenyAll.check_event("x", "s").await);
    }

    #[tokio::test]
    async fn acl_matches_both_patterns() {
        let acl = StaticAcl::new(vec![
            AccessRule::new("*", "network.*"),
            AccessRule::new("deadbeef*", "system"),
        ]);
        assert!(acl.check_event("network.interface", "anyone").await);
        assert!(acl.check_event("system", "deadbeef0001").await);
        assert!(!acl.check_event("system", "cafe").await);
        assert!(!acl.check_event("hotplug", "deadbeef").await);
    }

    #[test]
    fn empty_acl_denies() {
        assert!(!StaticAcl::default().allows("a", "b"));
    }

    #[test]
    fn rule_deserializes() {
        let rule: AccessRule =
            serde_json::from_str(r#"{"session":"*","event":"ubus.*"}"#).unwrap();
        assert_eq!(rule, AccessRule::new("*", "ubus.*"));
    }
}
