//! Event-name patterns and the outbound exclusion set.
//!
//! Event names are dot-namespaced (`orders.created`, `system.clientConnected`).
//! A pattern is either the lone wildcard `*`, a prefix ending in `*`
//! (`auth.*`), or an exact name.

use std::fmt;

/// Matches event names for bus subscriptions and exclusion filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventPattern {
    /// Matches every event name (`*`).
    Any,
    /// Matches names starting with the stored prefix (`auth.*` stores `auth.`).
    Prefix(String),
    /// Matches exactly one name.
    Exact(String),
}

impl EventPattern {
    /// Parses a pattern string. Surrounding whitespace is ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" {
            return Self::Any;
        }
        match raw.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(raw.to_string()),
        }
    }

    /// Returns `true` if `name` matches this pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Exact(exact) => name == exact,
        }
    }
}

impl From<&str> for EventPattern {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for EventPattern {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Exact(exact) => write!(f, "{exact}"),
        }
    }
}

/// Event names that are observable in-process but never forwarded to
/// WebSocket clients unless the operator configures otherwise.
pub const DEFAULT_EXCLUSIONS: [&str; 4] = [
    "auth.loginFailed",
    "auth.passwordChanged",
    "system.error",
    "system.clientMessage",
];

/// Immutable set of patterns withheld from outbound delivery.
///
/// Built once when the bridge is constructed. An event matching any
/// pattern is never broadcast, whatever its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSet {
    patterns: Vec<EventPattern>,
}

impl ExclusionSet {
    /// An exclusion set that withholds nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Returns the default set extended with `extra` patterns.
    #[must_use]
    pub fn with_defaults<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        DEFAULT_EXCLUSIONS
            .iter()
            .map(|p| EventPattern::parse(p))
            .chain(extra.into_iter().map(|p| EventPattern::parse(p.as_ref())))
            .collect()
    }

    /// Returns `true` if `name` matches any pattern in the set.
    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// Returns the patterns in insertion order.
    #[must_use]
    pub fn patterns(&self) -> &[EventPattern] {
        &self.patterns
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` if the set withholds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::with_defaults(std::iter::empty::<&str>())
    }
}

impl FromIterator<EventPattern> for ExclusionSet {
    fn from_iter<T: IntoIterator<Item = EventPattern>>(iter: T) -> Self {
        let mut patterns: Vec<EventPattern> = Vec::new();
        for pattern in iter {
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
        Self { patterns }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_all_forms() {
        assert_eq!(EventPattern::parse("*"), EventPattern::Any);
        assert_eq!(
            EventPattern::parse("auth.*"),
            EventPattern::Prefix("auth.".to_string())
        );
        assert_eq!(
            EventPattern::parse(" orders.created "),
            EventPattern::Exact("orders.created".to_string())
        );
    }

    #[test]
    fn prefix_does_not_match_sibling_namespace() {
        let pattern = EventPattern::parse("auth.*");
        assert!(pattern.matches("auth.loginFailed"));
        assert!(!pattern.matches("authz.granted"));
    }

    #[test]
    fn exact_requires_full_name() {
        let pattern = EventPattern::parse("orders.created");
        assert!(pattern.matches("orders.created"));
        assert!(!pattern.matches("orders.created.v2"));
    }

    #[test]
    fn display_round_trips_source_form() {
        for raw in ["*", "auth.*", "system.error"] {
            assert_eq!(EventPattern::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn default_set_hides_security_events() {
        let set = ExclusionSet::default();
        assert!(set.is_excluded("auth.loginFailed"));
        assert!(set.is_excluded("auth.passwordChanged"));
        assert!(set.is_excluded("system.error"));
        assert!(!set.is_excluded("orders.created"));
        assert!(!set.is_excluded("system.clientConnected"));
    }

    #[test]
    fn extra_patterns_extend_defaults_without_duplicates() {
        let set = ExclusionSet::with_defaults(["inventory.*", "auth.loginFailed"]);
        assert_eq!(set.len(), DEFAULT_EXCLUSIONS.len() + 1);
        assert!(set.is_excluded("inventory.adjusted"));
    }

    #[test]
    fn empty_set_excludes_nothing() {
        let set = ExclusionSet::empty();
        assert!(set.is_empty());
        assert!(!set.is_excluded("auth.loginFailed"));
    }
}
