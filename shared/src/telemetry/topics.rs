//! # Broker Topic Grammar
//!
//! Topic layout: `statix/nodes/<nodeId>/<kind>` where kind is `metrics` or
//! `system`. The server subscribes to the wildcard filter and routes by the
//! last segment; anything that does not match the grammar is ignored.

/// Wildcard filter the server's ingest loop subscribes to.
pub const TOPIC_FILTER: &str = "statix/nodes/+/+";

const PREFIX: &str = "statix/nodes/";

/// The two message kinds carried over the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Periodic host metrics, not retained
    Metrics,
    /// System inventory, retained
    System,
}

/// Builds the metrics topic for a node.
pub fn metrics_topic(node_id: &str) -> String {
    format!("{PREFIX}{node_id}/metrics")
}

/// Builds the system-inventory topic for a node.
pub fn system_topic(node_id: &str) -> String {
    format!("{PREFIX}{node_id}/system")
}

/// Parses an inbound topic into `(node_id, kind)`.
///
/// Returns `None` for anything outside the grammar: foreign prefixes, extra
/// segments, unknown kinds, empty node ids. Callers drop those silently.
pub fn parse(topic: &str) -> Option<(&str, TopicKind)> {
    let rest = topic.strip_prefix(PREFIX)?;
    let (node_id, kind) = rest.split_once('/')?;

    if node_id.is_empty() {
        return None;
    }

    let kind = match kind {
        "metrics" => TopicKind::Metrics,
        "system" => TopicKind::System,
        _ => return None,
    };

    Some((node_id, kind))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let id = "018f3c7e-2d4a-7b1c-9e5f-6a8b9c0d1e2f";

        assert_eq!(parse(&metrics_topic(id)), Some((id, TopicKind::Metrics)));
        assert_eq!(parse(&system_topic(id)), Some((id, TopicKind::System)));
    }

    #[test]
    fn test_rejects_foreign_topics() {
        assert_eq!(parse("other/nodes/abc/metrics"), None);
        assert_eq!(parse("statix/users/abc/metrics"), None);
        assert_eq!(parse("statix/nodes/abc/unknown"), None);
        assert_eq!(parse("statix/nodes/abc"), None);
        assert_eq!(parse("statix/nodes//metrics"), None);
    }

    #[test]
    fn test_rejects_extra_segments() {
        assert_eq!(parse("statix/nodes/abc/metrics/extra"), None);
        assert_eq!(parse("statix/nodes/a/b/metrics"), None);
    }
}
