//! Invalidation engine: rules driving cache purges from bus events.

pub mod condition;

use crate::cache::CacheManager;
use crate::events::{Event, EventBus, EventListener};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// `{eventType, patterns[], condition?, delay?, async}`, as embedded in a
/// query's cache specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationRule {
    pub event_type: String,
    pub patterns: Vec<String>,
    pub condition: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub r#async: bool,
}

struct InvalidationListener {
    rules: Vec<InvalidationRule>,
    cache_manager: Arc<CacheManager>,
}

impl EventListener for InvalidationListener {
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        for rule in &self.rules {
            if let Some(condition) = &rule.condition {
                if !condition::evaluate(condition, event) {
                    continue;
                }
            }
            dispatch_rule(rule, event, Arc::clone(&self.cache_manager));
        }
        Ok(())
    }
}

fn dispatch_rule(rule: &InvalidationRule, event: &Event, cache_manager: Arc<CacheManager>) {
    let patterns: Vec<String> = rule
        .patterns
        .iter()
        .map(|pattern| resolve_pattern(pattern, event))
        .collect();

    let delay = (rule.delay_ms > 0).then(|| Duration::from_millis(rule.delay_ms));

    if rule.r#async || delay.is_some() {
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            purge_patterns(&cache_manager, &patterns);
        });
    } else {
        purge_patterns(&cache_manager, &patterns);
    }
}

fn purge_patterns(cache_manager: &CacheManager, patterns: &[String]) {
    for pattern in patterns {
        let removed = cache_manager.remove_pattern_everywhere(pattern);
        tracing::debug!(pattern, removed, "invalidation rule purged cache entries");
    }
}

/// Substitutes `{name}` placeholders in a pattern from the event's data map,
/// leaving unresolved placeholders intact (with a warning), per §4.6.
fn resolve_pattern(pattern: &str, event: &Event) -> String {
    let mut result = String::with_capacity(pattern.len());
    let mut chars = pattern.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch == '{' {
            if let Some(end) = pattern[start + 1..].find('}') {
                let name = &pattern[start + 1..start + 1 + end];
                match event.data_str(name).map(str::to_string).or_else(|| {
                    event.data.get(name).map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                }) {
                    Some(value) => result.push_str(&value),
                    None => {
                        tracing::warn!(placeholder = name, "unresolved invalidation pattern placeholder");
                        result.push('{');
                        result.push_str(name);
                        result.push('}');
                    }
                }
                for _ in 0..=end {
                    chars.next();
                }
                continue;
            }
        }
        result.push(ch);
    }
    result
}

/// Subscribes a set of rules against the event bus. Only the first rule for
/// a given `eventType` actually registers a bus listener; subsequent rules
/// for the same type are folded into that listener's rule list.
pub struct InvalidationEngine {
    event_bus: Arc<EventBus>,
    cache_manager: Arc<CacheManager>,
    subscribed_types: DashSet<String>,
}

impl InvalidationEngine {
    #[must_use]
    pub fn new(event_bus: Arc<EventBus>, cache_manager: Arc<CacheManager>) -> Self {
        Self {
            event_bus,
            cache_manager,
            subscribed_types: DashSet::new(),
        }
    }

    /// Registers every rule across every cacheable query. Rules sharing an
    /// `eventType` are grouped under a single bus subscription.
    pub fn register_rules(&self, rules: Vec<InvalidationRule>) {
        let mut grouped: std::collections::HashMap<String, Vec<InvalidationRule>> =
            std::collections::HashMap::new();
        for rule in rules {
            grouped.entry(rule.event_type.clone()).or_default().push(rule);
        }
        for (event_type, rules) in grouped {
            if !self.subscribed_types.insert(event_type.clone()) {
                continue;
            }
            let listener = Arc::new(InvalidationListener {
                rules,
                cache_manager: Arc::clone(&self.cache_manager),
            });
            self.event_bus.subscribe(event_type, listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_placeholders_from_event_data() {
        let event = Event::new("trade.created", "test").with_data("symbol", "AAPL");
        assert_eq!(
            resolve_pattern("q:stock-trades-by-symbol:{symbol}:*", &event),
            "q:stock-trades-by-symbol:AAPL:*"
        );
    }

    #[test]
    fn leaves_unresolved_placeholder_intact() {
        let event = Event::new("trade.created", "test");
        assert_eq!(resolve_pattern("user:{id}:*", &event), "user:{id}:*");
    }

    #[test]
    fn pattern_invalidation_removes_only_matching_keys() {
        let cache_manager = Arc::new(CacheManager::new(100));
        cache_manager.put(
            "query_results",
            "user:42:profile".to_string(),
            serde_json::json!(1),
            Duration::from_secs(60),
        );
        cache_manager.put(
            "query_results",
            "user:43:profile".to_string(),
            serde_json::json!(1),
            Duration::from_secs(60),
        );
        let event_bus = Arc::new(EventBus::new());
        let engine = InvalidationEngine::new(Arc::clone(&event_bus), Arc::clone(&cache_manager));
        engine.register_rules(vec![InvalidationRule {
            event_type: "user.updated".to_string(),
            patterns: vec!["user:{id}:*".to_string()],
            condition: None,
            delay_ms: 0,
            r#async: false,
        }]);
        event_bus.publish_sync(Event::new("user.updated", "test").with_data("id", 42));
        assert!(cache_manager.get::<i64>("query_results", "user:42:profile").is_none());
        assert!(cache_manager.get::<i64>("query_results", "user:43:profile").is_some());
    }

    #[tokio::test]
    async fn async_rule_purges_on_a_detached_task_rather_than_the_caller_stack() {
        let cache_manager = Arc::new(CacheManager::new(100));
        cache_manager.put(
            "query_results",
            "user:42:profile".to_string(),
            serde_json::json!(1),
            Duration::from_secs(60),
        );
        let event_bus = Arc::new(EventBus::new());
        let engine = InvalidationEngine::new(Arc::clone(&event_bus), Arc::clone(&cache_manager));
        engine.register_rules(vec![InvalidationRule {
            event_type: "user.updated".to_string(),
            patterns: vec!["user:{id}:*".to_string()],
            condition: None,
            delay_ms: 0,
            r#async: true,
        }]);
        event_bus.publish_sync(Event::new("user.updated", "test").with_data("id", 42));
        // The rule is async, so the purge has not necessarily happened yet on
        // return from publish_sync; it completes once the spawned task runs.
        assert!(cache_manager.get::<i64>("query_results", "user:42:profile").is_some());
        tokio::task::yield_now().await;
        assert!(cache_manager.get::<i64>("query_results", "user:42:profile").is_none());
    }
}
