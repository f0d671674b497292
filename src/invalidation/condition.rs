//! Condition grammar evaluator: a single comparison `L OP R` with
//! `${event.key}`/`${data.key}` substitution.

use crate::events::Event;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Longest operators first so `>=` isn't matched as `>` followed by `=`.
    static ref COMPARISON: Regex =
        Regex::new(r"^(.*?)\s*(==|!=|>=|<=|=|>|<)\s*(.*)$").expect("comparison regex is valid");
    static ref SUBSTITUTION: Regex =
        Regex::new(r"\$\{(event|data)\.([A-Za-z0-9_]+)\}").expect("substitution regex is valid");
}

/// Substitutes every `${event.x}`/`${data.x}` placeholder in `text` with the
/// matching event field or data entry (both draw from the same `Event`;
/// `event.` and `data.` are synonymous accessors into event metadata/data).
#[must_use]
pub fn substitute(text: &str, event: &Event) -> String {
    SUBSTITUTION
        .replace_all(text, |caps: &regex::Captures| {
            let key = &caps[2];
            resolve_field(event, key).unwrap_or_default()
        })
        .into_owned()
}

fn resolve_field(event: &Event, key: &str) -> Option<String> {
    match key {
        "type" => Some(event.event_type.clone()),
        "source" => Some(event.source.clone()),
        "timestamp" => Some(event.timestamp.to_rfc3339()),
        _ => event.data.get(key).map(value_to_string),
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluates a condition string against an event. Malformed conditions
/// (no recognized operator) evaluate to `false`.
#[must_use]
pub fn evaluate(condition: &str, event: &Event) -> bool {
    let Some(caps) = COMPARISON.captures(condition) else {
        return false;
    };
    let left = substitute(caps[1].trim(), event);
    let op = &caps[2];
    let right = substitute(caps[3].trim(), event);

    match op {
        "=" | "==" => left == right,
        "!=" => left != right,
        ">" | "<" | ">=" | "<=" => compare_numeric_or_lexicographic(&left, op, &right),
        _ => false,
    }
}

fn compare_numeric_or_lexicographic(left: &str, op: &str, right: &str) -> bool {
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        return match op {
            ">" => l > r,
            "<" => l < r,
            ">=" => l >= r,
            "<=" => l <= r,
            _ => false,
        };
    }
    match op {
        ">" => left > right,
        "<" => left < right,
        ">=" => left >= right,
        "<=" => left <= right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_symbol(symbol: &str) -> Event {
        Event::new("trade.created", "test").with_data("symbol", symbol)
    }

    #[test]
    fn equality_after_substitution() {
        let event = event_with_symbol("AAPL");
        assert!(evaluate("symbol = ${event.symbol}", &event) || evaluate("${data.symbol} = symbol", &event));
    }

    #[test]
    fn condition_gate_fires_only_for_matching_symbol() {
        let aapl = event_with_symbol("AAPL");
        let googl = event_with_symbol("GOOGL");
        let condition = "${data.symbol} = AAPL";
        assert!(evaluate(condition, &aapl));
        assert!(!evaluate(condition, &googl));
    }

    #[test]
    fn numeric_comparison_falls_back_to_lexicographic() {
        let event = Event::new("t", "s").with_data("grade", "b");
        assert!(evaluate("${data.grade} > a", &event));
    }

    #[test]
    fn malformed_condition_is_false() {
        let event = event_with_symbol("AAPL");
        assert!(!evaluate("not a condition", &event));
    }
}
