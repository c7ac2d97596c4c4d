// src/alerts/command.rs
//! Text form of an alert rule, as typed by a subscriber:
//! `/alert set category=politics keywords=bitcoin,crypto tags=ai`

use anyhow::{bail, Result};

use super::{AlertRule, SubscriberId};

pub const USAGE: &str = "Use: /alert set category=politics keywords=bitcoin,crypto tags=ai";

/// Parse an `/alert set ...` command into a fresh, enabled rule for `subscriber`.
/// Unknown keys are ignored; repeated keys accumulate.
pub fn parse_alert_command(subscriber: impl Into<SubscriberId>, text: &str) -> Result<AlertRule> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() < 3 || parts[0] != "/alert" || parts[1] != "set" {
        bail!("invalid alert format. {USAGE}");
    }

    let mut rule = AlertRule::new(subscriber);
    for part in &parts[2..] {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "category" | "categories" => rule = rule.with_categories(value.split(',')),
            "keyword" | "keywords" => rule = rule.with_keywords(value.split(',')),
            "tag" | "tags" => rule = rule.with_tags(value.split(',')),
            other => tracing::debug!(target: "alerts", key = other, "ignoring unknown alert key"),
        }
    }

    if rule.is_empty() {
        bail!("alert needs at least one category, keyword or tag. {USAGE}");
    }
    Ok(rule)
}

/// Human-readable listing of a rule.
pub fn describe_rule(rule: &AlertRule) -> String {
    fn join(set: &std::collections::BTreeSet<String>) -> String {
        if set.is_empty() {
            "-".to_string()
        } else {
            set.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    }
    format!(
        "Categories: {}\nKeywords: {}\nTags: {}\nStatus: {}",
        join(&rule.categories),
        join(&rule.keywords),
        join(&rule.tags),
        if rule.enabled { "Enabled" } else { "Disabled" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_clauses() {
        let r = parse_alert_command("42", "/alert set category=politics keywords=bitcoin,crypto tags=ai,")
            .unwrap();
        assert_eq!(r.subscriber_id, "42");
        assert!(r.enabled);
        assert!(r.categories.contains("politics"));
        assert_eq!(r.keywords.len(), 2);
        assert_eq!(r.tags.len(), 1);
    }

    #[test]
    fn rejects_short_or_empty_commands() {
        assert!(parse_alert_command("1", "/alert set").is_err());
        assert!(parse_alert_command("1", "/alert list category=x").is_err());
        assert!(parse_alert_command("1", "/alert set foo=bar").is_err());
    }

    #[test]
    fn describe_lists_fields_and_status() {
        let r = parse_alert_command("1", "/alert set keywords=eth").unwrap().disabled();
        let s = describe_rule(&r);
        assert!(s.contains("Keywords: eth"));
        assert!(s.contains("Categories: -"));
        assert!(s.ends_with("Status: Disabled"));
    }
}
