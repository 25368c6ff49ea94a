use serde_json::{json, Value};

use riskscope_core::aggregator::{RiskCategory, FALLBACK_CATEGORY, ROUTING_RULES};
use riskscope_core::config::RiskConfig;

/// The routing table and the thresholds of the active config.
pub fn run_rules(config: &RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let categories: Vec<Value> = RiskCategory::ALL
        .iter()
        .map(|&category| {
            let t = config.thresholds(category);
            let lower: Vec<&str> = config
                .categories
                .iter()
                .filter(|c| c.category == category)
                .flat_map(|c| c.lower_is_better.iter().map(String::as_str))
                .collect();
            json!({
                "category": category,
                "label": category.label(),
                "alert_threshold": t.alert,
                "caution_threshold": t.caution,
                "lower_is_better": lower.join(" "),
            })
        })
        .collect();

    Ok(json!({
        "result": {
            "config_version": config.version,
            "fallback_category": FALLBACK_CATEGORY,
            "routing_rules": ROUTING_RULES,
            "categories": categories,
        }
    }))
}
