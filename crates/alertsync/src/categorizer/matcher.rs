use std::sync::LazyLock;

use crate::config::{default_categories, CategoryRule, FALLBACK_CATEGORY};

/// Ordered first-match classifier over a closed label vocabulary.
pub struct Categorizer {
    /// Rules in match order, needles pre-lowercased.
    rules: Vec<CategoryRule>,
}

impl Categorizer {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CategoryRule {
                contains: rule.contains.iter().map(|n| n.to_lowercase()).collect(),
                label: rule.label,
            })
            .collect();
        Self { rules }
    }

    /// Returns the label of the first rule with a needle contained in the
    /// lower-cased input, or `"Other"`.
    pub fn categorize(&self, raw_alert_type: &str) -> String {
        let text = raw_alert_type.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.contains.iter().any(|needle| text.contains(needle.as_str())))
            .map(|rule| rule.label.clone())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
    }

    /// Labels in match order, without the fallback.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.label.as_str())
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(default_categories())
    }
}

static DEFAULT_CATEGORIZER: LazyLock<Categorizer> = LazyLock::new(Categorizer::default);

/// Classifies with the built-in vocabulary.
pub fn categorize(raw_alert_type: &str) -> String {
    DEFAULT_CATEGORIZER.categorize(raw_alert_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASES: &[(&str, &str)] = &[
        ("Heavy Impact detected", "Heavy Impact"),
        ("LIGHT SENSOR triggered", "Light Sensor"),
        ("Device is Out of Country", "Out Of Country"),
        ("No communication for 24h", "No Communication"),
        ("Over-turn detected", "Over-turn"),
        ("Overturn detected", "Over-turn"),
        ("Tamper alert", "Tamper Alert"),
        ("Low battery (5%)", "Low Battery"),
        ("Motion started", "Motion"),
        ("New positions available", "New Positions"),
        ("Entered High Risk area", "High Risk Area"),
        ("Left custom GeoFence", "Custom GeoFence"),
        ("Rotation stopped", "Rotation Stop"),
        ("Temperature above threshold", "Temperature"),
        ("Pressure drop", "Pressure"),
        ("Humidity high", "Humidity"),
        ("", "Other"),
    ];

    #[test]
    fn test_default_vocabulary() {
        for (input, expected) in CASES {
            assert_eq!(categorize(input), *expected, "input: {:?}", input);
        }
    }

    #[test]
    fn test_free_function_matches_default_categorizer() {
        let categorizer = Categorizer::default();
        for (input, _) in CASES {
            assert_eq!(categorize(input), categorizer.categorize(input));
        }
    }

    #[test]
    fn test_unknown_is_other() {
        assert_eq!(categorize("some unheard-of alert"), "Other");
    }

    #[test]
    fn test_first_rule_wins() {
        // Contains both "heavy impact" and the later "motion" needle.
        assert_eq!(categorize("Motion after heavy impact"), "Heavy Impact");
        assert_eq!(categorize("Light sensor: overturn suspected"), "Light Sensor");
    }

    #[test]
    fn test_custom_rules_keep_given_order() {
        let categorizer = Categorizer::new(vec![
            CategoryRule::new("Shock", &["SHOCK"]),
            CategoryRule::new("Any", &["alert"]),
        ]);
        assert_eq!(categorizer.categorize("shock alert"), "Shock");
        assert_eq!(categorizer.categorize("plain alert"), "Any");
        assert_eq!(categorizer.categorize("nothing"), "Other");
        assert_eq!(categorizer.labels().collect::<Vec<_>>(), vec!["Shock", "Any"]);
    }
}
