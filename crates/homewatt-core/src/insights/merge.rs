//! Merge policy for Advisor actions
//!
//! Pure functions: dedupe by normalized text (first occurrence wins), stable
//! sort by priority, then truncate. Sorting before truncating keeps the most
//! important actions when the Advisor returns more than fit.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::ai::RecommendedAction;

fn whitespace() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Normalized form used to detect duplicate actions
///
/// Lowercase, whitespace collapsed, trailing punctuation trimmed.
pub fn normalize_action_text(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    let collapsed = whitespace().replace_all(&lower, " ");
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// Dedupe, order and bound the Advisor's actions
pub fn merge_actions(actions: &[RecommendedAction], max_actions: usize) -> Vec<RecommendedAction> {
    let mut seen = HashSet::new();
    let mut merged: Vec<RecommendedAction> = actions
        .iter()
        .filter(|a| seen.insert(normalize_action_text(&a.action_text)))
        .cloned()
        .collect();

    // sort_by_key is stable: equal priorities keep Advisor order
    merged.sort_by_key(|a| a.priority);
    merged.truncate(max_actions);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(text: &str, priority: u8) -> RecommendedAction {
        RecommendedAction::new(text, priority)
    }

    fn texts(actions: &[RecommendedAction]) -> Vec<&str> {
        actions.iter().map(|a| a.action_text.as_str()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_action_text("  Shift   laundry to OFF-PEAK!! "),
            "shift laundry to off-peak"
        );
        assert_eq!(normalize_action_text("Lower thermostat."), "lower thermostat");
    }

    #[test]
    fn test_dedupe_first_occurrence_wins() {
        let merged = merge_actions(
            &[
                action("Lower thermostat by 2°", 2),
                action("lower  thermostat by 2°.", 1),
                action("Shift laundry", 3),
            ],
            5,
        );
        assert_eq!(texts(&merged), vec!["Lower thermostat by 2°", "Shift laundry"]);
        assert_eq!(merged[0].priority, 2);
    }

    #[test]
    fn test_stable_sort_by_priority() {
        let merged = merge_actions(
            &[
                action("c", 3),
                action("a1", 1),
                action("b", 2),
                action("a2", 1),
            ],
            5,
        );
        assert_eq!(texts(&merged), vec!["a1", "a2", "b", "c"]);
    }

    #[test]
    fn test_truncate_keeps_highest_priority() {
        let actions: Vec<_> = (0..8)
            .map(|i| action(&format!("action {}", i), 5 - (i % 5) as u8))
            .collect();
        let merged = merge_actions(&actions, 3);
        let priorities: Vec<u8> = merged.iter().map(|a| a.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3]);
    }

    #[test]
    fn test_merge_is_deterministic_and_bounded() {
        let actions = vec![
            action("x", 2),
            action("X", 2),
            action("y", 1),
            action("z", 4),
        ];
        let a = merge_actions(&actions, 2);
        let b = merge_actions(&actions, 2);
        assert_eq!(a, b);
        assert_eq!(texts(&a), vec!["y", "x"]);

        assert!(merge_actions(&actions, 0).is_empty());
        assert!(merge_actions(&[], 5).is_empty());
    }
}
