//! Name based filtering of check results

use crate::proxy::models::CheckResult;
use regex::Regex;
use tracing::{info, warn};

/// Keep only results whose name matches at least one pattern.
///
/// No patterns, or no pattern that compiles, keeps everything.
pub fn filter_results(results: Vec<CheckResult>, patterns: &[String]) -> Vec<CheckResult> {
    if patterns.is_empty() {
        return results;
    }

    let compiled: Vec<Regex> = patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Skipping invalid filter pattern {}: {}", pattern, e);
                None
            }
        })
        .collect();

    if compiled.is_empty() {
        warn!("No valid filter pattern, skipping filter");
        return results;
    }

    let before = results.len();
    let filtered: Vec<CheckResult> = results
        .into_iter()
        .filter(|result| {
            result
                .name()
                .is_some_and(|name| compiled.iter().any(|re| re.is_match(name)))
        })
        .collect();

    info!("Filtered proxies: {} (before: {})", filtered.len(), before);
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyDefinition;

    fn result(name: &str) -> CheckResult {
        CheckResult::new(ProxyDefinition::new().with("name", name))
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_no_patterns_keeps_all() {
        let results = vec![result("a"), result("b")];
        assert_eq!(filter_results(results, &[]).len(), 2);
    }

    #[test]
    fn test_any_pattern_matches() {
        let results = vec![result("🇺🇸US_1"), result("🇯🇵JP_1"), result("🇩🇪DE_1")];
        let kept = filter_results(results, &patterns(&["US", "^🇯🇵"]));
        let names: Vec<_> = kept.iter().filter_map(|r| r.name()).collect();
        assert_eq!(names, vec!["🇺🇸US_1", "🇯🇵JP_1"]);
    }

    #[test]
    fn test_invalid_patterns_are_skipped() {
        let results = vec![result("HK_1"), result("SG_1")];
        let kept = filter_results(results, &patterns(&["(unclosed", "HK"]));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_all_invalid_patterns_keep_all() {
        let results = vec![result("HK_1"), result("SG_1")];
        assert_eq!(filter_results(results, &patterns(&["(", "["])).len(), 2);
    }

    #[test]
    fn test_unnamed_result_is_dropped() {
        let results = vec![CheckResult::new(ProxyDefinition::new()), result("US_1")];
        assert_eq!(filter_results(results, &patterns(&[".*"])).len(), 1);
    }
}
