//! Human-readable run summary and scoreboard.

use crate::probe::ValidationReport;
use crate::store::SubscriptionState;

/// End-of-run summary: selection and validation totals plus the best and
/// worst subscriptions by score.
pub fn run_summary(
    selected: usize,
    parsed: usize,
    report: &ValidationReport,
    states: &[SubscriptionState],
) -> String {
    let mut lines = Vec::new();
    lines.push(format!("subscriptions selected: {selected}"));
    lines.push(format!("nodes parsed: {parsed}"));
    lines.push(format!(
        "nodes valid: {}/{} ({:.1}%)",
        report.valid_nodes,
        report.total_nodes,
        report.success_rate() * 100.0
    ));
    lines.push(format!("validation took {}ms", report.duration_ms));

    let mut by_score: Vec<&SubscriptionState> = states.iter().collect();
    by_score.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));

    if !by_score.is_empty() {
        lines.push("top subscriptions:".into());
        for s in by_score.iter().take(5) {
            lines.push(format!("  {:>3}  {:?}  {}", s.score, s.tier, s.name));
        }
        if by_score.len() > 5 {
            lines.push("bottom subscriptions:".into());
            let tail_start = by_score.len().saturating_sub(5).max(5);
            for s in &by_score[tail_start..] {
                lines.push(format!("  {:>3}  {:?}  {}", s.score, s.tier, s.name));
            }
        }
    }
    lines.join("\n")
}

/// Full scoreboard for the `report` subcommand.
pub fn scoreboard(states: &[SubscriptionState]) -> String {
    let mut by_score: Vec<&SubscriptionState> = states.iter().collect();
    by_score.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));

    let mut lines = Vec::new();
    lines.push(format!("{} subscriptions tracked", by_score.len()));
    lines.push(format!(
        "{:<30} {:>5} {:>10} {:>6} {:>8} {:>5}",
        "name", "score", "tier", "runs", "ok-runs", "prot"
    ));
    for s in by_score {
        lines.push(format!(
            "{:<30} {:>5} {:>10} {:>6} {:>8} {:>5}",
            truncate(&s.name, 30),
            s.score,
            format!("{:?}", s.tier).to_lowercase(),
            s.use_count,
            s.success_count,
            s.protection_counter
        ));
    }
    lines.join("\n")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).chain(std::iter::once('…')).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::tier_of;

    fn sub(name: &str, score: u8) -> SubscriptionState {
        SubscriptionState {
            url: format!("https://{name}/sub"),
            name: name.into(),
            created_at: 0,
            use_count: 4,
            success_count: 3,
            score,
            tier: tier_of(score),
            protection_counter: 0,
            last_selected_week: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn summary_lists_top_and_bottom() {
        let states: Vec<_> = (0..12).map(|i| sub(&format!("s{i:02}"), (i * 8) as u8)).collect();
        let report = ValidationReport {
            total_nodes: 100,
            valid_nodes: 40,
            ..Default::default()
        };
        let text = run_summary(12, 100, &report, &states);
        assert!(text.contains("nodes valid: 40/100 (40.0%)"));
        assert!(text.contains("top subscriptions:"));
        assert!(text.contains("bottom subscriptions:"));
        // highest scorer appears in the top block
        assert!(text.contains("s11"));
    }

    #[test]
    fn scoreboard_is_sorted_by_score() {
        let states = vec![sub("low", 10), sub("high", 95)];
        let text = scoreboard(&states);
        let high = text.find("high").unwrap();
        let low = text.find("low").unwrap();
        assert!(high < low);
    }
}
