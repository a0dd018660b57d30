//! Win evaluation
//!
//! A submission wins the moment the targeted counter meets or exceeds the
//! contest target. A counter the platform did not report can never satisfy
//! the condition, whatever the target is.

use crate::models::{ClipMetrics, WinCondition};

pub fn win_triggered(metrics: &ClipMetrics, condition: &WinCondition) -> bool {
    match metrics.get(condition.metric) {
        Some(value) => value >= condition.target,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WinMetric;

    fn views(count: u64) -> ClipMetrics {
        ClipMetrics {
            views: Some(count),
            ..Default::default()
        }
    }

    fn condition(metric: WinMetric, target: u64) -> WinCondition {
        WinCondition { metric, target }
    }

    #[test]
    fn test_target_met_inclusively() {
        let cond = condition(WinMetric::ViewCount, 1000);
        assert!(win_triggered(&views(1001), &cond));
        assert!(win_triggered(&views(1000), &cond));
        assert!(!win_triggered(&views(999), &cond));
    }

    #[test]
    fn test_missing_counter_never_wins() {
        // Huge view count is irrelevant when the contest pays on shares
        let metrics = ClipMetrics {
            views: Some(10_000_000),
            shares: None,
            ..Default::default()
        };
        let cond = condition(WinMetric::ShareCount, 1);
        assert!(!win_triggered(&metrics, &cond));

        // Even a zero target needs a reported counter
        let zero = condition(WinMetric::ShareCount, 0);
        assert!(!win_triggered(&metrics, &zero));
    }

    #[test]
    fn test_zero_target_with_reported_counter() {
        let metrics = ClipMetrics {
            likes: Some(0),
            ..Default::default()
        };
        assert!(win_triggered(&metrics, &condition(WinMetric::LikeCount, 0)));
    }

    #[test]
    fn test_each_metric_reads_its_own_counter() {
        let metrics = ClipMetrics {
            views: Some(100),
            likes: Some(10),
            comments: Some(5),
            shares: Some(1),
        };
        assert!(win_triggered(&metrics, &condition(WinMetric::ViewCount, 100)));
        assert!(win_triggered(&metrics, &condition(WinMetric::LikeCount, 10)));
        assert!(!win_triggered(&metrics, &condition(WinMetric::CommentCount, 6)));
        assert!(win_triggered(&metrics, &condition(WinMetric::ShareCount, 1)));
    }
}
