use crate::store::SeriesPoint;

use super::types::{
    ChangeClass, DateWindow, DeltaEvaluation, MetricEvaluation, MetricId, PatternType, Verdict,
    WindowAggregate, DELTA_EPS,
};

/// Verdict per pattern type, kept as one explicit table rather than inlined
/// conditionals so the policy can be swapped without touching the pipeline.
///
/// Note T3 (Increase, Decrease) and T6 (Stable, Decrease) map to Pass: the
/// evaluation asks whether the site degraded right after the input date, and
/// in both cases it did not. A slide late in the history is a separate signal
/// the verdict deliberately ignores; see DESIGN.md.
const VERDICT_TABLE: [(PatternType, Verdict); 9] = [
    (PatternType::T1, Verdict::Pass),
    (PatternType::T2, Verdict::Pass),
    (PatternType::T3, Verdict::Pass),
    (PatternType::T4, Verdict::Pass),
    (PatternType::T5, Verdict::Pass),
    (PatternType::T6, Verdict::Pass),
    (PatternType::T7, Verdict::Restored),
    (PatternType::T8, Verdict::Fail),
    (PatternType::T9, Verdict::Fail),
];

pub fn verdict_for_pattern(pattern: PatternType) -> Verdict {
    VERDICT_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == pattern)
        .map(|(_, verdict)| *verdict)
        .unwrap_or(Verdict::Inconclusive)
}

/// Raw mean of whatever finite samples fall inside the window. No
/// interpolation, no outlier rejection.
pub fn window_mean(points: &[SeriesPoint], window: DateWindow) -> WindowAggregate {
    let mut sum = 0.0;
    let mut count = 0usize;
    for point in points {
        if window.contains(point.date) && point.value.is_finite() {
            sum += point.value;
            count += 1;
        }
    }
    WindowAggregate {
        window,
        mean: if count > 0 { Some(sum / count as f64) } else { None },
        sample_count: count,
    }
}

/// Relative change from one window mean to the next, with the denominator
/// floored at `DELTA_EPS` so a zero baseline stays defined.
pub fn delta_ratio(from_mean: Option<f64>, to_mean: Option<f64>) -> Option<f64> {
    let from = from_mean?;
    let to = to_mean?;
    Some((to - from) / from.abs().max(DELTA_EPS))
}

/// Threshold boundaries are inclusive on both sides: a ratio of exactly
/// `+threshold` is an Increase, exactly `-threshold` a Decrease.
pub fn classify_ratio(ratio: f64, threshold: f64) -> ChangeClass {
    if ratio >= threshold {
        ChangeClass::Increase
    } else if ratio <= -threshold {
        ChangeClass::Decrease
    } else {
        ChangeClass::Stable
    }
}

fn evaluate_delta(from_mean: Option<f64>, to_mean: Option<f64>, threshold: f64) -> DeltaEvaluation {
    let ratio = delta_ratio(from_mean, to_mean);
    DeltaEvaluation {
        ratio,
        class: ratio.map(|r| classify_ratio(r, threshold)),
    }
}

/// Classifies one metric from its three window aggregates.
pub fn evaluate_metric(
    metric: MetricId,
    before: WindowAggregate,
    after: WindowAggregate,
    last: WindowAggregate,
    threshold: f64,
) -> MetricEvaluation {
    let delta_after_before = evaluate_delta(before.mean, after.mean, threshold);
    let delta_last_after = evaluate_delta(after.mean, last.mean, threshold);

    let (pattern, verdict) = match (delta_after_before.class, delta_last_after.class) {
        (Some(before_after), Some(after_last)) => {
            let pattern = PatternType::from_classes(before_after, after_last);
            (Some(pattern), verdict_for_pattern(pattern))
        }
        _ => (None, Verdict::Inconclusive),
    };

    MetricEvaluation {
        metric,
        name: metric.label(),
        before,
        after,
        last,
        delta_after_before,
        delta_last_after,
        pattern,
        verdict,
        fetch_error: None,
    }
}
