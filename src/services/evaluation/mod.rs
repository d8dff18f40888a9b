pub mod classify;
pub mod rollup;
pub mod types;
pub mod windows;

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::error::{EvalError, EvalResult};
use crate::store::{SeriesScope, SeriesStore};

use classify::{evaluate_metric, window_mean};
use rollup::roll_up;
use types::{
    EvalOptions, EvalWindows, MetricEvaluation, MetricId, MetricScope, SiteEvaluation, Verdict,
    WindowAggregate,
};
use windows::resolve_windows;

/// Bounded retry for store fetches. Backoff doubles per attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    pub site: &'a str,
    /// Neighbor sites, resolved upstream (geospatial search is external).
    pub neighbors: &'a [String],
    pub input_date: NaiveDate,
    pub options: EvalOptions,
}

#[derive(Debug)]
enum FetchFailure {
    Cancelled,
    Unavailable(String),
}

/// Evaluates one site around one input date.
///
/// The store is fetched concurrently: all metrics in parallel, and the three
/// windows of each metric in parallel, since none of them depend on another.
/// A metric whose fetch still fails after retries degrades to Inconclusive
/// without disturbing its siblings; only a store that fails for every metric
/// (or cannot even report the site's max date) fails the request.
pub async fn evaluate<S: SeriesStore>(
    store: &S,
    request: &EvaluationRequest<'_>,
    metrics: &[MetricId],
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> EvalResult<SiteEvaluation> {
    request
        .options
        .validate()
        .map_err(EvalError::InvalidConfiguration)?;
    if metrics.is_empty() {
        return Err(EvalError::InvalidConfiguration(
            "metric set must not be empty".to_string(),
        ));
    }
    if cancel.is_cancelled() {
        return Err(EvalError::Cancelled);
    }

    let max_date = with_retry(retry, cancel, || store.max_date(request.site))
        .await
        .map_err(|failure| match failure {
            FetchFailure::Cancelled => EvalError::Cancelled,
            FetchFailure::Unavailable(message) => EvalError::DataSourceUnavailable(message),
        })?
        .ok_or_else(|| {
            EvalError::DataSourceUnavailable(format!("no data for site {}", request.site))
        })?;

    let windows = resolve_windows(request.input_date, max_date, &request.options)?;

    let evaluations = futures::future::join_all(metrics.iter().map(|metric| {
        evaluate_one_metric(store, request, *metric, &windows, retry, cancel)
    }))
    .await;

    if evaluations
        .iter()
        .all(|evaluation| evaluation.fetch_error.is_some())
    {
        return Err(EvalError::DataSourceUnavailable(format!(
            "all {} metric fetches failed for site {}",
            evaluations.len(),
            request.site
        )));
    }

    let overall = roll_up(evaluations.iter().map(|evaluation| evaluation.verdict));
    tracing::info!(
        site = request.site,
        input_date = %request.input_date,
        overall = ?overall,
        metrics = evaluations.len(),
        "site evaluation complete"
    );

    Ok(SiteEvaluation {
        site: request.site.to_string(),
        input_date: request.input_date,
        max_date,
        options: request.options,
        windows,
        overall,
        metrics: evaluations,
    })
}

async fn evaluate_one_metric<S: SeriesStore>(
    store: &S,
    request: &EvaluationRequest<'_>,
    metric: MetricId,
    windows: &EvalWindows,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> MetricEvaluation {
    let scope = match metric.scope {
        MetricScope::Site => SeriesScope::Site(request.site),
        MetricScope::Neighbors => SeriesScope::Neighbors(request.neighbors),
    };

    let fetch = |window| {
        with_retry(retry, cancel, move || store.series(scope, metric.kind, window))
    };
    let (before, after, last) = futures::join!(
        fetch(windows.before),
        fetch(windows.after),
        fetch(windows.last)
    );

    match (before, after, last) {
        (Ok(before), Ok(after), Ok(last)) => evaluate_metric(
            metric,
            window_mean(&before, windows.before),
            window_mean(&after, windows.after),
            window_mean(&last, windows.last),
            request.options.threshold,
        ),
        (before, after, last) => {
            let message = [before.err(), after.err(), last.err()]
                .into_iter()
                .flatten()
                .next()
                .map(|failure| match failure {
                    FetchFailure::Cancelled => "cancelled".to_string(),
                    FetchFailure::Unavailable(message) => message,
                })
                .unwrap_or_else(|| "window fetch failed".to_string());
            tracing::warn!(
                site = request.site,
                metric = %metric.label(),
                error = %message,
                "metric fetch failed; reporting inconclusive"
            );
            inconclusive_metric(metric, windows, message)
        }
    }
}

fn inconclusive_metric(
    metric: MetricId,
    windows: &EvalWindows,
    fetch_error: String,
) -> MetricEvaluation {
    let empty = |window| WindowAggregate {
        window,
        mean: None,
        sample_count: 0,
    };
    let mut evaluation = evaluate_metric(
        metric,
        empty(windows.before),
        empty(windows.after),
        empty(windows.last),
        types::DEFAULT_THRESHOLD,
    );
    debug_assert_eq!(evaluation.verdict, Verdict::Inconclusive);
    evaluation.fetch_error = Some(fetch_error);
    evaluation
}

async fn with_retry<T, F, Fut>(
    retry: RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, FetchFailure>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = retry.attempts.max(1);
    let mut backoff = retry.initial_backoff;

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(FetchFailure::Cancelled);
        }
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
            outcome = operation() => outcome,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt == attempts => {
                return Err(FetchFailure::Unavailable(format!("{err:#}")));
            }
            Err(err) => {
                tracing::warn!(attempt, error = %format!("{err:#}"), "store fetch failed; retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchFailure::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.saturating_mul(2);
            }
        }
    }
    unreachable!("retry loop always returns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SeriesPoint;
    use chrono::Duration as ChronoDuration;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use types::{reference_metric_set, DateWindow, MetricKind};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    /// Fixed input date shared by every test request.
    const INPUT_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2024, 9, 21) {
        Some(date) => date,
        None => panic!("valid date"),
    };

    /// Synthetic store: one flat value per window per metric, optional
    /// failure injection.
    #[derive(Default)]
    struct MemoryStore {
        // (metric, is_neighbor) -> (before, after, last) window means.
        levels: HashMap<(MetricKind, bool), (f64, f64, f64)>,
        max_date: Option<NaiveDate>,
        failing_metrics: HashSet<MetricKind>,
        fail_everything: bool,
        transient_failures: AtomicU32,
        calls: AtomicU32,
    }

    impl MemoryStore {
        fn flat(max_date: NaiveDate, levels: &[(MetricKind, f64, f64, f64)]) -> Self {
            let mut store = MemoryStore {
                max_date: Some(max_date),
                ..MemoryStore::default()
            };
            for (kind, before, after, last) in levels {
                store.levels.insert((*kind, false), (*before, *after, *last));
                store.levels.insert((*kind, true), (*before, *after, *last));
            }
            store
        }
    }

    impl SeriesStore for MemoryStore {
        async fn series(
            &self,
            scope: SeriesScope<'_>,
            metric: MetricKind,
            window: DateWindow,
        ) -> anyhow::Result<Vec<SeriesPoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_everything || self.failing_metrics.contains(&metric) {
                anyhow::bail!("injected store failure for {}", metric.as_str());
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                    remaining.checked_sub(1)
                })
                .is_ok()
            {
                anyhow::bail!("transient store failure");
            }

            let is_neighbor = matches!(scope, SeriesScope::Neighbors(_));
            let Some((before, after, last)) = self.levels.get(&(metric, is_neighbor)) else {
                return Ok(Vec::new());
            };
            // Windows are disjoint: before ends at the input date, last ends
            // at max_date, anything between is the after window.
            let max_date = self.max_date.expect("max date");
            let value = if window.to <= INPUT_DATE {
                *before
            } else if window.to >= max_date {
                *last
            } else {
                *after
            };
            let mut points = Vec::new();
            let mut day = window.from;
            while day <= window.to {
                points.push(SeriesPoint { date: day, value });
                day += ChronoDuration::days(1);
            }
            Ok(points)
        }

        async fn max_date(&self, _site: &str) -> anyhow::Result<Option<NaiveDate>> {
            if self.fail_everything {
                anyhow::bail!("injected max_date failure");
            }
            Ok(self.max_date)
        }
    }

    fn request(neighbors: &[String]) -> EvaluationRequest<'_> {
        EvaluationRequest {
            site: "MEXMET0396",
            neighbors,
            input_date: INPUT_DATE,
            options: EvalOptions::default(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn metric_by_kind<'a>(
        evaluation: &'a SiteEvaluation,
        kind: MetricKind,
        scope: MetricScope,
    ) -> &'a MetricEvaluation {
        evaluation
            .metrics
            .iter()
            .find(|metric| metric.metric.kind == kind && metric.metric.scope == scope)
            .expect("metric present")
    }

    #[tokio::test]
    async fn healthy_site_passes_across_all_metrics() {
        let store = MemoryStore::flat(
            date(2024, 11, 30),
            &[
                (MetricKind::UmtsCqi, 10.0, 10.1, 10.2),
                (MetricKind::LteCqi, 8.0, 8.0, 8.0),
                (MetricKind::NrCqi, 9.0, 9.2, 9.1),
                (MetricKind::DataTraffic, 100.0, 104.0, 101.0),
                (MetricKind::VoiceTraffic, 50.0, 51.0, 50.0),
            ],
        );
        let neighbors = vec!["MEXMET0400".to_string()];
        let result = evaluate(
            &store,
            &request(&neighbors),
            &reference_metric_set(),
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .expect("evaluation");

        assert_eq!(result.overall, Verdict::Pass);
        assert_eq!(result.metrics.len(), 10);
        let umts = metric_by_kind(&result, MetricKind::UmtsCqi, MetricScope::Site);
        assert_eq!(umts.before.sample_count, 8);
        assert_eq!(umts.before.mean, Some(10.0));
    }

    #[tokio::test]
    async fn degraded_metric_fails_the_site() {
        let store = MemoryStore::flat(
            date(2024, 11, 30),
            &[
                (MetricKind::UmtsCqi, 10.0, 7.0, 7.0),
                (MetricKind::LteCqi, 8.0, 8.0, 8.0),
            ],
        );
        let metrics = [
            MetricId::new(MetricKind::UmtsCqi, MetricScope::Site),
            MetricId::new(MetricKind::LteCqi, MetricScope::Site),
        ];
        let result = evaluate(
            &store,
            &request(&[]),
            &metrics,
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .expect("evaluation");

        assert_eq!(result.overall, Verdict::Fail);
        let umts = metric_by_kind(&result, MetricKind::UmtsCqi, MetricScope::Site);
        assert_eq!(umts.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn fetch_failure_isolates_to_one_metric() {
        let mut store = MemoryStore::flat(
            date(2024, 11, 30),
            &[(MetricKind::LteCqi, 8.0, 8.0, 8.0)],
        );
        store.failing_metrics.insert(MetricKind::UmtsCqi);

        let metrics = [
            MetricId::new(MetricKind::UmtsCqi, MetricScope::Site),
            MetricId::new(MetricKind::LteCqi, MetricScope::Site),
        ];
        let result = evaluate(
            &store,
            &request(&[]),
            &metrics,
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .expect("evaluation survives partial failure");

        let umts = metric_by_kind(&result, MetricKind::UmtsCqi, MetricScope::Site);
        assert_eq!(umts.verdict, Verdict::Inconclusive);
        assert!(umts.fetch_error.is_some());
        let lte = metric_by_kind(&result, MetricKind::LteCqi, MetricScope::Site);
        assert_eq!(lte.verdict, Verdict::Pass);
        assert_eq!(result.overall, Verdict::Pass);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = MemoryStore {
            transient_failures: AtomicU32::new(2),
            ..MemoryStore::flat(date(2024, 11, 30), &[(MetricKind::LteCqi, 8.0, 8.0, 8.0)])
        };
        let metrics = [MetricId::new(MetricKind::LteCqi, MetricScope::Site)];
        let result = evaluate(
            &store,
            &request(&[]),
            &metrics,
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .expect("evaluation");
        assert_eq!(result.overall, Verdict::Pass);
    }

    #[tokio::test]
    async fn all_metrics_failing_is_a_data_source_error() {
        let store = MemoryStore {
            fail_everything: false,
            max_date: Some(date(2024, 11, 30)),
            failing_metrics: [MetricKind::UmtsCqi, MetricKind::LteCqi].into_iter().collect(),
            ..MemoryStore::default()
        };
        let metrics = [
            MetricId::new(MetricKind::UmtsCqi, MetricScope::Site),
            MetricId::new(MetricKind::LteCqi, MetricScope::Site),
        ];
        let err = evaluate(
            &store,
            &request(&[]),
            &metrics,
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EvalError::DataSourceUnavailable(_)));
    }

    #[tokio::test]
    async fn site_without_any_data_is_unavailable() {
        let store = MemoryStore::default();
        let err = evaluate(
            &store,
            &request(&[]),
            &reference_metric_set(),
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EvalError::DataSourceUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_metric_set_is_invalid_configuration() {
        let store = MemoryStore::flat(date(2024, 11, 30), &[]);
        let err = evaluate(
            &store,
            &request(&[]),
            &[],
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EvalError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let store = MemoryStore::flat(date(2024, 11, 30), &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = evaluate(
            &store,
            &request(&[]),
            &reference_metric_set(),
            fast_retry(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EvalError::Cancelled));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_history_yields_inconclusive_not_error() {
        // max_date barely past the input date: the after window has no data.
        let store = MemoryStore::flat(
            date(2024, 9, 25),
            &[(MetricKind::LteCqi, 8.0, 8.0, 8.0)],
        );
        let metrics = [MetricId::new(MetricKind::LteCqi, MetricScope::Site)];
        let result = evaluate(
            &store,
            &request(&[]),
            &metrics,
            fast_retry(),
            &CancellationToken::new(),
        )
        .await
        .expect("evaluation");
        // Windows resolve; whether data lands in them is a per-metric
        // question, never a request failure.
        assert!(result.windows.last.to < result.windows.after.to);
    }
}
