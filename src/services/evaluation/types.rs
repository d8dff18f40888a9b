use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Floor for the delta denominator so a zero baseline never divides by zero.
pub const DELTA_EPS: f64 = 1e-9;

pub const DEFAULT_THRESHOLD: f64 = 0.05;
pub const DEFAULT_PERIOD_DAYS: i64 = 7;
pub const DEFAULT_GUARD_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    UmtsCqi,
    LteCqi,
    NrCqi,
    DataTraffic,
    VoiceTraffic,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::UmtsCqi => "umts_cqi",
            MetricKind::LteCqi => "lte_cqi",
            MetricKind::NrCqi => "nr_cqi",
            MetricKind::DataTraffic => "data_traffic",
            MetricKind::VoiceTraffic => "voice_traffic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricScope {
    Site,
    Neighbors,
}

impl MetricScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricScope::Site => "site",
            MetricScope::Neighbors => "neighbors",
        }
    }
}

/// One tracked indicator: what is measured and for whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricId {
    pub kind: MetricKind,
    pub scope: MetricScope,
}

impl MetricId {
    pub fn new(kind: MetricKind, scope: MetricScope) -> Self {
        Self { kind, scope }
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.scope.as_str(), self.kind.as_str())
    }
}

/// The reference metric configuration: every CQI technology plus data and
/// voice traffic, at site scope and at neighbor-aggregate scope. The
/// evaluation pipeline itself is generic over any non-empty metric set.
pub fn reference_metric_set() -> Vec<MetricId> {
    let kinds = [
        MetricKind::UmtsCqi,
        MetricKind::LteCqi,
        MetricKind::NrCqi,
        MetricKind::DataTraffic,
        MetricKind::VoiceTraffic,
    ];
    let mut metrics = Vec::with_capacity(kinds.len() * 2);
    for scope in [MetricScope::Site, MetricScope::Neighbors] {
        for kind in kinds {
            metrics.push(MetricId::new(kind, scope));
        }
    }
    metrics
}

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

/// The three measurement windows derived from one input date.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EvalWindows {
    pub before: DateWindow,
    pub after: DateWindow,
    pub last: DateWindow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalOptions {
    pub threshold: f64,
    pub period_days: i64,
    pub guard_days: i64,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            period_days: DEFAULT_PERIOD_DAYS,
            guard_days: DEFAULT_GUARD_DAYS,
        }
    }
}

impl EvalOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.period_days <= 0 {
            return Err(format!("period_days must be > 0, got {}", self.period_days));
        }
        if self.guard_days < 0 {
            return Err(format!("guard_days must be >= 0, got {}", self.guard_days));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold >= 1.0 {
            return Err(format!(
                "threshold must be a fraction in (0, 1), got {}",
                self.threshold
            ));
        }
        Ok(())
    }
}

/// Mean over one window. `mean` is `None` exactly when `sample_count == 0`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WindowAggregate {
    pub window: DateWindow,
    pub mean: Option<f64>,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    Increase,
    Stable,
    Decrease,
}

/// The nine `(before→after, after→last)` combinations, labeled by the fixed
/// lexicographic ordering Increase < Stable < Decrease on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternType {
    /// Increase, Increase
    T1,
    /// Increase, Stable
    T2,
    /// Increase, Decrease
    T3,
    /// Stable, Increase
    T4,
    /// Stable, Stable
    T5,
    /// Stable, Decrease
    T6,
    /// Decrease, Increase
    T7,
    /// Decrease, Stable
    T8,
    /// Decrease, Decrease
    T9,
}

impl PatternType {
    pub fn from_classes(before_after: ChangeClass, after_last: ChangeClass) -> Self {
        use ChangeClass::{Decrease, Increase, Stable};
        match (before_after, after_last) {
            (Increase, Increase) => PatternType::T1,
            (Increase, Stable) => PatternType::T2,
            (Increase, Decrease) => PatternType::T3,
            (Stable, Increase) => PatternType::T4,
            (Stable, Stable) => PatternType::T5,
            (Stable, Decrease) => PatternType::T6,
            (Decrease, Increase) => PatternType::T7,
            (Decrease, Stable) => PatternType::T8,
            (Decrease, Decrease) => PatternType::T9,
        }
    }

    pub fn classes(&self) -> (ChangeClass, ChangeClass) {
        use ChangeClass::{Decrease, Increase, Stable};
        match self {
            PatternType::T1 => (Increase, Increase),
            PatternType::T2 => (Increase, Stable),
            PatternType::T3 => (Increase, Decrease),
            PatternType::T4 => (Stable, Increase),
            PatternType::T5 => (Stable, Stable),
            PatternType::T6 => (Stable, Decrease),
            PatternType::T7 => (Decrease, Increase),
            PatternType::T8 => (Decrease, Stable),
            PatternType::T9 => (Decrease, Decrease),
        }
    }
}

/// Per-metric and overall outcome. `Inconclusive` covers missing window data
/// and isolated fetch failures; it never escalates to a request error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
    Restored,
    Inconclusive,
}

/// One delta between two window means, with its classification. Both fields
/// are `None` when either mean is undefined.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeltaEvaluation {
    pub ratio: Option<f64>,
    pub class: Option<ChangeClass>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricEvaluation {
    pub metric: MetricId,
    pub name: String,
    pub before: WindowAggregate,
    pub after: WindowAggregate,
    pub last: WindowAggregate,
    pub delta_after_before: DeltaEvaluation,
    pub delta_last_after: DeltaEvaluation,
    pub pattern: Option<PatternType>,
    pub verdict: Verdict,
    /// Set when the series fetch failed after retries; the metric is then
    /// reported Inconclusive without touching its siblings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

/// The full evaluation payload handed to the REST and report layers.
#[derive(Debug, Clone, Serialize)]
pub struct SiteEvaluation {
    pub site: String,
    pub input_date: NaiveDate,
    pub max_date: NaiveDate,
    pub options: EvalOptions,
    pub windows: EvalWindows,
    pub overall: Verdict,
    pub metrics: Vec<MetricEvaluation>,
}
