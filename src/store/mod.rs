pub mod pg;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::services::evaluation::types::{DateWindow, MetricKind};

/// One daily sample of a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Whose series to fetch: the site itself, or the aggregate over a
/// caller-supplied neighbor set. Finding the neighbors (geospatial search) is
/// owned by the excluded collaborator; the store only aggregates across them.
#[derive(Debug, Clone, Copy)]
pub enum SeriesScope<'a> {
    Site(&'a str),
    Neighbors(&'a [String]),
}

/// Technologies with per-cell daily traffic tables. NR has no cell traffic
/// feed, so periods and change events only exist for these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellTech {
    Umts,
    Lte,
}

impl CellTech {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellTech::Umts => "umts",
            CellTech::Lte => "lte",
        }
    }
}

/// One day on which a cell carried user traffic (raw daily traffic > 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTrafficDay {
    pub cell: String,
    pub vendor: String,
    pub date: NaiveDate,
}

/// Static cell attributes from the master cell inventory.
#[derive(Debug, Clone)]
pub struct CellMeta {
    pub cell: String,
    pub site: String,
    pub tech: CellTech,
    pub band: String,
    pub vendor: String,
}

/// Read access to the daily KPI series. Injected so the evaluation core is
/// testable with synthetic series and carries no database dependency in its
/// test suite.
#[allow(async_fn_in_trait)]
pub trait SeriesStore {
    /// Series for one metric restricted to the window, ordered by date,
    /// unique by date. Gaps are expected.
    async fn series(
        &self,
        scope: SeriesScope<'_>,
        metric: MetricKind,
        window: DateWindow,
    ) -> Result<Vec<SeriesPoint>>;

    /// Latest date with any data for the site across tracked indicators.
    async fn max_date(&self, site: &str) -> Result<Option<NaiveDate>>;
}

/// Read access to per-cell traffic presence and the cell inventory.
#[allow(async_fn_in_trait)]
pub trait TrafficStore {
    /// Active traffic days for one technology, optionally restricted to a
    /// cell set. Presence is thresholded at > 0 in the query.
    async fn active_traffic_days(
        &self,
        tech: CellTech,
        cells: Option<&[String]>,
    ) -> Result<Vec<CellTrafficDay>>;

    /// Cell inventory rows, optionally restricted to one site.
    async fn cell_metadata(&self, site: Option<&str>) -> Result<Vec<CellMeta>>;
}
