use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::store::CellTrafficDay;

pub const DEFAULT_MIN_RUN_DAYS: i64 = 3;

/// Maximal run of consecutive traffic-active days for one `(cell, vendor)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficPeriod {
    pub cell: String,
    pub vendor: String,
    pub init_date: NaiveDate,
    pub end_date: NaiveDate,
    pub length_days: i64,
}

impl TrafficPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.init_date && date <= self.end_date
    }
}

/// Run-length detection over one cell's active days.
///
/// Gap/island grouping: after sorting, each active day gets a run id of
/// `date - rank_among_active_days`; equal run ids are exactly the contiguous
/// stretches. Runs shorter than `min_run` are dropped, so an isolated active
/// day never becomes a period. The input is materialized and sorted here
/// rather than folded as a stream, which keeps unsorted upstream data from
/// producing phantom runs.
pub fn detect_periods(
    cell: &str,
    vendor: &str,
    active_days: &[NaiveDate],
    min_run: i64,
) -> Vec<TrafficPeriod> {
    let mut days: Vec<NaiveDate> = active_days.to_vec();
    days.sort_unstable();
    days.dedup();

    let mut periods = Vec::new();
    let mut run_start: Option<NaiveDate> = None;
    let mut run_end: Option<NaiveDate> = None;

    for day in days {
        match run_end {
            Some(end) if day == end + Duration::days(1) => {
                run_end = Some(day);
            }
            Some(end) => {
                push_if_long_enough(&mut periods, cell, vendor, run_start, end, min_run);
                run_start = Some(day);
                run_end = Some(day);
            }
            None => {
                run_start = Some(day);
                run_end = Some(day);
            }
        }
    }
    if let (Some(_), Some(end)) = (run_start, run_end) {
        push_if_long_enough(&mut periods, cell, vendor, run_start, end, min_run);
    }

    periods
}

fn push_if_long_enough(
    periods: &mut Vec<TrafficPeriod>,
    cell: &str,
    vendor: &str,
    run_start: Option<NaiveDate>,
    run_end: NaiveDate,
    min_run: i64,
) {
    let Some(init_date) = run_start else {
        return;
    };
    let length_days = (run_end - init_date).num_days() + 1;
    if length_days >= min_run {
        periods.push(TrafficPeriod {
            cell: cell.to_string(),
            vendor: vendor.to_string(),
            init_date,
            end_date: run_end,
            length_days,
        });
    }
}

/// Full rebuild over every `(cell, vendor)` partition. Incremental upserts
/// belong to the ingestion pipeline, not here.
pub fn detect_all_periods(rows: &[CellTrafficDay], min_run: i64) -> Vec<TrafficPeriod> {
    let mut partitions: BTreeMap<(&str, &str), Vec<NaiveDate>> = BTreeMap::new();
    for row in rows {
        partitions
            .entry((row.cell.as_str(), row.vendor.as_str()))
            .or_default()
            .push(row.date);
    }

    let mut periods = Vec::new();
    for ((cell, vendor), days) in partitions {
        periods.extend(detect_periods(cell, vendor, &days, min_run));
    }
    periods
}
