pub mod periods;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::store::{CellMeta, CellTech};

use periods::TrafficPeriod;

/// Vendors with their own ingestion feeds. Anything else lands in the
/// catch-all bucket together with cells whose band lookup failed.
const KNOWN_VENDORS: [&str; 4] = ["huawei", "ericsson", "nokia", "samsung"];
/// Band value the ingestion pipeline writes when the frequency lookup misses.
const BAND_NOT_FOUND: &str = "not_found";
const CATCH_ALL_BUCKET: &str = "other";

/// Day-over-day change in a site's live cell inventory for one technology.
/// Invariant: `added - removed` equals the change in `total` versus the
/// previous emitted day (or versus zero on the site's first day).
#[derive(Debug, Clone, Serialize)]
pub struct CellChangeEvent {
    pub site: String,
    pub tech: CellTech,
    pub date: NaiveDate,
    pub added: i64,
    pub removed: i64,
    pub total: i64,
    /// Live cells per `band|vendor` bucket.
    pub buckets: BTreeMap<String, i64>,
    pub remark: String,
}

pub fn bucket_key(band: &str, vendor: &str) -> String {
    let vendor = vendor.trim().to_lowercase();
    let band = band.trim();
    if band.is_empty() || band == BAND_NOT_FOUND || !KNOWN_VENDORS.contains(&vendor.as_str()) {
        return CATCH_ALL_BUCKET.to_string();
    }
    format!("{band}|{vendor}")
}

/// Rebuilds the change-event series for one site and technology from its
/// traffic-active periods joined with the cell inventory.
///
/// Periods are matched to inventory rows by cell name; rows for other sites
/// are ignored and periods without inventory cannot be attributed to the site
/// at all. Overlapping periods for the same `(cell, vendor)` are malformed
/// upstream data: they are logged and resolved later-start-wins, never summed.
pub fn aggregate_change_events(
    site: &str,
    tech: CellTech,
    all_periods: &[TrafficPeriod],
    metadata: &[CellMeta],
) -> Vec<CellChangeEvent> {
    let inventory: HashMap<&str, &CellMeta> = metadata
        .iter()
        .filter(|meta| meta.site == site && meta.tech == tech)
        .map(|meta| (meta.cell.as_str(), meta))
        .collect();

    let mut site_periods: Vec<(&CellMeta, TrafficPeriod)> = all_periods
        .iter()
        .filter_map(|period| {
            inventory
                .get(period.cell.as_str())
                .map(|meta| (*meta, period.clone()))
        })
        .collect();
    if site_periods.is_empty() {
        return Vec::new();
    }

    sanitize_overlaps(&mut site_periods);

    let bounds = site_periods.iter().fold(None, |bounds, (_, period)| {
        Some(match bounds {
            None => (period.init_date, period.end_date),
            Some((first, last)) => (
                period.init_date.min(first),
                period.end_date.max(last),
            ),
        })
    });
    let Some((first_day, last_day)) = bounds else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let mut previous_live: BTreeSet<(String, String)> = BTreeSet::new();
    let mut day = first_day;
    let mut first_emitted = false;

    while day <= last_day {
        let mut live: BTreeSet<(String, String)> = BTreeSet::new();
        let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
        for (meta, period) in &site_periods {
            if period.contains(day) {
                live.insert((period.cell.clone(), period.vendor.clone()));
                *buckets
                    .entry(bucket_key(&meta.band, &period.vendor))
                    .or_insert(0) += 1;
            }
        }

        let added = live.difference(&previous_live).count() as i64;
        let removed = previous_live.difference(&live).count() as i64;

        if added != 0 || removed != 0 || !first_emitted {
            let remark = if !first_emitted {
                "first traffic activity".to_string()
            } else {
                format!("{added} added, {removed} removed")
            };
            events.push(CellChangeEvent {
                site: site.to_string(),
                tech,
                date: day,
                added,
                removed,
                total: live.len() as i64,
                buckets,
                remark,
            });
            first_emitted = true;
        }

        previous_live = live;
        day += Duration::days(1);
    }

    events
}

/// Truncates earlier periods so overlapping ones never double-count a cell.
fn sanitize_overlaps(site_periods: &mut Vec<(&CellMeta, TrafficPeriod)>) {
    site_periods.sort_by(|(_, a), (_, b)| {
        (a.cell.as_str(), a.vendor.as_str(), a.init_date)
            .cmp(&(b.cell.as_str(), b.vendor.as_str(), b.init_date))
    });

    let mut index = 0;
    while index + 1 < site_periods.len() {
        let (current, next) = {
            let (_, current) = &site_periods[index];
            let (_, next) = &site_periods[index + 1];
            (current.clone(), next.clone())
        };
        if current.cell == next.cell
            && current.vendor == next.vendor
            && next.init_date <= current.end_date
        {
            tracing::warn!(
                cell = %current.cell,
                vendor = %current.vendor,
                first_end = %current.end_date,
                second_init = %next.init_date,
                "overlapping traffic periods from upstream; later-starting period wins"
            );
            let new_end = next.init_date - Duration::days(1);
            if new_end < current.init_date {
                site_periods.remove(index);
                continue;
            }
            let (_, current) = &mut site_periods[index];
            current.end_date = new_end;
            current.length_days = (new_end - current.init_date).num_days() + 1;
        }
        index += 1;
    }
}

/// Days on which cells appeared or disappeared, offered to the UI as
/// candidate input dates for the evaluation.
pub fn recommended_dates(events: &[CellChangeEvent]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = events
        .iter()
        .filter(|event| event.added != 0 || event.removed != 0)
        .map(|event| event.date)
        .collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// CSV export in the shape the reporting layer expects, one row per event
/// with the bucket breakdown as a JSON column.
pub fn write_events_csv<W: Write>(events: &[CellChangeEvent], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record([
            "site", "tech", "date", "added", "removed", "total", "buckets", "remark",
        ])
        .context("failed to write change event CSV header")?;
    for event in events {
        let buckets =
            serde_json::to_string(&event.buckets).context("failed to encode bucket counts")?;
        let record = [
            event.site.clone(),
            event.tech.as_str().to_string(),
            event.date.to_string(),
            event.added.to_string(),
            event.removed.to_string(),
            event.total.to_string(),
            buckets,
            event.remark.clone(),
        ];
        csv_writer
            .write_record(&record)
            .context("failed to write change event CSV row")?;
    }
    csv_writer.flush().context("failed to flush change event CSV")?;
    Ok(())
}
