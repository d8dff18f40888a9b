use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::services::evaluation::types::{DateWindow, MetricKind};

use super::{CellMeta, CellTech, CellTrafficDay, SeriesPoint, SeriesScope, SeriesStore, TrafficStore};

/// Read-only store over the ingestion schema. Writing the daily tables is
/// owned by the ingestion pipeline; this side only selects.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_series(
        &self,
        sql: &str,
        scope: SeriesScope<'_>,
        window: DateWindow,
    ) -> Result<Vec<(NaiveDate, Option<f64>)>> {
        let query = sqlx::query_as(sql);
        let query = match scope {
            SeriesScope::Site(site) => query.bind(site.to_string()),
            SeriesScope::Neighbors(sites) => query.bind(sites.to_vec()),
        };
        query
            .bind(window.from)
            .bind(window.to)
            .fetch_all(&self.db)
            .await
            .context("failed to fetch metric series")
    }
}

/// One predicate shape per scope: `$1` is a site name for the site scope and
/// a site array for the neighbor aggregate.
fn site_predicate(scope: SeriesScope<'_>) -> &'static str {
    match scope {
        SeriesScope::Site(_) => "site_att = $1",
        SeriesScope::Neighbors(_) => "site_att = ANY($1)",
    }
}

fn cqi_sql(table: &str, column: &str, predicate: &str) -> String {
    format!(
        "SELECT date, AVG({column})::float8 AS value \
         FROM {table} \
         WHERE {predicate} AND date >= $2 AND date <= $3 AND {column} IS NOT NULL \
         GROUP BY date \
         ORDER BY date"
    )
}

/// Data traffic per day: PS user traffic across the UMTS and LTE vendor
/// columns plus both NSA legs from the NR table, summed across the scope.
fn data_traffic_sql(predicate: &str) -> String {
    format!(
        "SELECT date, SUM(value)::float8 AS value FROM ( \
           SELECT date, \
                  COALESCE(h3g_traffic_d_user_ps_gb, 0) \
                + COALESCE(e3g_traffic_d_user_ps_gb, 0) \
                + COALESCE(n3g_traffic_d_user_ps_gb, 0) AS value \
           FROM umts_cqi_daily \
           WHERE {predicate} AND date >= $2 AND date <= $3 \
           UNION ALL \
           SELECT date, \
                  COALESCE(h4g_traffic_d_user_ps_gb, 0) \
                + COALESCE(s4g_traffic_d_user_ps_gb, 0) \
                + COALESCE(e4g_traffic_d_user_ps_gb, 0) \
                + COALESCE(n4g_traffic_d_user_ps_gb, 0) AS value \
           FROM lte_cqi_daily \
           WHERE {predicate} AND date >= $2 AND date <= $3 \
           UNION ALL \
           SELECT date, \
                  COALESCE(traffic_4gleg_gb, 0) + COALESCE(traffic_5gleg_gb, 0) AS value \
           FROM nr_cqi_daily \
           WHERE {predicate} AND date >= $2 AND date <= $3 \
         ) t \
         GROUP BY date \
         ORDER BY date"
    )
}

/// Voice traffic per day: CS user traffic from the UMTS table plus the VoLTE
/// vendor columns.
fn voice_traffic_sql(predicate: &str) -> String {
    format!(
        "SELECT date, SUM(value)::float8 AS value FROM ( \
           SELECT date, \
                  COALESCE(h3g_traffic_v_user_cs, 0) \
                + COALESCE(e3g_traffic_v_user_cs, 0) \
                + COALESCE(n3g_traffic_v_user_cs, 0) AS value \
           FROM umts_cqi_daily \
           WHERE {predicate} AND date >= $2 AND date <= $3 \
           UNION ALL \
           SELECT date, \
                  COALESCE(user_traffic_volte_h, 0) \
                + COALESCE(user_traffic_volte_e, 0) \
                + COALESCE(user_traffic_volte_n, 0) \
                + COALESCE(user_traffic_volte_s, 0) AS value \
           FROM volte_cqi_vendor_daily \
           WHERE {predicate} AND date >= $2 AND date <= $3 \
         ) t \
         GROUP BY date \
         ORDER BY date"
    )
}

impl SeriesStore for PgStore {
    async fn series(
        &self,
        scope: SeriesScope<'_>,
        metric: MetricKind,
        window: DateWindow,
    ) -> Result<Vec<SeriesPoint>> {
        let predicate = site_predicate(scope);
        let sql = match metric {
            MetricKind::UmtsCqi => cqi_sql("umts_cqi_daily", "umts_composite_quality", predicate),
            MetricKind::LteCqi => cqi_sql("lte_cqi_daily", "f4g_composite_quality", predicate),
            MetricKind::NrCqi => cqi_sql("nr_cqi_daily", "nr_composite_quality", predicate),
            MetricKind::DataTraffic => data_traffic_sql(predicate),
            MetricKind::VoiceTraffic => voice_traffic_sql(predicate),
        };

        let rows = self
            .fetch_series(&sql, scope, window)
            .await
            .with_context(|| format!("series fetch failed for {}", metric.as_str()))?;
        Ok(rows
            .into_iter()
            .filter_map(|(date, value)| value.map(|value| SeriesPoint { date, value }))
            .collect())
    }

    async fn max_date(&self, site: &str) -> Result<Option<NaiveDate>> {
        let max_date: Option<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT MAX(d) FROM (
              SELECT MAX(date) AS d FROM umts_cqi_daily WHERE site_att = $1
              UNION ALL
              SELECT MAX(date) FROM lte_cqi_daily WHERE site_att = $1
              UNION ALL
              SELECT MAX(date) FROM nr_cqi_daily WHERE site_att = $1
            ) t
            "#,
        )
        .bind(site)
        .fetch_one(&self.db)
        .await
        .with_context(|| format!("failed to resolve max date for site {site}"))?;
        Ok(max_date)
    }
}

impl TrafficStore for PgStore {
    async fn active_traffic_days(
        &self,
        tech: CellTech,
        cells: Option<&[String]>,
    ) -> Result<Vec<CellTrafficDay>> {
        let table = match tech {
            CellTech::Umts => "umts_cell_traffic_daily",
            CellTech::Lte => "lte_cell_traffic_daily",
        };
        let sql = format!(
            "SELECT cell, vendor, date \
             FROM {table} \
             WHERE traffic_d_user_ps_gb > 0 \
               AND ($1::text[] IS NULL OR cell = ANY($1)) \
             ORDER BY cell, vendor, date"
        );
        let rows: Vec<(String, String, NaiveDate)> = sqlx::query_as(&sql)
            .bind(cells.map(|cells| cells.to_vec()))
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("failed to fetch active traffic days from {table}"))?;
        Ok(rows
            .into_iter()
            .map(|(cell, vendor, date)| CellTrafficDay { cell, vendor, date })
            .collect())
    }

    async fn cell_metadata(&self, site: Option<&str>) -> Result<Vec<CellMeta>> {
        let rows: Vec<(String, String, String, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT cell_name, att_name, att_tech, band_indicator, vendor
            FROM master_cell_total
            WHERE ($1::text IS NULL OR att_name = $1)
            ORDER BY cell_name
            "#,
        )
        .bind(site)
        .fetch_all(&self.db)
        .await
        .context("failed to fetch cell metadata")?;

        let mut metadata = Vec::with_capacity(rows.len());
        for (cell, site, tech, band, vendor) in rows {
            let Some(tech) = parse_cell_tech(&tech) else {
                tracing::debug!(cell = %cell, tech = %tech, "skipping cell with unsupported technology");
                continue;
            };
            metadata.push(CellMeta {
                cell,
                site,
                tech,
                band: band.unwrap_or_default(),
                vendor: vendor.unwrap_or_default(),
            });
        }
        Ok(metadata)
    }
}

fn parse_cell_tech(raw: &str) -> Option<CellTech> {
    let normalized = raw.trim().to_lowercase();
    match normalized.as_str() {
        "umts" | "3g" => Some(CellTech::Umts),
        "lte" | "4g" => Some(CellTech::Lte),
        _ => None,
    }
}
