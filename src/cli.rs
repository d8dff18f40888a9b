use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::store::CellTech;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "quality-core-rs",
    version,
    about = "Site quality evaluation over daily KPI series"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Evaluate quality degradation and recovery around an event date.
    Evaluate {
        #[arg(long)]
        site: String,
        /// Event date (YYYY-MM-DD), typically a cell change date.
        #[arg(long)]
        date: NaiveDate,
        /// Neighbor sites for the surrounding-area metrics.
        #[arg(long, value_delimiter = ',')]
        neighbors: Vec<String>,
        /// Relative change treated as significant, overrides the configured value.
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        period: Option<i64>,
        #[arg(long)]
        guard: Option<i64>,
    },
    /// Rebuild traffic-active periods for every cell of one technology.
    DetectPeriods {
        #[arg(long, value_enum)]
        tech: TechArg,
        /// Minimum consecutive active days for a run to count as a period.
        #[arg(long)]
        min_run: Option<i64>,
    },
    /// Derive day-over-day cell inventory change events for a site.
    ChangeEvents {
        #[arg(long)]
        site: String,
        #[arg(long, value_enum)]
        tech: TechArg,
        #[arg(long)]
        min_run: Option<i64>,
        /// Write events to a CSV file instead of printing JSON.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum TechArg {
    Umts,
    Lte,
}

impl From<TechArg> for CellTech {
    fn from(value: TechArg) -> Self {
        match value {
            TechArg::Umts => CellTech::Umts,
            TechArg::Lte => CellTech::Lte,
        }
    }
}
