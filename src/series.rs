//! Real index series from the Banco Central SGS time-series service.
//!
//! The HTTP round-trip belongs to the caller: it implements [`SeriesSource`]
//! (usually by fetching [`sgs_url`] and handing the body to
//! [`parse_sgs_payload`]). Errors are returned as they come; nothing here
//! retries.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use crate::Rate;
use crate::calendar::MonthYear;
use crate::config::ValidatedConfig;
use crate::index::{IndexKind, IndexTable};

/// Numeric SGS series code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesCode(pub u32);

impl SeriesCode {
    pub const INCC: SeriesCode = SeriesCode(192);
    pub const IPCA: SeriesCode = SeriesCode(433);
    pub const TR: SeriesCode = SeriesCode(226);

    pub fn for_kind(kind: IndexKind) -> Self {
        match kind {
            IndexKind::Incc => SeriesCode::INCC,
            IndexKind::Ipca => SeriesCode::IPCA,
            IndexKind::Tr => SeriesCode::TR,
        }
    }
}

/// Monthly rates (fractions) keyed by calendar month.
pub type IndexSeries = BTreeMap<MonthYear, Rate>;

/// Anything able to fetch a series for an inclusive month range.
pub trait SeriesSource {
    fn fetch(&self, code: SeriesCode, start: MonthYear, end: MonthYear) -> anyhow::Result<IndexSeries>;
}

/// SGS JSON endpoint for `code` between the first day of `start` and the
/// last day of `end`.
pub fn sgs_url(code: SeriesCode, start: MonthYear, end: MonthYear) -> String {
    let last_day = end.add_months(1).first_day() - Days::new(1);
    format!(
        "https://api.bcb.gov.br/dados/serie/bcdata.sgs.{}/dados?formato=json&dataInicial={}&dataFinal={}",
        code.0,
        start.first_day().format("%d/%m/%Y"),
        last_day.format("%d/%m/%Y"),
    )
}

#[derive(Debug, Deserialize)]
struct SgsObservation {
    data: String,
    valor: serde_json::Value,
}

/// Parses an SGS payload (`[{"data": "01/02/2024", "valor": "0.52"}, ...]`).
/// Values are percentages and come back divided by 100. When a series has
/// several observations in one month the first one is kept.
pub fn parse_sgs_payload(payload: &str) -> anyhow::Result<IndexSeries> {
    let observations: Vec<SgsObservation> =
        serde_json::from_str(payload).context("SGS payload is not a list of observations")?;

    let mut series = IndexSeries::new();
    for observation in observations {
        let date = NaiveDate::parse_from_str(observation.data.trim(), "%d/%m/%Y")
            .with_context(|| format!("invalid SGS date '{}'", observation.data))?;
        let percent = match &observation.valor {
            serde_json::Value::String(text) => Decimal::from_str(text.trim()),
            serde_json::Value::Number(number) => Decimal::from_str(&number.to_string()),
            other => return Err(anyhow!("invalid SGS value {other} on {}", observation.data)),
        }
        .with_context(|| format!("invalid SGS value on {}", observation.data))?;

        let month = MonthYear::from_date(date);
        if series.contains_key(&month) {
            debug!(%month, "extra observation in month ignored");
            continue;
        }
        series.insert(month, percent / Decimal::ONE_HUNDRED);
    }
    Ok(series)
}

/// The three series a simulation may consult.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    pub incc: IndexSeries,
    pub ipca: IndexSeries,
    pub tr: IndexSeries,
}

impl SeriesSet {
    fn series(&self, kind: IndexKind) -> &IndexSeries {
        match kind {
            IndexKind::Incc => &self.incc,
            IndexKind::Ipca => &self.ipca,
            IndexKind::Tr => &self.tr,
        }
    }

    /// Maps calendar series onto simulated months: month `m` (month 1 being
    /// `first_month`) reads the series value `lag_months` before its own
    /// calendar month.
    pub fn to_index_table(&self, first_month: MonthYear, total_months: u32, lag_months: u32) -> IndexTable {
        let mut table = IndexTable::new();
        for month in 1..=total_months {
            let source_month = first_month.add_months(month - 1).sub_months(lag_months);
            for kind in [IndexKind::Incc, IndexKind::Ipca, IndexKind::Tr] {
                if let Some(rate) = self.series(kind).get(&source_month) {
                    table.insert(month, kind, *rate);
                }
            }
        }
        table
    }
}

/// Fetches INCC, IPCA and TR covering the plan plus `extra_months` (bank
/// months that follow it) and maps them with the configured lag.
pub fn load_index_table(
    source: &impl SeriesSource,
    config: &ValidatedConfig,
    extra_months: u32,
) -> anyhow::Result<IndexTable> {
    let total_months = config.boundaries.total_months() + extra_months;
    let lag = config.config.index_lag_months;
    let start = config.signing.sub_months(lag);
    let end = config.month_label(total_months.max(1)).sub_months(lag);

    let mut set = SeriesSet::default();
    for kind in [IndexKind::Incc, IndexKind::Ipca, IndexKind::Tr] {
        let code = SeriesCode::for_kind(kind);
        let series = source
            .fetch(code, start, end)
            .with_context(|| format!("fetching SGS series {}", code.0))?;
        match kind {
            IndexKind::Incc => set.incc = series,
            IndexKind::Ipca => set.ipca = series,
            IndexKind::Tr => set.tr = series,
        }
    }

    let table = set.to_index_table(config.signing, total_months, lag);
    info!(months = table.len(), %start, %end, lag, "index table loaded");
    Ok(table)
}
