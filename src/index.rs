//! Correction index resolution.
//!
//! An [`IndexTable`] holds whatever real or manually entered monthly values
//! are known, keyed by simulated month. The [`CorrectionIndexProvider`]
//! turns that sparse table plus the configured averages into one rate per
//! month, according to a [`CorrectionMode`].

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Rate;
use crate::config::{PhaseBoundaries, SimulationPhase, ValidatedConfig};

/// The monthly indices a plan can be corrected by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Construction cost (INCC), used up to handover.
    Incc,
    /// Consumer prices (IPCA), used after handover.
    Ipca,
    /// Reference rate (TR), used by bank loans.
    Tr,
}

impl IndexKind {
    pub fn for_phase(phase: SimulationPhase) -> Self {
        match phase {
            SimulationPhase::Grace | SimulationPhase::DownPayment | SimulationPhase::PreHandover => {
                IndexKind::Incc
            }
            SimulationPhase::PostHandover => IndexKind::Ipca,
        }
    }
}

/// Known values for one month. `None` means "no value available", never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default)]
    pub incc: Option<Rate>,
    #[serde(default)]
    pub ipca: Option<Rate>,
    #[serde(default)]
    pub tr: Option<Rate>,
}

impl IndexEntry {
    pub fn get(&self, kind: IndexKind) -> Option<Rate> {
        match kind {
            IndexKind::Incc => self.incc,
            IndexKind::Ipca => self.ipca,
            IndexKind::Tr => self.tr,
        }
    }

    pub fn set(&mut self, kind: IndexKind, value: Option<Rate>) {
        match kind {
            IndexKind::Incc => self.incc = value,
            IndexKind::Ipca => self.ipca = value,
            IndexKind::Tr => self.tr = value,
        }
    }

    fn is_empty(&self) -> bool {
        self.incc.is_none() && self.ipca.is_none() && self.tr.is_none()
    }
}

/// Sparse `month -> values` mapping, months in global simulation numbering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexTable {
    entries: BTreeMap<u32, IndexEntry>,
}

impl IndexTable {
    /// An empty table: every lookup is "no value available".
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `kind` at global `month`, replacing any previous
    /// value.
    pub fn insert(&mut self, month: u32, kind: IndexKind, value: Rate) {
        self.entries.entry(month).or_default().set(kind, Some(value));
    }

    /// The known value of `kind` at global `month`, `None` when there is none.
    pub fn get(&self, month: u32, kind: IndexKind) -> Option<Rate> {
        self.entries.get(&month).and_then(|entry| entry.get(kind))
    }

    /// Overlays manually edited values; a manual value wins over the existing
    /// one for the same month and index, a manual `None` keeps it.
    pub fn merge_manual(&mut self, manual: &IndexTable) {
        for (month, entry) in &manual.entries {
            let target = self.entries.entry(*month).or_default();
            for kind in [IndexKind::Incc, IndexKind::Ipca, IndexKind::Tr] {
                if let Some(value) = entry.get(kind) {
                    target.set(kind, Some(value));
                }
            }
        }
    }

    /// Last month holding any real value.
    pub fn last_month(&self) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .find(|(_, entry)| !entry.is_empty())
            .map(|(month, _)| *month)
    }

    /// Last month holding a value for `kind`.
    pub fn last_month_of(&self, kind: IndexKind) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .find(|(_, entry)| entry.get(kind).is_some())
            .map(|(month, _)| *month)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u32, IndexEntry)> for IndexTable {
    fn from_iter<T: IntoIterator<Item = (u32, IndexEntry)>>(iter: T) -> Self {
        IndexTable {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Policy for combining real values and averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    /// Always the configured average, ignoring real values.
    #[default]
    AverageOnly,
    /// The real value when present, the average otherwise.
    RealWithFallback,
    /// The real value when present, zero otherwise.
    RealOnlyWithCutoff,
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Real,
    Average,
    /// Average used because no real value was available.
    AverageFallback,
    /// Zero because the month precedes the correction start.
    NotStarted,
    /// Zero because the month is past the cutoff.
    CutOff,
    /// Zero because no real value was available and no fallback applies.
    Unavailable,
}

impl RateSource {
    pub fn label(&self) -> &'static str {
        match self {
            RateSource::Real => "real",
            RateSource::Average => "average",
            RateSource::AverageFallback => "average (fallback)",
            RateSource::NotStarted => "not started",
            RateSource::CutOff => "cut off",
            RateSource::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub kind: IndexKind,
    pub rate: Rate,
    pub source: RateSource,
}

impl ResolvedRate {
    fn zero(kind: IndexKind, source: RateSource) -> Self {
        ResolvedRate {
            kind,
            rate: Decimal::ZERO,
            source,
        }
    }
}

/// Per-month correction rate for a builder plan.
#[derive(Debug, Clone)]
pub struct CorrectionIndexProvider<'a> {
    mode: CorrectionMode,
    table: &'a IndexTable,
    avg_construction: Rate,
    avg_price: Rate,
    boundaries: PhaseBoundaries,
    start_month: u32,
    cutoff_month: Option<u32>,
}

impl<'a> CorrectionIndexProvider<'a> {
    /// Provider with the averages and correction window of `config`.
    pub fn new(config: &ValidatedConfig, mode: CorrectionMode, table: &'a IndexTable) -> Self {
        CorrectionIndexProvider {
            mode,
            table,
            avg_construction: config.config.avg_construction_index,
            avg_price: config.config.avg_price_index,
            boundaries: config.boundaries,
            start_month: config.config.correction_start_month,
            cutoff_month: config.config.correction_cutoff_month,
        }
    }

    /// Replaces the configured cutoff.
    pub fn with_cutoff(mut self, cutoff_month: Option<u32>) -> Self {
        self.cutoff_month = cutoff_month;
        self
    }

    pub fn mode(&self) -> CorrectionMode {
        self.mode
    }

    pub fn average(&self, kind: IndexKind) -> Rate {
        match kind {
            IndexKind::Incc => self.avg_construction,
            IndexKind::Ipca => self.avg_price,
            IndexKind::Tr => Decimal::ZERO,
        }
    }

    /// Rate for global `month`. The correction window is checked before any
    /// lookup: grace months always accrue, other months before the start
    /// threshold and every month past the cutoff resolve to zero.
    pub fn resolve(&self, month: u32, phase: SimulationPhase) -> ResolvedRate {
        let kind = IndexKind::for_phase(phase);
        let local = self.boundaries.local_month(month);

        if phase != SimulationPhase::Grace && local < i64::from(self.start_month) {
            return ResolvedRate::zero(kind, RateSource::NotStarted);
        }
        if let Some(cutoff) = self.cutoff_month {
            if local > i64::from(cutoff) {
                return ResolvedRate::zero(kind, RateSource::CutOff);
            }
        }

        let real = self.table.get(month, kind);
        match (self.mode, real) {
            (CorrectionMode::AverageOnly, _) => ResolvedRate {
                kind,
                rate: self.average(kind),
                source: RateSource::Average,
            },
            (CorrectionMode::RealWithFallback | CorrectionMode::RealOnlyWithCutoff, Some(rate)) => {
                ResolvedRate {
                    kind,
                    rate,
                    source: RateSource::Real,
                }
            }
            (CorrectionMode::RealWithFallback, None) => ResolvedRate {
                kind,
                rate: self.average(kind),
                source: RateSource::AverageFallback,
            },
            (CorrectionMode::RealOnlyWithCutoff, None) => {
                ResolvedRate::zero(kind, RateSource::Unavailable)
            }
        }
    }

    /// Local month (counted from the first installment) of the last month
    /// with a real value for any builder index.
    pub fn last_real_local_month(&self) -> Option<u32> {
        let last = [IndexKind::Incc, IndexKind::Ipca]
            .into_iter()
            .filter_map(|kind| self.table.last_month_of(kind))
            .max()?;
        last.checked_sub(self.boundaries.grace_months)
    }
}
