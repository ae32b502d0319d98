//! Installment schedule of a builder payment plan.
//!
//! The schedule is indexed by due month so the engine can settle a month by
//! removing its key, and spread correction over whatever is left.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Money;
use crate::config::{SimulationConfig, ValidatedConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentPhase {
    DownPayment,
    PreHandover,
    PostHandover,
}

/// A future payment owed to the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    /// Global month (month 1 is the signing month).
    pub due_month: u32,
    pub face_value: Money,
    /// Correction diluted into this installment while it was outstanding.
    pub accumulated_correction: Money,
    pub phase: InstallmentPhase,
}

impl Installment {
    pub fn new(due_month: u32, face_value: Money, phase: InstallmentPhase) -> Self {
        Installment {
            due_month,
            face_value,
            accumulated_correction: Decimal::ZERO,
            phase,
        }
    }

    pub fn amount_due(&self) -> Money {
        self.face_value + self.accumulated_correction
    }
}

/// Outstanding installments keyed by due month.
///
/// Several installments may share a due month; each one keeps its own
/// correction share.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallmentSchedule {
    by_month: BTreeMap<u32, Vec<Installment>>,
    outstanding_face: Money,
}

impl InstallmentSchedule {
    /// Builds the full plan: down-payment tranches, pre-handover installments
    /// (extras added onto the same month) and post-handover installments.
    /// Months whose amount is zero get no installment.
    pub fn build(config: &ValidatedConfig) -> Self {
        let boundaries = config.boundaries;
        let input = &config.config;
        let mut schedule = InstallmentSchedule::default();

        if boundaries.down_payment_months > 0 {
            let tranche = input.down_payment_total / Decimal::from(boundaries.down_payment_months);
            for n in 1..=boundaries.down_payment_months {
                schedule.push(Installment::new(
                    boundaries.grace_months + n,
                    tranche,
                    InstallmentPhase::DownPayment,
                ));
            }
        }

        for n in 1..=boundaries.pre_handover_months {
            let amount = input.pre_handover_installment
                + input.extra_semiannual.get(&n).copied().unwrap_or_default()
                + input.extra_annual.get(&n).copied().unwrap_or_default();
            schedule.push(Installment::new(
                boundaries.pre_handover_month(n),
                amount,
                InstallmentPhase::PreHandover,
            ));
        }

        for n in 1..=boundaries.post_handover_months {
            schedule.push(Installment::new(
                boundaries.handover_month() + n,
                input.post_handover_installment,
                InstallmentPhase::PostHandover,
            ));
        }

        for month in extras_outside_window(input) {
            warn!(month, "extra installment configured outside the pre-handover window, ignored");
        }

        schedule
    }

    /// Adds an installment; zero amounts are dropped.
    pub fn push(&mut self, installment: Installment) {
        if installment.face_value.is_zero() {
            return;
        }
        self.outstanding_face += installment.face_value;
        self.by_month
            .entry(installment.due_month)
            .or_default()
            .push(installment);
    }

    /// Removes and returns every installment due in `month`.
    pub fn take_due(&mut self, month: u32) -> Vec<Installment> {
        let due = self.by_month.remove(&month).unwrap_or_default();
        for installment in &due {
            self.outstanding_face -= installment.face_value;
        }
        if self.by_month.is_empty() {
            self.outstanding_face = Decimal::ZERO;
        }
        due
    }

    /// Spreads `amount` over the outstanding installments in proportion to
    /// their face values and returns how much was actually distributed
    /// (zero when nothing is outstanding).
    pub fn distribute(&mut self, amount: Money) -> Money {
        if amount.is_zero() || self.outstanding_face <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let total_face = self.outstanding_face;
        let mut distributed = Decimal::ZERO;
        for installment in self.by_month.values_mut().flatten() {
            let share = installment.face_value / total_face * amount;
            installment.accumulated_correction += share;
            distributed += share;
        }
        distributed
    }

    pub fn outstanding_face(&self) -> Money {
        self.outstanding_face
    }

    /// Correction already diluted into installments not yet paid.
    pub fn pending_correction(&self) -> Money {
        self.iter().map(|i| i.accumulated_correction).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Installment> {
        self.by_month.values().flatten()
    }

    pub fn due_in(&self, month: u32) -> &[Installment] {
        self.by_month.get(&month).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_month.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_month.is_empty()
    }
}

/// Extra tranche months that do not fall inside `1..=pre_handover_months`.
pub fn extras_outside_window(config: &SimulationConfig) -> Vec<u32> {
    let mut months: Vec<u32> = config
        .extra_semiannual
        .keys()
        .chain(config.extra_annual.keys())
        .copied()
        .filter(|month| *month == 0 || *month > config.pre_handover_months)
        .collect();
    months.sort_unstable();
    months.dedup();
    months
}
