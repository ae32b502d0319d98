//! Bank financing: SAC and Price tables with construction-phase interest,
//! monetary indexation, insurance and administrative fees.
//!
//! In the SAC system (Sistema de Amortização Constante) the principal portion
//! is constant and payments decrease; in the Price system (Sistema Francês de
//! Amortização) the payment is level. When the balance is indexed (TR or
//! IPCA) both are recomputed on the adjusted balance over the remaining
//! months, so the loan still closes at zero.

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SimulationError, SimulationResult, invalid_input, overflow};
use crate::index::{IndexKind, IndexTable};
use crate::{Money, Rate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmortizationSystem {
    #[default]
    Sac,
    Price,
}

/// Index the bank loan balance is adjusted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankIndex {
    #[default]
    None,
    Tr,
    Ipca,
}

impl BankIndex {
    fn kind(&self) -> Option<IndexKind> {
        match self {
            BankIndex::None => None,
            BankIndex::Tr => Some(IndexKind::Tr),
            BankIndex::Ipca => Some(IndexKind::Ipca),
        }
    }
}

/// A `(month, cumulative percent)` anchor of the construction progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub month: u32,
    /// Cumulative percentage complete, `0..=100`.
    pub percent: Decimal,
}

/// How the released balance grows while the building is under construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstructionCurve {
    #[default]
    Linear,
    /// Smoothstep `3t² - 2t³`.
    SCurve,
    /// Piecewise-linear between anchors, from 0% at month 0 to 100% at the
    /// end of construction.
    Milestones { points: Vec<Milestone> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionPhase {
    pub months: u32,
    #[serde(default)]
    pub curve: ConstructionCurve,
}

/// Input parameters of a bank loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankLoanConfig {
    /// The total principal amount of the loan.
    pub total_amount: Money,
    /// Property value, base of the damage insurance.
    #[serde(default)]
    pub property_value: Money,
    /// The annual interest rate as a percentage (e.g., 10.5 for 10.5%).
    pub interest_per_year: Decimal,
    /// Number of amortization months, after any construction phase.
    pub total_months: u32,
    #[serde(default)]
    pub system: AmortizationSystem,
    #[serde(default)]
    pub construction: Option<ConstructionPhase>,
    #[serde(default)]
    pub index: BankIndex,
    /// Monthly index rate used when no real value is known.
    #[serde(default)]
    pub avg_index_rate: Rate,
    /// Flat monthly administrative fee.
    #[serde(default)]
    pub admin_fee: Money,
    /// Monthly property-damage insurance, as a fraction of the property value.
    #[serde(default)]
    pub damage_insurance_rate: Rate,
    /// Monthly life/disability insurance, as a fraction of the balance.
    #[serde(default)]
    pub life_insurance_rate: Rate,
}

impl BankLoanConfig {
    pub fn validate(&self) -> SimulationResult<()> {
        if self.total_months == 0 {
            return Err(SimulationError::ZeroTerm);
        }
        if self.total_amount < Decimal::ZERO {
            return Err(invalid_input("total_amount", "must not be negative"));
        }
        for (field, value) in [
            ("property_value", self.property_value),
            ("interest_per_year", self.interest_per_year),
            ("admin_fee", self.admin_fee),
            ("damage_insurance_rate", self.damage_insurance_rate),
            ("life_insurance_rate", self.life_insurance_rate),
        ] {
            if value < Decimal::ZERO {
                return Err(invalid_input(field, "must not be negative"));
            }
        }
        if let Some(ConstructionPhase {
            curve: ConstructionCurve::Milestones { points },
            ..
        }) = &self.construction
        {
            let mut sorted = points.clone();
            sorted.sort_by_key(|point| point.month);
            if sorted
                .iter()
                .any(|point| point.percent < Decimal::ZERO || point.percent > Decimal::ONE_HUNDRED)
            {
                return Err(invalid_input("construction.curve", "percentages must be within 0..=100"));
            }
            if sorted.windows(2).any(|pair| pair[1].percent < pair[0].percent) {
                return Err(invalid_input("construction.curve", "percentages must not decrease"));
            }
        }
        Ok(())
    }

    pub fn construction_months(&self) -> u32 {
        self.construction.as_ref().map_or(0, |phase| phase.months)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankPhase {
    Construction,
    Amortization,
}

/// Represents the payment details for a single month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRow {
    /// Month of the loan, 1-based.
    pub month: u32,
    pub phase: BankPhase,
    /// Fraction of the construction complete (1 once amortizing).
    pub percent_complete: Rate,
    /// The remaining balance of the loan after the payment.
    pub balance: Money,
    /// The portion of the payment that goes towards reducing the principal.
    pub amortization: Money,
    /// The portion of the payment that covers interest.
    pub interest: Money,
    /// Indexation added to the balance before interest.
    pub index_adjustment: Money,
    pub insurance: Money,
    pub admin_fee: Money,
    pub total_payment: Money,
}

/// Contains the results of a bank loan simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankOutcome {
    pub system: AmortizationSystem,
    pub monthly_interest_rate: Rate,
    /// First amortization-phase payment.
    pub first_payment: Money,
    /// Last amortization-phase payment.
    pub last_payment: Money,
    /// The total amount paid over the lifetime of the loan.
    pub total_paid: Money,
    pub total_interest: Money,
    pub total_insurance: Money,
    pub total_fees: Money,
    pub total_index_adjustment: Money,
    pub rows: Vec<BankRow>,
}

impl BankOutcome {
    pub fn payments(&self) -> Vec<Money> {
        self.rows.iter().map(|row| row.total_payment).collect()
    }
}

/// The same loan under both systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemComparison {
    pub initial_total_amount: Money,
    pub sac_table: BankOutcome,
    pub price_table: BankOutcome,
}

/// Normalizes an annual interest rate percentage to a monthly decimal factor.
///
/// This function converts a rate like 10.5% per year into its equivalent monthly rate
/// for use in compound interest calculations.
pub fn normalize_annual_interest_rate(input: Decimal) -> Decimal {
    let base = Decimal::ONE + input / Decimal::ONE_HUNDRED;
    base.powd(Decimal::ONE / dec!(12)) - Decimal::ONE
}

/// Level payment of a Price table: PMT = P * [i(1 + i)^n] / [(1 + i)^n – 1]
///
/// Returns `None` when `(1 + i)^n` or the payment does not fit a `Decimal`.
pub fn price_payment(balance: Money, monthly_interest_rate: Rate, months: u32) -> Option<Money> {
    if months == 0 {
        return Some(balance);
    }
    if monthly_interest_rate.is_zero() {
        return Some(balance / Decimal::from(months));
    }
    let i_plus_1_pow_n = (Decimal::ONE + monthly_interest_rate).checked_powu(months.into())?;
    let annuity = i_plus_1_pow_n.checked_div(i_plus_1_pow_n - Decimal::ONE)?;
    balance.checked_mul(monthly_interest_rate)?.checked_mul(annuity)
}

/// Fraction of the construction complete after `month` of `total` months.
pub fn percent_complete(curve: &ConstructionCurve, month: u32, total: u32) -> Rate {
    if total == 0 || month >= total {
        return Decimal::ONE;
    }
    let t = Decimal::from(month) / Decimal::from(total);
    match curve {
        ConstructionCurve::Linear => t,
        ConstructionCurve::SCurve => dec!(3) * t * t - dec!(2) * t * t * t,
        ConstructionCurve::Milestones { points } => milestone_percent(points, month, total),
    }
}

fn milestone_percent(points: &[Milestone], month: u32, total: u32) -> Rate {
    let mut anchors: Vec<(u32, Decimal)> = vec![(0, Decimal::ZERO)];
    let mut sorted: Vec<Milestone> = points.to_vec();
    sorted.sort_by_key(|point| point.month);
    anchors.extend(
        sorted
            .iter()
            .filter(|point| point.month > 0 && point.month < total)
            .map(|point| (point.month, point.percent)),
    );
    anchors.push((total, Decimal::ONE_HUNDRED));

    let percent = anchors
        .windows(2)
        .find(|pair| month <= pair[1].0)
        .map(|pair| {
            let ((m0, p0), (m1, p1)) = (pair[0], pair[1]);
            p0 + (p1 - p0) * Decimal::from(month - m0) / Decimal::from(m1 - m0)
        })
        .unwrap_or(Decimal::ONE_HUNDRED);

    percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED) / Decimal::ONE_HUNDRED
}

/// Simulates a bank loan month by month.
///
/// # Arguments
///
/// * `config` - The loan parameters.
/// * `index` - Known TR/IPCA values, months in global numbering.
/// * `month_offset` - The global month preceding the loan's first month.
///
/// # Errors
///
/// Returns an error if `total_months` is zero, an amount is negative, or the
/// rates drive an amount past the `Decimal` range.
pub fn run_bank_loan(
    config: &BankLoanConfig,
    index: &IndexTable,
    month_offset: u32,
) -> SimulationResult<BankOutcome> {
    config.validate()?;

    let monthly_interest_rate = normalize_annual_interest_rate(config.interest_per_year);
    let damage_insurance = config
        .damage_insurance_rate
        .checked_mul(config.property_value)
        .ok_or_else(|| overflow("damage_insurance_rate", 1))?;
    let mut rows = Vec::new();
    let mut month = 0u32;

    if let Some(construction) = &config.construction {
        for n in 1..=construction.months {
            month += 1;
            let percent = percent_complete(&construction.curve, n, construction.months);
            let released = config.total_amount * percent;
            let charges = released
                .checked_mul(monthly_interest_rate)
                .zip(config.life_insurance_rate.checked_mul(released));
            let (interest, life_insurance) =
                charges.ok_or_else(|| overflow("interest_per_year", month))?;
            let insurance = damage_insurance + life_insurance;
            rows.push(BankRow {
                month,
                phase: BankPhase::Construction,
                percent_complete: percent,
                balance: released,
                amortization: Decimal::ZERO,
                interest,
                index_adjustment: Decimal::ZERO,
                insurance,
                admin_fee: config.admin_fee,
                total_payment: checked_total(&[interest, insurance, config.admin_fee])
                    .ok_or_else(|| overflow("interest_per_year", month))?,
            });
        }
    }

    let mut balance = config.total_amount;
    for n in 1..=config.total_months {
        month += 1;
        let remaining = config.total_months - n + 1;

        let index_rate = config.index.kind().map_or(Decimal::ZERO, |kind| {
            index
                .get(month_offset + month, kind)
                .unwrap_or(config.avg_index_rate)
        });
        let index_adjustment = balance
            .checked_mul(index_rate)
            .ok_or_else(|| overflow("avg_index_rate", month))?;
        balance = balance
            .checked_add(index_adjustment)
            .ok_or_else(|| overflow("avg_index_rate", month))?;

        let interest = balance
            .checked_mul(monthly_interest_rate)
            .ok_or_else(|| overflow("interest_per_year", month))?;
        let amortization = match config.system {
            AmortizationSystem::Sac => balance / Decimal::from(remaining),
            AmortizationSystem::Price => {
                price_payment(balance, monthly_interest_rate, remaining)
                    .ok_or_else(|| overflow("interest_per_year", month))?
                    - interest
            }
        };
        let insurance = config
            .life_insurance_rate
            .checked_mul(balance)
            .and_then(|life| life.checked_add(damage_insurance))
            .ok_or_else(|| overflow("life_insurance_rate", month))?;
        let total_payment = checked_total(&[amortization, interest, insurance, config.admin_fee])
            .ok_or_else(|| overflow("interest_per_year", month))?;

        balance -= amortization;
        // clears division dust left on the last month
        if n == config.total_months || balance < Decimal::ZERO {
            balance = balance.max(Decimal::ZERO).round_dp(8);
        }

        debug!(month, %balance, %total_payment, "bank month simulated");
        rows.push(BankRow {
            month,
            phase: BankPhase::Amortization,
            percent_complete: Decimal::ONE,
            balance,
            amortization,
            interest,
            index_adjustment,
            insurance,
            admin_fee: config.admin_fee,
            total_payment,
        });
    }

    let amortizing = rows.iter().filter(|row| row.phase == BankPhase::Amortization);
    let first_payment = amortizing.clone().next().map(|row| row.total_payment).unwrap_or_default();
    let last_payment = amortizing.last().map(|row| row.total_payment).unwrap_or_default();
    let sum = |field: fn(&BankRow) -> Money| {
        let values: Vec<Money> = rows.iter().map(field).collect();
        checked_total(&values)
            .map(|total| total.round_dp(2))
            .ok_or_else(|| overflow("interest_per_year", month))
    };

    let outcome = BankOutcome {
        system: config.system,
        monthly_interest_rate,
        first_payment: first_payment.round_dp(2),
        last_payment: last_payment.round_dp(2),
        total_paid: sum(|row| row.total_payment)?,
        total_interest: sum(|row| row.interest)?,
        total_insurance: sum(|row| row.insurance)?,
        total_fees: sum(|row| row.admin_fee)?,
        total_index_adjustment: sum(|row| row.index_adjustment)?,
        rows,
    };

    info!(
        system = ?outcome.system,
        months = outcome.rows.len(),
        total_paid = %outcome.total_paid,
        "bank loan simulated"
    );
    Ok(outcome)
}

fn checked_total(values: &[Money]) -> Option<Money> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(*value))
}

/// Calculates and compares the same loan under the SAC and Price systems.
pub fn compare_systems(
    config: &BankLoanConfig,
    index: &IndexTable,
    month_offset: u32,
) -> SimulationResult<SystemComparison> {
    let sac = BankLoanConfig {
        system: AmortizationSystem::Sac,
        ..config.clone()
    };
    let price = BankLoanConfig {
        system: AmortizationSystem::Price,
        ..config.clone()
    };
    Ok(SystemComparison {
        initial_total_amount: config.total_amount,
        sac_table: run_bank_loan(&sac, index, month_offset)?,
        price_table: run_bank_loan(&price, index, month_offset)?,
    })
}
