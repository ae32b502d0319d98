//! Simulation configuration.
//!
//! [`SimulationConfig`] is the flat, serializable document a caller (form,
//! file, API) hands over. [`SimulationConfig::validate`] parses its dates and
//! derives the phase boundaries once, so that no simulation ever starts from
//! an inconsistent configuration.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::calendar::MonthYear;
use crate::error::{SimulationError, SimulationResult, invalid_input};
use crate::{Money, Rate};

/// How the down payment ("entrada") is paid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownPaymentMode {
    /// Paid in full at signing and netted from the initial balance.
    #[default]
    LumpSum,
    /// Split in `down_payment_tranche_count` equal monthly tranches.
    Installments,
}

/// Order of the two balance movements inside a month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOrder {
    /// Settle the installments due this month, then correct the remaining balance.
    #[default]
    SettleThenCorrect,
    /// Correct the full balance first; the installments due this month receive
    /// their share of this month's correction before being settled.
    CorrectThenSettle,
}

/// Interest charged on post-handover months.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum InterestPolicy {
    #[default]
    None,
    /// `monthly_rate` over the balance at the start of the month.
    FixedOnBalance { monthly_rate: Rate },
    /// `n / 100` over the month's settled amortization plus correction, where
    /// `n` counts post-handover months from 1.
    Progressive,
}

/// Month phases of a builder payment plan, in the order they occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationPhase {
    /// Carência: between signing and the first installment.
    Grace,
    DownPayment,
    PreHandover,
    PostHandover,
}

impl SimulationPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SimulationPhase::Grace => "Carência",
            SimulationPhase::DownPayment => "Entrada",
            SimulationPhase::PreHandover => "Pré-chaves",
            SimulationPhase::PostHandover => "Pós-chaves",
        }
    }
}

/// Input parameters of a builder ("construtora") payment plan simulation.
///
/// Optional fields fall back to these defaults when omitted from a document:
/// lump-sum down payment in 1 tranche, correction from local month 1 with no
/// cutoff, minimum payoff fraction `0.30`, no extras, no interest,
/// settle-then-correct and no index lag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Contract signing month, `MM/YYYY`.
    pub signing_month: String,
    /// Month of the first scheduled installment, `MM/YYYY`.
    pub first_installment_month: String,
    /// Property total price.
    pub total_price: Money,
    #[serde(default)]
    pub down_payment_total: Money,
    #[serde(default)]
    pub down_payment_mode: DownPaymentMode,
    #[serde(default = "default_tranche_count")]
    pub down_payment_tranche_count: u32,
    #[serde(default)]
    pub pre_handover_months: u32,
    #[serde(default)]
    pub pre_handover_installment: Money,
    #[serde(default)]
    pub post_handover_months: u32,
    #[serde(default)]
    pub post_handover_installment: Money,
    /// Semiannual extras keyed by pre-handover month (1-based).
    #[serde(default)]
    pub extra_semiannual: BTreeMap<u32, Money>,
    /// Annual extras keyed by pre-handover month (1-based).
    #[serde(default)]
    pub extra_annual: BTreeMap<u32, Money>,
    /// Average monthly construction-cost index (INCC), as a fraction.
    pub avg_construction_index: Rate,
    /// Average monthly consumer-price index (IPCA), as a fraction.
    pub avg_price_index: Rate,
    /// First month, counted from the first installment, that is corrected.
    #[serde(default = "default_correction_start")]
    pub correction_start_month: u32,
    /// Last month, counted from the first installment, that is corrected.
    #[serde(default)]
    pub correction_cutoff_month: Option<u32>,
    #[serde(default = "default_minimum_payoff_fraction")]
    pub minimum_payoff_fraction: Rate,
    #[serde(default)]
    pub interest: InterestPolicy,
    #[serde(default)]
    pub settlement_order: SettlementOrder,
    /// Months between a simulated month and the series month it reads.
    #[serde(default)]
    pub index_lag_months: u32,
}

fn default_tranche_count() -> u32 {
    1
}

fn default_correction_start() -> u32 {
    1
}

fn default_minimum_payoff_fraction() -> Rate {
    dec!(0.30)
}

impl SimulationConfig {
    pub fn from_json(text: &str) -> SimulationResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses the dates, checks the amounts and derives the phase boundaries.
    pub fn validate(&self) -> SimulationResult<ValidatedConfig> {
        let signing = parse_month("signing_month", &self.signing_month)?;
        let first_installment =
            parse_month("first_installment_month", &self.first_installment_month)?;
        let grace = signing.months_until(first_installment);
        if grace < 0 {
            return Err(SimulationError::FirstInstallmentBeforeSigning {
                signing: signing.label(),
                first_installment: first_installment.label(),
            });
        }

        if self.total_price <= Decimal::ZERO {
            return Err(invalid_input("total_price", "must be positive"));
        }
        if self.down_payment_total < Decimal::ZERO || self.down_payment_total > self.total_price {
            return Err(invalid_input(
                "down_payment_total",
                "must be between zero and the total price",
            ));
        }
        if self.down_payment_mode == DownPaymentMode::Installments
            && self.down_payment_tranche_count == 0
        {
            return Err(invalid_input(
                "down_payment_tranche_count",
                "must be at least 1 when the down payment is split",
            ));
        }
        for (field, value) in [
            ("pre_handover_installment", self.pre_handover_installment),
            ("post_handover_installment", self.post_handover_installment),
        ] {
            if value < Decimal::ZERO {
                return Err(invalid_input(field, "must not be negative"));
            }
        }
        for (field, extras) in [
            ("extra_semiannual", &self.extra_semiannual),
            ("extra_annual", &self.extra_annual),
        ] {
            if extras.values().any(|amount| *amount < Decimal::ZERO) {
                return Err(invalid_input(field, "amounts must not be negative"));
            }
        }
        for (field, rate) in [
            ("avg_construction_index", self.avg_construction_index),
            ("avg_price_index", self.avg_price_index),
        ] {
            if rate <= dec!(-1) {
                return Err(invalid_input(field, "must be greater than -100%"));
            }
        }
        if self.correction_start_month == 0 {
            return Err(invalid_input("correction_start_month", "months are 1-based"));
        }
        if self.minimum_payoff_fraction < Decimal::ZERO || self.minimum_payoff_fraction > Decimal::ONE
        {
            return Err(invalid_input("minimum_payoff_fraction", "must be within [0, 1]"));
        }
        if let InterestPolicy::FixedOnBalance { monthly_rate } = self.interest {
            if monthly_rate < Decimal::ZERO {
                return Err(invalid_input("interest.monthly_rate", "must not be negative"));
            }
        }

        let down_payment_months = match self.down_payment_mode {
            DownPaymentMode::LumpSum => 0,
            DownPaymentMode::Installments => self.down_payment_tranche_count,
        };

        Ok(ValidatedConfig {
            config: self.clone(),
            signing,
            first_installment,
            boundaries: PhaseBoundaries {
                grace_months: grace as u32,
                down_payment_months,
                pre_handover_months: self.pre_handover_months,
                post_handover_months: self.post_handover_months,
            },
        })
    }
}

fn parse_month(field: &str, value: &str) -> SimulationResult<MonthYear> {
    MonthYear::parse(value).ok_or_else(|| SimulationError::InvalidDate {
        field: field.into(),
        value: value.into(),
    })
}

/// Month ranges of each phase, in global month numbering (month 1 is the
/// signing month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBoundaries {
    pub grace_months: u32,
    pub down_payment_months: u32,
    pub pre_handover_months: u32,
    pub post_handover_months: u32,
}

impl PhaseBoundaries {
    pub fn total_months(&self) -> u32 {
        self.grace_months
            + self.down_payment_months
            + self.pre_handover_months
            + self.post_handover_months
    }

    /// Last month before the keys are handed over.
    pub fn handover_month(&self) -> u32 {
        self.grace_months + self.down_payment_months + self.pre_handover_months
    }

    pub fn phase_of(&self, month: u32) -> SimulationPhase {
        if month <= self.grace_months {
            SimulationPhase::Grace
        } else if month <= self.grace_months + self.down_payment_months {
            SimulationPhase::DownPayment
        } else if month <= self.handover_month() {
            SimulationPhase::PreHandover
        } else {
            SimulationPhase::PostHandover
        }
    }

    /// Month counted from the first installment (local month 1); grace
    /// months are zero or negative.
    pub fn local_month(&self, month: u32) -> i64 {
        i64::from(month) - i64::from(self.grace_months)
    }

    /// Global month of the `n`-th (1-based) pre-handover month.
    pub fn pre_handover_month(&self, n: u32) -> u32 {
        self.grace_months + self.down_payment_months + n
    }
}

/// A configuration whose dates parsed and whose amounts are consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub config: SimulationConfig,
    pub signing: MonthYear,
    pub first_installment: MonthYear,
    pub boundaries: PhaseBoundaries,
}

impl ValidatedConfig {
    /// Balance at the start of month 1.
    pub fn initial_balance(&self) -> Money {
        self.config.total_price - self.lump_sum_down_payment()
    }

    /// Down payment paid at signing, outside the installment schedule.
    ///
    /// Zero when the down payment is split into tranches, which are then
    /// installments of the schedule and part of the initial balance.
    pub fn lump_sum_down_payment(&self) -> Money {
        match self.config.down_payment_mode {
            DownPaymentMode::LumpSum => self.config.down_payment_total,
            DownPaymentMode::Installments => Decimal::ZERO,
        }
    }

    /// Calendar month of simulated month `month` (month 1 is the signing month).
    pub fn month_label(&self, month: u32) -> MonthYear {
        self.signing.add_months(month.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::example_config;
    use rstest::rstest;

    #[test]
    fn test_defaults_from_json() {
        let config = SimulationConfig::from_json(
            r#"{
                "signing_month": "01/2025",
                "first_installment_month": "03/2025",
                "total_price": "300000",
                "pre_handover_months": 10,
                "pre_handover_installment": "1000",
                "avg_construction_index": "0.005",
                "avg_price_index": "0.004",
                "extra_annual": { "10": "5000" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.down_payment_mode, DownPaymentMode::LumpSum);
        assert_eq!(config.down_payment_tranche_count, 1);
        assert_eq!(config.correction_start_month, 1);
        assert_eq!(config.correction_cutoff_month, None);
        assert_eq!(config.minimum_payoff_fraction, dec!(0.30));
        assert_eq!(config.interest, InterestPolicy::None);
        assert_eq!(config.settlement_order, SettlementOrder::SettleThenCorrect);
        assert_eq!(config.extra_annual.get(&10), Some(&dec!(5000)));

        let validated = config.validate().unwrap();
        assert_eq!(validated.boundaries.grace_months, 2);
        assert_eq!(validated.boundaries.total_months(), 12);
    }

    #[test]
    fn test_interest_policy_is_tagged() {
        let policy: InterestPolicy =
            serde_json::from_str(r#"{ "policy": "fixed_on_balance", "monthly_rate": "0.01" }"#)
                .unwrap();
        assert_eq!(policy, InterestPolicy::FixedOnBalance { monthly_rate: dec!(0.01) });
    }

    #[rstest]
    #[case("13/2024", "01/2025", "signing_month")]
    #[case("01/2025", "abc", "first_installment_month")]
    fn test_unparseable_dates_are_fatal(
        #[case] signing: &str,
        #[case] first: &str,
        #[case] field: &str,
    ) {
        let mut config = example_config();
        config.signing_month = signing.into();
        config.first_installment_month = first.into();
        match config.validate() {
            Err(SimulationError::InvalidDate { field: f, .. }) => assert_eq!(f, field),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_first_installment_before_signing_is_fatal() {
        let mut config = example_config();
        config.signing_month = "05/2025".into();
        config.first_installment_month = "04/2025".into();
        assert!(matches!(
            config.validate(),
            Err(SimulationError::FirstInstallmentBeforeSigning { .. })
        ));
    }

    #[test]
    fn test_split_down_payment_requires_tranches() {
        let mut config = example_config();
        config.down_payment_mode = DownPaymentMode::Installments;
        config.down_payment_tranche_count = 0;
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_phase_boundaries() {
        let boundaries = PhaseBoundaries {
            grace_months: 2,
            down_payment_months: 3,
            pre_handover_months: 4,
            post_handover_months: 5,
        };
        let phases: Vec<_> = (1..=boundaries.total_months())
            .map(|m| boundaries.phase_of(m))
            .collect();
        assert_eq!(phases[0], SimulationPhase::Grace);
        assert_eq!(phases[1], SimulationPhase::Grace);
        assert_eq!(phases[2], SimulationPhase::DownPayment);
        assert_eq!(phases[4], SimulationPhase::DownPayment);
        assert_eq!(phases[5], SimulationPhase::PreHandover);
        assert_eq!(phases[8], SimulationPhase::PreHandover);
        assert_eq!(phases[9], SimulationPhase::PostHandover);
        assert_eq!(boundaries.handover_month(), 9);
        assert_eq!(boundaries.local_month(1), -1);
        assert_eq!(boundaries.local_month(3), 1);
        assert_eq!(boundaries.pre_handover_month(1), 6);
    }

    #[test]
    fn test_lump_sum_nets_initial_balance() {
        let validated = example_config().validate().unwrap();
        assert_eq!(validated.initial_balance(), dec!(433479.46));
        assert_eq!(validated.month_label(1), validated.signing);
        assert_eq!(validated.month_label(13).label(), "01/2026");
    }
}
