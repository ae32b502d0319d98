//! Month-by-month simulation of a builder payment plan.
//!
//! Each month the engine settles the installments due, corrects the
//! outstanding balance by the month's index, dilutes that correction over the
//! installments still to be paid (in proportion to their face values),
//! charges post-handover interest and floors the balance at zero. The order
//! of settlement and correction is fixed by [`SettlementOrder`].

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calendar::MonthYear;
use crate::config::{InterestPolicy, SettlementOrder, SimulationConfig, SimulationPhase, ValidatedConfig};
use crate::error::{SimulationResult, overflow};
use crate::index::{CorrectionIndexProvider, CorrectionMode, IndexKind, IndexTable, RateSource};
use crate::schedule::{InstallmentSchedule, extras_outside_window};
use crate::{Money, Rate};

/// One simulated month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub month: u32,
    pub label: MonthYear,
    pub phase: SimulationPhase,
    /// Outstanding balance at the end of the month.
    pub balance: Money,
    pub total_payment: Money,
    /// Face value of the installments settled this month.
    pub base_amortization: Money,
    /// Correction previously diluted into the installments settled this month.
    pub correction_paid: Money,
    pub interest: Money,
    /// Correction generated this month by the construction index.
    pub incc_adjustment: Money,
    /// Correction generated this month by the consumer-price index.
    pub ipca_adjustment: Money,
    pub correction_rate: Rate,
    pub rate_source: RateSource,
}

/// Non-fatal findings reported alongside the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// By the end of the pre-handover phase less than the minimum fraction of
    /// the price was paid.
    MinimumPayoffNotReached {
        month: u32,
        paid: Money,
        required: Money,
    },
    /// An extra tranche keyed outside the pre-handover months was ignored.
    ExtraOutsideWindow { month: u32 },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::MinimumPayoffNotReached {
                month,
                paid,
                required,
            } => write!(
                f,
                "month {month}: paid {} before handover, below the required minimum of {}",
                paid.round_dp(2),
                required.round_dp(2)
            ),
            Advisory::ExtraOutsideWindow { month } => write!(
                f,
                "extra installment at pre-handover month {month} is outside the pre-handover phase"
            ),
        }
    }
}

/// Totals of one simulation run.
///
/// At the end of a run `initial_balance + total_correction_applied` equals
/// `total_amortized + total_correction_paid + final_balance` up to rounding;
/// interest is paid on top and never enters the balance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Balance owed at signing, after any lump-sum down payment.
    pub initial_balance: Money,
    /// Balance left after the last simulated month.
    pub final_balance: Money,
    /// Sum of every monthly total payment, interest included.
    pub total_paid: Money,
    /// Face value settled over the run.
    pub total_amortized: Money,
    /// Correction added to the balance over the run.
    pub total_correction_applied: Money,
    /// Correction settled through installments.
    pub total_correction_paid: Money,
    /// Correction diluted into installments that were never settled.
    pub pending_correction: Money,
    /// Correction that found no installment to dilute into.
    pub absorbed_correction: Money,
    pub total_interest: Money,
}

/// Result of a successful run: one row per simulated month plus the
/// advisories raised along the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub rows: Vec<ResultRow>,
    /// Non-fatal findings; a run with advisories still has a full table.
    pub advisories: Vec<Advisory>,
    pub summary: SimulationSummary,
}

impl SimulationOutcome {
    /// Monthly total payments, in month order.
    pub fn payments(&self) -> Vec<Money> {
        self.rows.iter().map(|row| row.total_payment).collect()
    }
}

/// Simulates `config` with the configured averages only.
///
/// # Errors
///
/// Same as [`simulate_with_index`].
pub fn simulate(config: &SimulationConfig) -> SimulationResult<SimulationOutcome> {
    simulate_with_index(config, CorrectionMode::AverageOnly, &IndexTable::new())
}

/// Simulates `config` resolving rates from `table` under `mode`.
///
/// # Errors
///
/// Returns an error, and no rows, when the configuration does not validate or
/// the rates drive the balance past the `Decimal` range.
pub fn simulate_with_index(
    config: &SimulationConfig,
    mode: CorrectionMode,
    table: &IndexTable,
) -> SimulationResult<SimulationOutcome> {
    let validated = config.validate()?;
    let provider = CorrectionIndexProvider::new(&validated, mode, table);
    AmortizationEngine::new(&validated, provider).run()
}

#[derive(Debug, Default)]
struct Settlement {
    face: Money,
    correction: Money,
}

/// The builder-plan state machine. Every [`run`](AmortizationEngine::run)
/// builds its own installment schedule.
pub struct AmortizationEngine<'a> {
    config: &'a ValidatedConfig,
    provider: CorrectionIndexProvider<'a>,
}

impl<'a> AmortizationEngine<'a> {
    /// Creates an engine for `config` whose monthly rates come from `provider`.
    pub fn new(config: &'a ValidatedConfig, provider: CorrectionIndexProvider<'a>) -> Self {
        AmortizationEngine { config, provider }
    }

    /// Simulates every month from signing to the last post-handover month.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`](crate::error::SimulationError::InvalidInput) when a correction or interest
    /// rate drives an amount past the `Decimal` range.
    pub fn run(&self) -> SimulationResult<SimulationOutcome> {
        let boundaries = self.config.boundaries;
        let input = &self.config.config;
        let mut schedule = InstallmentSchedule::build(self.config);

        let mut advisories: Vec<Advisory> = extras_outside_window(input)
            .into_iter()
            .map(|month| Advisory::ExtraOutsideWindow { month })
            .collect();

        let initial_balance = self.config.initial_balance();
        let mut balance = initial_balance;
        let mut summary = SimulationSummary {
            initial_balance,
            ..SimulationSummary::default()
        };
        let mut rows = Vec::with_capacity(boundaries.total_months() as usize);
        let mut post_handover_month = 0u32;

        info!(
            months = boundaries.total_months(),
            grace = boundaries.grace_months,
            %initial_balance,
            mode = ?self.provider.mode(),
            order = ?input.settlement_order,
            "starting builder plan simulation"
        );

        for month in 1..=boundaries.total_months() {
            let phase = boundaries.phase_of(month);
            let opening_balance = balance;
            let resolved = self.provider.resolve(month, phase);

            let out_of_range = || overflow(rate_field(resolved.kind), month);
            let correction_on = |base: Money| {
                base.max(Decimal::ZERO)
                    .checked_mul(resolved.rate)
                    .ok_or_else(out_of_range)
            };

            let (settled, correction) = match input.settlement_order {
                SettlementOrder::SettleThenCorrect => {
                    let settled = settle(&mut schedule, month);
                    balance -= settled.face + settled.correction;
                    let correction = correction_on(balance)?;
                    balance = balance.checked_add(correction).ok_or_else(out_of_range)?;
                    summary.absorbed_correction += correction - schedule.distribute(correction);
                    (settled, correction)
                }
                SettlementOrder::CorrectThenSettle => {
                    let correction = correction_on(balance)?;
                    balance = balance.checked_add(correction).ok_or_else(out_of_range)?;
                    summary.absorbed_correction += correction - schedule.distribute(correction);
                    let settled = settle(&mut schedule, month);
                    balance -= settled.face + settled.correction;
                    (settled, correction)
                }
            };

            let interest = if phase == SimulationPhase::PostHandover {
                post_handover_month += 1;
                match input.interest {
                    InterestPolicy::None => Decimal::ZERO,
                    InterestPolicy::FixedOnBalance { monthly_rate } => opening_balance
                        .max(Decimal::ZERO)
                        .checked_mul(monthly_rate)
                        .ok_or_else(|| overflow("interest.monthly_rate", month))?,
                    InterestPolicy::Progressive => (Decimal::from(post_handover_month)
                        / Decimal::ONE_HUNDRED)
                        .checked_mul(settled.face + settled.correction)
                        .ok_or_else(|| overflow("interest", month))?,
                }
            } else {
                Decimal::ZERO
            };

            if balance < Decimal::ZERO {
                balance = Decimal::ZERO;
            }

            let total_payment = (settled.face + settled.correction)
                .checked_add(interest)
                .ok_or_else(out_of_range)?;
            summary.total_amortized += settled.face;
            summary.total_correction_paid += settled.correction;
            summary.total_correction_applied = summary
                .total_correction_applied
                .checked_add(correction)
                .ok_or_else(out_of_range)?;
            summary.total_interest = summary
                .total_interest
                .checked_add(interest)
                .ok_or_else(|| overflow("interest", month))?;
            summary.total_paid = summary
                .total_paid
                .checked_add(total_payment)
                .ok_or_else(out_of_range)?;

            debug!(
                month,
                phase = phase.label(),
                rate = %resolved.rate,
                source = resolved.source.label(),
                %balance,
                %total_payment,
                "month simulated"
            );

            rows.push(ResultRow {
                month,
                label: self.config.month_label(month),
                phase,
                balance,
                total_payment,
                base_amortization: settled.face,
                correction_paid: settled.correction,
                interest,
                incc_adjustment: if resolved.kind == IndexKind::Incc { correction } else { Decimal::ZERO },
                ipca_adjustment: if resolved.kind == IndexKind::Ipca { correction } else { Decimal::ZERO },
                correction_rate: resolved.rate,
                rate_source: resolved.source,
            });

            if month == boundaries.handover_month() && boundaries.pre_handover_months > 0 {
                let paid = self.config.lump_sum_down_payment() + summary.total_amortized;
                let required = input.minimum_payoff_fraction * input.total_price;
                if paid < required {
                    warn!(month, %paid, %required, "minimum payoff not reached before handover");
                    advisories.push(Advisory::MinimumPayoffNotReached {
                        month,
                        paid,
                        required,
                    });
                }
            }
        }

        summary.final_balance = balance;
        summary.pending_correction = schedule.pending_correction();

        info!(
            final_balance = %summary.final_balance,
            total_paid = %summary.total_paid,
            correction = %summary.total_correction_applied,
            "builder plan simulation finished"
        );

        Ok(SimulationOutcome {
            rows,
            advisories,
            summary,
        })
    }
}

fn rate_field(kind: IndexKind) -> &'static str {
    match kind {
        IndexKind::Incc => "avg_construction_index",
        IndexKind::Ipca => "avg_price_index",
        IndexKind::Tr => "index",
    }
}

fn settle(schedule: &mut InstallmentSchedule, month: u32) -> Settlement {
    schedule
        .take_due(month)
        .iter()
        .fold(Settlement::default(), |acc, installment| Settlement {
            face: acc.face + installment.face_value,
            correction: acc.correction + installment.accumulated_correction,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use crate::test_fixtures::{example_config, small_config};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const TOLERANCE: Decimal = dec!(0.000001);

    fn close(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn test_example_first_month_settles_then_corrects() {
        let outcome = simulate(&example_config()).unwrap();
        let first = &outcome.rows[0];

        let expected = (dec!(433479.46) - dec!(3983.38)) * (Decimal::ONE + dec!(0.005446));
        assert!(close(first.balance, expected), "{} != {}", first.balance, expected);
        assert_eq!(first.base_amortization, dec!(3983.38));
        assert_eq!(first.correction_paid, dec!(0));
        assert_eq!(first.total_payment, dec!(3983.38));
        assert_eq!(first.phase, SimulationPhase::PreHandover);
        assert_eq!(first.label.label(), "01/2025");
        assert_eq!(first.ipca_adjustment, dec!(0));
        assert!(first.incc_adjustment > dec!(0));
    }

    #[test]
    fn test_example_first_month_corrects_then_settles() {
        let mut config = example_config();
        config.settlement_order = SettlementOrder::CorrectThenSettle;
        let outcome = simulate(&config).unwrap();
        let first = &outcome.rows[0];

        let opening = dec!(455750.00) - dec!(22270.54);
        let correction = opening * dec!(0.005446);
        let diluted = correction * dec!(3983.38) / dec!(433479.46);
        let expected = opening + correction - (dec!(3983.38) + diluted);

        assert!(close(first.correction_paid, diluted));
        assert_eq!(first.balance.round_dp(2), expected.round_dp(2));
        assert!(close(first.total_payment, dec!(3983.38) + diluted));
    }

    #[test]
    fn test_example_extras_and_phases() {
        let outcome = simulate(&example_config()).unwrap();

        assert_eq!(outcome.rows.len(), 117);
        assert_eq!(outcome.rows[5].base_amortization, dec!(9983.38));
        assert_eq!(outcome.rows[11].base_amortization, dec!(9983.38));
        assert_eq!(outcome.rows[16].base_amortization, dec!(47283.38));
        assert_eq!(outcome.rows[16].phase, SimulationPhase::PreHandover);
        assert_eq!(outcome.rows[17].phase, SimulationPhase::PostHandover);
        assert_eq!(outcome.rows[17].incc_adjustment, dec!(0));
        assert!(outcome.rows[17].ipca_adjustment > dec!(0));
        assert_eq!(outcome.rows[17].correction_rate, dec!(0.004669));
        assert!(outcome.rows[5].correction_paid > dec!(0));
        assert!(outcome.advisories.is_empty());
    }

    #[test]
    fn test_balance_never_negative() {
        let mut config = example_config();
        config.post_handover_installment = dec!(6000);
        let outcome = simulate(&config).unwrap();

        assert!(outcome.rows.iter().all(|row| row.balance >= dec!(0)));
        assert_eq!(outcome.summary.final_balance, dec!(0));
    }

    #[test]
    fn test_money_is_conserved() {
        for order in [SettlementOrder::SettleThenCorrect, SettlementOrder::CorrectThenSettle] {
            let mut config = example_config();
            config.settlement_order = order;
            config.correction_cutoff_month = Some(60);
            let outcome = simulate(&config).unwrap();
            let summary = &outcome.summary;

            let settled: Decimal = outcome
                .rows
                .iter()
                .map(|row| row.base_amortization + row.correction_paid)
                .sum();
            assert!(close(
                settled,
                summary.initial_balance - summary.final_balance + summary.total_correction_applied
            ));
            assert!(close(
                summary.total_correction_applied,
                summary.total_correction_paid + summary.pending_correction + summary.absorbed_correction
            ));
            // the plan's face values add up to the financed balance, so
            // whatever is left can only be correction with nowhere to go
            assert!(close(summary.final_balance, summary.absorbed_correction));
            assert_eq!(summary.total_amortized, dec!(433479.46));
            assert_eq!(summary.pending_correction, dec!(0));
        }
    }

    #[test]
    fn test_correction_on_unfinanced_remainder_is_absorbed() {
        let mut config = small_config();
        config.post_handover_months = 4;
        let outcome = simulate(&config).unwrap();
        let summary = &outcome.summary;

        assert!(summary.final_balance > dec!(14200));
        assert!(summary.absorbed_correction > dec!(0));
        assert!(close(
            summary.final_balance,
            dec!(14200) + summary.absorbed_correction
        ));
    }

    #[test]
    fn test_runs_are_idempotent() {
        let config = example_config();
        let first = simulate(&config).unwrap();
        let second = simulate(&config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_grace_months_accrue_without_payments() {
        let outcome = simulate(&small_config()).unwrap();

        for row in &outcome.rows[..2] {
            assert_eq!(row.phase, SimulationPhase::Grace);
            assert_eq!(row.total_payment, dec!(0));
            assert!(row.incc_adjustment > dec!(0));
        }
        assert_eq!(outcome.rows[1].balance, dec!(100000) * dec!(1.005) * dec!(1.005));
        assert_eq!(outcome.rows[2].phase, SimulationPhase::DownPayment);
        assert_eq!(outcome.rows[2].base_amortization, dec!(3000));
        assert!(outcome.rows[2].correction_paid > dec!(0));
        assert_eq!(outcome.rows[0].label.label(), "01/2025");
        assert_eq!(outcome.rows[2].label.label(), "03/2025");
    }

    #[test]
    fn test_minimum_payoff_advisory() {
        let mut config = example_config();
        config.minimum_payoff_fraction = dec!(0.40);
        let outcome = simulate(&config).unwrap();

        assert_eq!(outcome.rows.len(), 117);
        assert_eq!(
            outcome.advisories,
            vec![Advisory::MinimumPayoffNotReached {
                month: 17,
                paid: dec!(145288.00),
                required: dec!(182300.000),
            }]
        );
    }

    #[test]
    fn test_extra_outside_window_is_reported() {
        let mut config = small_config();
        config.extra_annual.insert(12, dec!(5000));
        config.minimum_payoff_fraction = dec!(0.20);
        let outcome = simulate(&config).unwrap();
        assert_eq!(outcome.advisories, vec![Advisory::ExtraOutsideWindow { month: 12 }]);
    }

    #[test]
    fn test_fixed_interest_on_opening_balance() {
        let mut config = example_config();
        config.interest = InterestPolicy::FixedOnBalance {
            monthly_rate: dec!(0.01),
        };
        let outcome = simulate(&config).unwrap();

        assert!(outcome.rows[..17].iter().all(|row| row.interest.is_zero()));
        let handover = &outcome.rows[16];
        let first_post = &outcome.rows[17];
        assert_eq!(first_post.interest, handover.balance * dec!(0.01));
        assert_eq!(
            first_post.total_payment,
            first_post.base_amortization + first_post.correction_paid + first_post.interest
        );
    }

    #[test]
    fn test_progressive_interest_counts_post_handover_months() {
        let mut config = example_config();
        config.interest = InterestPolicy::Progressive;
        let outcome = simulate(&config).unwrap();

        let first_post = &outcome.rows[17];
        let second_post = &outcome.rows[18];
        assert_eq!(
            first_post.interest,
            dec!(0.01) * (first_post.base_amortization + first_post.correction_paid)
        );
        assert_eq!(
            second_post.interest,
            dec!(0.02) * (second_post.base_amortization + second_post.correction_paid)
        );
    }

    #[test]
    fn test_cutoff_stops_correction() {
        let mut config = example_config();
        config.correction_cutoff_month = Some(20);
        let outcome = simulate(&config).unwrap();

        assert!(outcome.rows[19].ipca_adjustment > dec!(0));
        for row in &outcome.rows[20..] {
            assert_eq!(row.incc_adjustment + row.ipca_adjustment, dec!(0));
            assert_eq!(row.rate_source, RateSource::CutOff);
        }
    }

    #[test]
    fn test_real_index_values_drive_correction() {
        let mut table = IndexTable::new();
        table.insert(1, IndexKind::Incc, dec!(0.01));
        table.insert(18, IndexKind::Ipca, dec!(0.02));
        let outcome =
            simulate_with_index(&example_config(), CorrectionMode::RealWithFallback, &table).unwrap();

        assert_eq!(outcome.rows[0].correction_rate, dec!(0.01));
        assert_eq!(outcome.rows[0].rate_source, RateSource::Real);
        assert_eq!(outcome.rows[1].correction_rate, dec!(0.005446));
        assert_eq!(outcome.rows[1].rate_source, RateSource::AverageFallback);
        assert_eq!(outcome.rows[17].correction_rate, dec!(0.02));
    }

    #[test]
    fn test_without_pre_handover_phase() {
        let mut config = small_config();
        config.pre_handover_months = 0;
        config.minimum_payoff_fraction = dec!(1);
        let outcome = simulate(&config).unwrap();

        assert!(outcome.rows.iter().all(|row| row.phase != SimulationPhase::PreHandover));
        assert_eq!(outcome.rows[5].phase, SimulationPhase::PostHandover);
        assert!(outcome.advisories.is_empty());
    }

    #[test]
    fn test_runaway_average_is_an_error() {
        let mut config = example_config();
        config.avg_construction_index = dec!(50);
        match simulate(&config) {
            Err(SimulationError::InvalidInput { field, reason }) => {
                assert_eq!(field, "avg_construction_index");
                assert!(reason.contains("decimal range"), "{reason}");
            }
            other => panic!("expected an overflow error, got {other:?}"),
        }
    }

    #[test]
    fn test_runaway_real_value_is_an_error() {
        let mut table = IndexTable::new();
        table.insert(18, IndexKind::Ipca, dec!(100000000000000000000000000));
        let result =
            simulate_with_index(&example_config(), CorrectionMode::RealWithFallback, &table);
        assert!(matches!(
            result,
            Err(SimulationError::InvalidInput { ref field, .. }) if field == "avg_price_index"
        ));
    }

    #[test]
    fn test_invalid_dates_yield_no_table() {
        let mut config = example_config();
        config.first_installment_month = "02/2024".into();
        assert!(matches!(
            simulate(&config),
            Err(SimulationError::FirstInstallmentBeforeSigning { .. })
        ));
    }
}
