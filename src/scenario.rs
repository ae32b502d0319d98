//! Side-by-side comparison of correction scenarios and financing structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bank::{BankLoanConfig, BankOutcome, ConstructionPhase, run_bank_loan};
use crate::cet::effective_annual_cost;
use crate::config::SimulationConfig;
use crate::engine::{AmortizationEngine, SimulationOutcome};
use crate::error::{SimulationResult, overflow};
use crate::index::{CorrectionIndexProvider, CorrectionMode, IndexTable};
use crate::{Money, Rate};

/// How real index data and averages are combined in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CorrectionScenario {
    /// Configured averages only.
    PureAverage,
    /// Real values while they exist, averages afterwards.
    Hybrid,
    /// Real values only, no correction past the configured cutoff or, when
    /// none is configured, past the last month with real data.
    RealOnly,
    /// Real values with average fallback, no correction past `month`.
    UserCutoff { month: u32 },
}

impl CorrectionScenario {
    pub fn label(&self) -> String {
        match self {
            CorrectionScenario::PureAverage => "Médias".into(),
            CorrectionScenario::Hybrid => "Real + médias".into(),
            CorrectionScenario::RealOnly => "Somente real".into(),
            CorrectionScenario::UserCutoff { month } => format!("Corte no mês {month}"),
        }
    }

    /// The standard comparison set, with the user cutoff when one is chosen.
    pub fn standard_set(user_cutoff: Option<u32>) -> Vec<CorrectionScenario> {
        let mut scenarios = vec![
            CorrectionScenario::PureAverage,
            CorrectionScenario::Hybrid,
            CorrectionScenario::RealOnly,
        ];
        if let Some(month) = user_cutoff {
            scenarios.push(CorrectionScenario::UserCutoff { month });
        }
        scenarios
    }
}

/// Who finances what.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "bank", rename_all = "snake_case")]
pub enum FinancingStructure {
    /// The builder plan alone.
    #[default]
    BuilderOnly,
    /// Builder plan up to handover, then a bank loan for the balance left.
    Sequential(BankLoanConfig),
    /// Builder plan and bank construction interest paid together until
    /// handover, bank amortization afterwards.
    Associative(BankLoanConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: CorrectionScenario,
    pub label: String,
    pub builder: SimulationOutcome,
    pub bank: Option<BankOutcome>,
    /// Everything paid each month, builder and bank together.
    pub monthly_payments: Vec<Money>,
    pub principal_released: Money,
    pub total_paid: Money,
    /// Effective annual cost (CET) of the whole cash flow.
    pub cet_annual: Rate,
}

/// Runs every scenario in `scenarios` under `structure`.
///
/// # Errors
///
/// Stops at the first scenario that fails, with that scenario's error (see
/// [`run_scenario`]).
pub fn compare_scenarios(
    config: &SimulationConfig,
    index: &IndexTable,
    structure: &FinancingStructure,
    scenarios: &[CorrectionScenario],
) -> SimulationResult<Vec<ScenarioResult>> {
    scenarios
        .iter()
        .map(|scenario| run_scenario(config, index, structure, *scenario))
        .collect()
}

/// Runs one correction scenario under a financing structure.
///
/// # Arguments
///
/// * `config` - The builder plan.
/// * `index` - Real or manual index values, months in global numbering.
/// * `structure` - Whether and how a bank loan joins the builder plan.
/// * `scenario` - How real values and averages are combined.
///
/// # Errors
///
/// Returns an error if the builder plan or the bank loan does not validate,
/// or if an amount leaves the `Decimal` range.
pub fn run_scenario(
    config: &SimulationConfig,
    index: &IndexTable,
    structure: &FinancingStructure,
    scenario: CorrectionScenario,
) -> SimulationResult<ScenarioResult> {
    let builder_config = match structure {
        FinancingStructure::Sequential(_) => SimulationConfig {
            post_handover_months: 0,
            post_handover_installment: Decimal::ZERO,
            ..config.clone()
        },
        FinancingStructure::BuilderOnly | FinancingStructure::Associative(_) => config.clone(),
    };
    let validated = builder_config.validate()?;

    let provider = match scenario {
        CorrectionScenario::PureAverage => {
            CorrectionIndexProvider::new(&validated, CorrectionMode::AverageOnly, index)
        }
        CorrectionScenario::Hybrid => {
            CorrectionIndexProvider::new(&validated, CorrectionMode::RealWithFallback, index)
        }
        CorrectionScenario::RealOnly => {
            let provider =
                CorrectionIndexProvider::new(&validated, CorrectionMode::RealOnlyWithCutoff, index);
            match (config.correction_cutoff_month, provider.last_real_local_month()) {
                (None, Some(last)) => provider.with_cutoff(Some(last)),
                _ => provider,
            }
        }
        CorrectionScenario::UserCutoff { month } => {
            CorrectionIndexProvider::new(&validated, CorrectionMode::RealWithFallback, index)
                .with_cutoff(Some(month))
        }
    };

    let builder = AmortizationEngine::new(&validated, provider).run()?;
    let last_month = validated.boundaries.total_months();
    let builder_principal = validated.initial_balance();

    let (bank, monthly_payments, principal_released) = match structure {
        FinancingStructure::BuilderOnly => (None, builder.payments(), builder_principal),
        FinancingStructure::Sequential(bank) => {
            let loan = BankLoanConfig {
                total_amount: builder.summary.final_balance,
                construction: None,
                ..bank.clone()
            };
            let outcome = run_bank_loan(&loan, index, validated.boundaries.total_months())?;
            let mut payments = builder.payments();
            payments.extend(outcome.payments());
            (Some(outcome), payments, builder_principal)
        }
        FinancingStructure::Associative(bank) => {
            let handover = validated.boundaries.handover_month();
            let loan = BankLoanConfig {
                construction: (handover > 0).then(|| ConstructionPhase {
                    months: handover,
                    curve: bank
                        .construction
                        .as_ref()
                        .map(|phase| phase.curve.clone())
                        .unwrap_or_default(),
                }),
                ..bank.clone()
            };
            let outcome = run_bank_loan(&loan, index, 0)?;
            let payments = add_by_month(&builder.payments(), &outcome.payments())
                .ok_or_else(|| overflow("total_amount", last_month))?;
            let principal = builder_principal
                .checked_add(bank.total_amount)
                .ok_or_else(|| overflow("total_amount", 1))?;
            (Some(outcome), payments, principal)
        }
    };

    let total_paid = monthly_payments
        .iter()
        .try_fold(Decimal::ZERO, |acc, payment| acc.checked_add(*payment))
        .ok_or_else(|| overflow("total_amount", last_month))?;
    let cet_annual = effective_annual_cost(principal_released, &monthly_payments);

    info!(
        scenario = %scenario.label(),
        %total_paid,
        %cet_annual,
        "scenario simulated"
    );

    Ok(ScenarioResult {
        scenario,
        label: scenario.label(),
        builder,
        bank,
        monthly_payments,
        principal_released,
        total_paid,
        cet_annual,
    })
}

fn add_by_month(a: &[Money], b: &[Money]) -> Option<Vec<Money>> {
    (0..a.len().max(b.len()))
        .map(|i| {
            a.get(i)
                .copied()
                .unwrap_or_default()
                .checked_add(b.get(i).copied().unwrap_or_default())
        })
        .collect()
}
