//! `br_financing_sim` is a Rust library for simulating real estate financing in Brazil.
//!
//! It covers the two ways a property bought off-plan is usually paid for:
//! - **Builder plan (construtora)**: down payment, monthly pre-handover
//!   installments with semiannual and annual extras, and post-handover
//!   installments. The outstanding balance is corrected monthly by INCC
//!   before the keys are handed over and by IPCA afterwards, and the
//!   correction is diluted over the installments still to be paid.
//! - **Bank loan**: **SAC** (constant amortization) or **Price** (level
//!   payment) tables, optionally preceded by a construction phase in which
//!   only interest on the released amount is paid, with TR/IPCA indexation,
//!   insurance and administrative fees.
//!
//! Scenarios (average indices only, real indices with averages as fallback,
//! real indices only, or a user cutoff month) are compared side by side with
//! their effective annual cost (CET).
//!
//! ## Usage
//!
//! Add `br_financing_sim` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! br_financing_sim = "0.5.0"
//! rust_decimal = "1.39.0"
//! rust_decimal_macros = "1.39.0"
//! ```
//!
//! Then describe the plan and run the simulation:
//!
//! ```rust
//! use br_financing_sim::{
//!     CorrectionScenario, FinancingStructure, IndexTable, SimulationConfig, compare_scenarios,
//!     format_brl, simulate,
//! };
//!
//! fn main() {
//!     let config = SimulationConfig::from_json(
//!         r#"{
//!             "signing_month": "01/2025",
//!             "first_installment_month": "01/2025",
//!             "total_price": "100000",
//!             "down_payment_total": "10000",
//!             "pre_handover_months": 10,
//!             "pre_handover_installment": "3000",
//!             "post_handover_months": 20,
//!             "post_handover_installment": "3000",
//!             "avg_construction_index": "0.005",
//!             "avg_price_index": "0.004"
//!         }"#,
//!     )
//!     .unwrap();
//!
//!     match simulate(&config) {
//!         Ok(outcome) => {
//!             assert_eq!(outcome.rows.len(), 30);
//!             println!("Total paid:    {}", format_brl(outcome.summary.total_paid));
//!             println!("Final balance: {}", format_brl(outcome.summary.final_balance));
//!             for advisory in &outcome.advisories {
//!                 println!("{advisory}");
//!             }
//!         }
//!         Err(e) => {
//!             eprintln!("Error simulating the plan: {}", e);
//!         }
//!     }
//!
//!     let results = compare_scenarios(
//!         &config,
//!         &IndexTable::new(),
//!         &FinancingStructure::BuilderOnly,
//!         &CorrectionScenario::standard_set(Some(6)),
//!     )
//!     .unwrap();
//!     for result in &results {
//!         println!("{:<16} CET {:.4}", result.label, result.cet_annual);
//!     }
//! }
//! ```

use rust_decimal::Decimal;

pub mod bank;
pub mod calendar;
pub mod cet;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod format;
pub mod index;
pub mod scenario;
pub mod schedule;
pub mod series;

#[cfg(test)]
mod test_fixtures;

/// Amount of money in reais.
pub type Money = Decimal;
/// Rate as a fraction (`0.005` is 0.5%).
pub type Rate = Decimal;

pub use bank::{
    AmortizationSystem, BankIndex, BankLoanConfig, BankOutcome, BankRow, ConstructionCurve,
    ConstructionPhase, Milestone, SystemComparison, compare_systems, normalize_annual_interest_rate,
    run_bank_loan,
};
pub use calendar::MonthYear;
pub use cet::effective_annual_cost;
pub use config::{
    DownPaymentMode, InterestPolicy, SettlementOrder, SimulationConfig, SimulationPhase,
    ValidatedConfig,
};
pub use engine::{
    Advisory, AmortizationEngine, ResultRow, SimulationOutcome, SimulationSummary, simulate,
    simulate_with_index,
};
pub use error::{SimulationError, SimulationResult};
pub use export::write_comparison_xlsx;
pub use format::format_brl;
pub use index::{CorrectionIndexProvider, CorrectionMode, IndexKind, IndexTable, RateSource};
pub use scenario::{
    CorrectionScenario, FinancingStructure, ScenarioResult, compare_scenarios, run_scenario,
};
pub use schedule::{Installment, InstallmentSchedule};
pub use series::{SeriesSource, load_index_table};
