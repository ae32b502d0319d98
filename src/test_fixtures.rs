use std::collections::BTreeMap;

use rust_decimal_macros::dec;

use crate::config::{DownPaymentMode, InterestPolicy, SettlementOrder, SimulationConfig};

/// 455,750.00 unit, lump-sum down payment, 17 pre-handover and 100
/// post-handover months, no grace period.
pub(crate) fn example_config() -> SimulationConfig {
    SimulationConfig {
        signing_month: "01/2025".into(),
        first_installment_month: "01/2025".into(),
        total_price: dec!(455750.00),
        down_payment_total: dec!(22270.54),
        down_payment_mode: DownPaymentMode::LumpSum,
        down_payment_tranche_count: 1,
        pre_handover_months: 17,
        pre_handover_installment: dec!(3983.38),
        post_handover_months: 100,
        post_handover_installment: dec!(3104.62),
        extra_semiannual: BTreeMap::from([(6, dec!(6000.00)), (12, dec!(6000.00))]),
        extra_annual: BTreeMap::from([(17, dec!(43300.00))]),
        avg_construction_index: dec!(0.005446),
        avg_price_index: dec!(0.004669),
        correction_start_month: 1,
        correction_cutoff_month: None,
        minimum_payoff_fraction: dec!(0.30),
        interest: InterestPolicy::None,
        settlement_order: SettlementOrder::SettleThenCorrect,
        index_lag_months: 0,
    }
}

/// Small plan: 2 grace months, 3 down-payment tranches, 4 pre-handover and
/// 5 post-handover months whose face values add up to the price.
pub(crate) fn small_config() -> SimulationConfig {
    SimulationConfig {
        signing_month: "01/2025".into(),
        first_installment_month: "03/2025".into(),
        total_price: dec!(100000),
        down_payment_total: dec!(9000),
        down_payment_mode: DownPaymentMode::Installments,
        down_payment_tranche_count: 3,
        pre_handover_months: 4,
        pre_handover_installment: dec!(5000),
        post_handover_months: 5,
        post_handover_installment: dec!(14200),
        extra_semiannual: BTreeMap::new(),
        extra_annual: BTreeMap::new(),
        avg_construction_index: dec!(0.005),
        avg_price_index: dec!(0.004),
        correction_start_month: 1,
        correction_cutoff_month: None,
        minimum_payoff_fraction: dec!(0.30),
        interest: InterestPolicy::None,
        settlement_order: SettlementOrder::SettleThenCorrect,
        index_lag_months: 0,
    }
}
