//! Custo Efetivo Total: the annualized internal rate of return of a
//! financing cash flow.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::warn;

use crate::{Money, Rate};

const TOLERANCE: f64 = 1e-12;
const MAX_ITERATIONS: u32 = 200;
// Monthly rates outside this range are not plausible for a loan, and keep
// (1 + r)^t finite over several hundred months.
const MIN_RATE: f64 = -0.5;
const MAX_RATE: f64 = 1.0;

/// Net present value of `cash_flows` (period 0 first) and its derivative.
fn npv_and_derivative(cash_flows: &[f64], rate: f64) -> (f64, f64) {
    let mut npv = 0.0;
    let mut dnpv = 0.0;
    for (t, cf) in cash_flows.iter().enumerate() {
        let discount = (1.0 + rate).powi(t as i32);
        npv += cf / discount;
        if t > 0 {
            dnpv -= t as f64 * cf / (discount * (1.0 + rate));
        }
    }
    (npv, dnpv)
}

/// Periodic internal rate of return, Newton-Raphson first and bisection
/// when Newton stalls. `None` when the flows never change sign or no root
/// lies in the plausible range.
pub fn monthly_irr(cash_flows: &[f64]) -> Option<f64> {
    let has_positive = cash_flows.iter().any(|cf| *cf > 0.0);
    let has_negative = cash_flows.iter().any(|cf| *cf < 0.0);
    if !has_positive || !has_negative {
        return None;
    }

    let mut rate = 0.01;
    for _ in 0..MAX_ITERATIONS {
        let (npv, dnpv) = npv_and_derivative(cash_flows, rate);
        if dnpv.abs() < 1e-20 || !npv.is_finite() {
            break;
        }
        let next = (rate - npv / dnpv).clamp(MIN_RATE, MAX_RATE);
        if (next - rate).abs() < TOLERANCE {
            return Some(next);
        }
        rate = next;
    }

    irr_bisection(cash_flows)
}

fn irr_bisection(cash_flows: &[f64]) -> Option<f64> {
    let npv_at = |rate: f64| npv_and_derivative(cash_flows, rate).0;
    let (mut low, mut high) = (MIN_RATE, MAX_RATE);
    let mut npv_low = npv_at(low);
    if npv_low * npv_at(high) > 0.0 {
        return None;
    }
    for _ in 0..MAX_ITERATIONS {
        let mid = (low + high) / 2.0;
        let npv_mid = npv_at(mid);
        if npv_mid.abs() < TOLERANCE || (high - low) / 2.0 < TOLERANCE {
            return Some(mid);
        }
        if npv_mid * npv_low < 0.0 {
            high = mid;
        } else {
            low = mid;
            npv_low = npv_mid;
        }
    }
    None
}

/// Effective annual cost of borrowing `principal` and repaying `payments`
/// monthly: the IRR of `[+principal, -payment_1, -payment_2, ...]`
/// annualized as `(1 + irr)^12 - 1`.
///
/// Returns zero for degenerate inputs (non-positive principal, no positive
/// payment) and when no rate can be found.
pub fn effective_annual_cost(principal: Money, payments: &[Money]) -> Rate {
    if principal <= Decimal::ZERO || !payments.iter().any(|p| *p > Decimal::ZERO) {
        return Decimal::ZERO;
    }

    let cash_flows: Vec<f64> = std::iter::once(principal)
        .chain(payments.iter().map(|p| -*p))
        .map(|cf| cf.to_f64().unwrap_or_default())
        .collect();

    match monthly_irr(&cash_flows) {
        Some(monthly) => {
            let annual = (1.0 + monthly).powi(12) - 1.0;
            Decimal::from_f64(annual).unwrap_or_default().round_dp(10)
        }
        None => {
            warn!(%principal, months = payments.len(), "no internal rate of return found");
            Decimal::ZERO
        }
    }
}
