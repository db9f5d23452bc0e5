//! Financing math: annuity loan payments, IRR and the ROI family.

use crate::error::{Result, SimError};

/// Annual debt service for a fully amortizing monthly-payment loan.
/// `annual_rate` is a fraction (0.02 for 2%).
pub fn loan_payment_per_year(loan: f64, term_years: u32, annual_rate: f64) -> Result<f64> {
    if annual_rate <= 0.0 {
        return Err(SimError::Financing(
            "loan interest rate must be positive".to_string(),
        ));
    }
    let monthly_rate = annual_rate / 12.0;
    let months = (term_years * 12) as f64;
    let factor = (1.0 + monthly_rate).powf(months);
    let pmt = factor * monthly_rate / (factor - 1.0);
    Ok(loan * pmt * 12.0)
}

/// Internal rate of return over a cash-flow series starting at Year 0.
/// `None` when the series has no sign change or the solver diverges.
pub fn irr(cash_flows: &[f64]) -> Option<f64> {
    let positive = cash_flows.iter().any(|&c| c > 0.0);
    let negative = cash_flows.iter().any(|&c| c < 0.0);
    if !positive || !negative {
        return None;
    }
    match financial::irr(cash_flows, Some(0.)) {
        Ok(rate) if rate.is_finite() => Some(rate),
        _ => None,
    }
}

/// Project-level return figures derived from the net-cash row.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ReturnFigures {
    #[serde(rename = "ROI")]
    pub roi: f64,
    #[serde(rename = "IRR")]
    pub irr: Option<f64>,
    /// Geometric per-year ROI; undefined once the equity is fully
    /// lost.
    #[serde(rename = "Annual_ROI")]
    pub annual_roi: Option<f64>,
    #[serde(rename = "Average_ROI")]
    pub average_roi: f64,
}

/// ROI over the equity stake plus its annualized forms. `net_cash`
/// holds Year 0..N inclusive; Year 0 is the negative equity outlay.
pub fn return_figures(net_cash: &[f64], equity: f64, years: u32) -> ReturnFigures {
    let operating_sum: f64 = net_cash.iter().skip(1).sum();
    let roi = (operating_sum - equity) / equity;
    let annual_roi = if roi > -1.0 {
        Some((1.0 + roi).powf(1.0 / years as f64) - 1.0)
    } else {
        None
    };
    ReturnFigures {
        roi,
        irr: irr(net_cash),
        annual_roi,
        average_roi: roi / years as f64,
    }
}
