//! Utility-bill calculations: annual basic and flow fees, over-contract
//! penalties, and the multi-year penalty schedule.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::arbitrage::{calculate_transferable_energy, full_day_window, DispatchSample};
use crate::error::Result;
use crate::models::{round_to, ContractCapacity, Season, TouTag, WeekdayClass};
use crate::tariff::{
    contract_tiers, is_simple, plan_rates, representative_day_count, secondary_unit_price,
};

/// Annual basic fee for a plan and contract set. Simple-metered plans
/// bill a flat per-customer charge; everything else bills per kW with
/// the saturday/off-peak discount.
pub fn annual_basic_fee(
    plan: &str,
    contract: &ContractCapacity,
    month_split: Option<(f64, f64)>,
) -> Result<f64> {
    if is_simple(plan) {
        let fees = &plan_rates(plan, Season::Summer)?.fees;
        return Ok(round_to(fees.per_customer * 12.0, 2));
    }

    let (summer_months, not_summer_months) = match month_split {
        Some(split) => split,
        None => {
            let s = crate::tariff::summer_months(plan);
            (s, 12.0 - s)
        }
    };

    let monthly = |season: Season| -> Result<f64> {
        let fees = &plan_rates(plan, season)?.fees;
        let secondary = secondary_unit_price(plan, fees);
        let discount_base = (contract.saturday_kw + contract.off_peak_kw)
            - (contract.regular_kw + contract.secondary_kw) * 0.5;
        let discount_fee = discount_base.max(0.0) * fees.saturday.max(fees.off_peak);
        Ok(contract.regular_kw * fees.regular
            + contract.secondary_kw * secondary
            + discount_fee)
    };

    let total = monthly(Season::Summer)? * summer_months
        + monthly(Season::NotSummer)? * not_summer_months;
    Ok(round_to(total, 2))
}

/// Monthly and annualized over-contract penalties per season.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OverCapacityPenalties {
    pub summer_monthly_fee: f64,
    pub summer_annual_penalty: f64,
    pub not_summer_monthly_fee: f64,
    pub not_summer_annual_penalty: f64,
}

/// Worst-month over-contract penalty per season. The season's peak
/// overshoot is allocated to tiers in priority order, with the portion
/// already absorbed by a higher tier deducted before billing the next.
/// The first 10% of each tier's capacity bills at twice the unit price
/// and the remainder at three times.
pub fn over_capacity_penalties(
    samples: &[DispatchSample],
    plan: &str,
    contract: &ContractCapacity,
) -> Result<OverCapacityPenalties> {
    let mut max_over: BTreeMap<(Season, TouTag), f64> = BTreeMap::new();
    for s in samples {
        let entry = max_over.entry((s.season, s.tou_tag)).or_insert(0.0);
        if s.over_kw > *entry {
            *entry = s.over_kw;
        }
    }

    let mut penalties = OverCapacityPenalties::default();
    for season in [Season::Summer, Season::NotSummer] {
        let tiers = contract_tiers(plan, season, contract)?;
        let mut ordered: Vec<_> = tiers
            .iter()
            .filter(|t| max_over.contains_key(&(season, t.tag)))
            .collect();
        ordered.sort_by_key(|t| t.tag.priority());

        let mut used_kw = 0.0;
        let mut monthly_fee = 0.0;
        for tier in ordered {
            let over = max_over[&(season, tier.tag)];
            let adjusted = (over - used_kw).max(0.0);
            used_kw += adjusted;

            let threshold = 0.10 * tier.capacity_kw;
            let within = adjusted.min(threshold).max(0.0);
            let above = (adjusted - threshold).max(0.0);
            monthly_fee += 2.0 * tier.unit_price * within + 3.0 * tier.unit_price * above;
        }

        let months = match season {
            Season::Summer => crate::tariff::summer_months(plan),
            Season::NotSummer => 12.0 - crate::tariff::summer_months(plan),
        };
        match season {
            Season::Summer => {
                penalties.summer_monthly_fee = monthly_fee;
                penalties.summer_annual_penalty = monthly_fee * months;
            }
            Season::NotSummer => {
                penalties.not_summer_monthly_fee = monthly_fee;
                penalties.not_summer_annual_penalty = monthly_fee * months;
            }
        }
    }
    Ok(penalties)
}

/// Per-year penalty schedule. A year escapes a season's penalty only
/// when its loss-adjusted usable energy covers that season's worst
/// overshoot.
pub fn annual_capacity_penalties(
    usable_kwh_by_year: &[f64],
    max_summer_over_kwh: f64,
    max_not_summer_over_kwh: f64,
    penalties: &OverCapacityPenalties,
    rtt_loss_rate: f64,
) -> Vec<f64> {
    usable_kwh_by_year
        .iter()
        .map(|&usable| {
            let effective = usable * (1.0 - rtt_loss_rate).sqrt();
            let mut penalty = 0.0;
            if effective < max_summer_over_kwh {
                penalty += penalties.summer_annual_penalty;
            }
            if effective < max_not_summer_over_kwh {
                penalty += penalties.not_summer_annual_penalty;
            }
            penalty
        })
        .collect()
}

/// Annual electricity bill before storage, plus the basic-fee saving
/// from lowering the contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnnualCostSummary {
    #[serde(rename = "年用電度數(度)")]
    pub annual_kwh: f64,
    #[serde(rename = "年基本電費(元)")]
    pub basic_fee: f64,
    #[serde(rename = "年流動電費(元)")]
    pub flow_fee: f64,
    #[serde(rename = "年總電費(元)")]
    pub total_fee: f64,
    #[serde(rename = "年平均電費(元/度)")]
    pub average_fee: f64,
    #[serde(rename = "年節省基本電費_契約調整(元)")]
    pub basic_fee_saving: f64,
    #[serde(rename = "年超約附加費(元)")]
    pub over_capacity_penalty: f64,
    #[serde(rename = "年超約天數(天)")]
    pub over_capacity_days: f64,
}

/// Project the representative week onto a full year of billing. Flow
/// fees fold member weekdays into their class average, then scale by
/// the representative day counts; simple-metered plans add the excess
/// charge above the monthly allowance.
pub fn annual_cost(
    profile: &crate::models::AnnotatedLoadProfile,
    plan: &str,
    contract_old: &ContractCapacity,
    contract_new: &ContractCapacity,
    tariff_adjust_factor: f64,
) -> Result<AnnualCostSummary> {
    // (fee sum, kWh sum) per (season, class).
    let mut groups: BTreeMap<(Season, WeekdayClass), (f64, f64)> = BTreeMap::new();
    for s in profile.iter() {
        let entry = groups.entry((s.season, s.class)).or_insert((0.0, 0.0));
        entry.0 += s.load_kw * s.tou_price;
        entry.1 += s.load_kw;
    }

    let mut flow_fee = 0.0;
    let mut annual_kwh = 0.0;
    for ((season, class), (fee_sum, kwh_sum)) in &groups {
        let members = class.member_days() as f64;
        let days = representative_day_count(plan, *season, *class);
        flow_fee += fee_sum / members / 4.0 * days;
        annual_kwh += kwh_sum / members / 4.0 * days;
    }
    flow_fee = flow_fee.round();
    annual_kwh = annual_kwh.round();

    if is_simple(plan) && annual_kwh > 2000.0 {
        let fees = &plan_rates(plan, Season::Summer)?.fees;
        flow_fee += (annual_kwh - fees.kwh_allowance) * fees.excess_rate;
    }

    let basic_old = annual_basic_fee(plan, contract_old, None)?;
    let basic_new = annual_basic_fee(plan, contract_new, None)?;

    // Over-contract exposure before any storage: annotate the week
    // against the current contract and weight overshooting day types by
    // their representative day counts.
    let (samples, _) =
        calculate_transferable_energy(profile, plan, contract_old, 0.0, full_day_window(), false);
    let penalties = over_capacity_penalties(&samples, plan, contract_old)?;
    let over_capacity_penalty =
        (penalties.summer_annual_penalty + penalties.not_summer_annual_penalty).round();
    let mut over_groups: BTreeMap<(Season, WeekdayClass), bool> = BTreeMap::new();
    for s in &samples {
        if s.over_kw > 0.0 {
            over_groups.insert((s.season, s.class), true);
        }
    }
    let over_capacity_days: f64 = over_groups
        .keys()
        .map(|&(season, class)| representative_day_count(plan, season, class))
        .sum();

    let flow_fee = (flow_fee * tariff_adjust_factor).round();
    let basic_fee = (basic_old * tariff_adjust_factor).round();
    let basic_fee_new = (basic_new * tariff_adjust_factor).round();

    Ok(AnnualCostSummary {
        annual_kwh,
        basic_fee,
        flow_fee,
        total_fee: flow_fee + basic_fee,
        average_fee: round_to((flow_fee + basic_fee) / annual_kwh, 2),
        basic_fee_saving: (basic_fee - basic_fee_new).round(),
        over_capacity_penalty,
        over_capacity_days,
    })
}
