//! Fleet sizing helpers: candidate unit counts, the large-consumer
//! rebate formulas, and the theoretical-maximum profit estimators
//! behind the 0-100 performance scores.

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::summary::ScenarioMode;

/// Candidate unit counts stepped evenly up to the contract's PCS
/// headroom. At most `max_groups` options; empty when the contract
/// cannot host a single unit.
pub fn fixed_step_unit_counts(
    contract_capacity_kw: f64,
    unit_pcs_kw: f64,
    max_groups: usize,
) -> Vec<u32> {
    let max_units = (contract_capacity_kw / unit_pcs_kw).floor() as u32;
    if max_units == 0 {
        return Vec::new();
    }
    let step = (max_units / max_groups as u32).max(1);
    (step..=max_units)
        .step_by(step as usize)
        .take(max_groups)
        .collect()
}

/// Large-consumer (用電大戶) rebate plan family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LcProgram {
    /// 義務時數型: discharge beyond 400 h of obligated capacity earns
    /// a flat 10 NTD/kWh.
    #[serde(rename = "義務時數型")]
    ObligatedHours,
    /// 累進回饋型: progressive 1/2/5 NTD/kWh tiers at 150 h and 400 h
    /// of obligated capacity.
    #[serde(rename = "累進回饋型")]
    TieredRebate,
}

impl LcProgram {
    pub fn parse(code: &str) -> Result<LcProgram> {
        match code {
            "義務時數型" => Ok(LcProgram::ObligatedHours),
            "累進回饋型" => Ok(LcProgram::TieredRebate),
            other => Err(SimError::UnsupportedLargeConsumerPlan(other.to_string())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LcProgram::ObligatedHours => "義務時數型",
            LcProgram::TieredRebate => "累進回饋型",
        }
    }
}

/// Annual bill reduction for an obligated large consumer, NTD.
pub fn large_consumer_reduction(
    obligated_capacity_kw: f64,
    total_discharge_kwh: f64,
    program: LcProgram,
) -> f64 {
    match program {
        LcProgram::ObligatedHours => {
            let obligated_kwh = obligated_capacity_kw * 400.0;
            (total_discharge_kwh - obligated_kwh).max(0.0) * 10.0
        }
        LcProgram::TieredRebate => {
            let tier1 = obligated_capacity_kw * 150.0;
            let tier2 = obligated_capacity_kw * 400.0;
            let t1_kwh = total_discharge_kwh.min(tier1);
            let t2_kwh = (total_discharge_kwh - tier1).max(0.0).min(tier2 - tier1);
            let t3_kwh = (total_discharge_kwh - tier2).max(0.0);
            t1_kwh * 1.0 + t2_kwh * 2.0 + t3_kwh * 5.0
        }
    }
}

/// Ceiling on arbitrage income: one full loss-adjusted cycle per
/// summer day and the cycle-count multiple per non-summer day, all at
/// the adjusted max/min price spread.
pub fn max_arbitrage_profit(cfg: &SimulationConfig) -> f64 {
    let loss = cfg.battery.rtt_loss_rate();
    let base_kwh = cfg.battery.usable_kwh_base() * (1.0 - loss).sqrt();
    let summer_daily = base_kwh;
    let not_summer_daily = base_kwh * cfg.battery.max_daily_cycles as f64;

    let t = &cfg.tariff;
    let spread = (t.adjusted_summer_max_price - t.adjusted_summer_min_price)
        * t.summer_days
        * summer_daily
        + (t.adjusted_not_summer_max_price - t.adjusted_not_summer_min_price)
            * t.not_summer_days
            * not_summer_daily;
    let charge_loss = t.adjusted_summer_min_price * t.summer_days * summer_daily * loss
        + t.adjusted_not_summer_min_price * t.not_summer_days * not_summer_daily * loss;

    crate::models::round_to(spread - charge_loss, 2)
}

/// Ceiling on the large-consumer rebate: two hours of full-power
/// discharge every day of the year. Returns 1.0 when the rebate is
/// zero so score ratios stay defined.
pub fn max_large_consumer_profit(cfg: &SimulationConfig, program: LcProgram) -> f64 {
    let loss = cfg.battery.rtt_loss_rate();
    let base_kwh = cfg.battery.usable_kwh_base() * (1.0 - loss).sqrt();
    let daily_kwh = base_kwh.min(cfg.battery.pcs_kw * 2.0);
    let total_kwh = (cfg.tariff.summer_days + cfg.tariff.not_summer_days) * daily_kwh;
    let profit =
        large_consumer_reduction(cfg.large_consumer.obligated_kw, total_kwh, program);
    if profit == 0.0 {
        return 1.0;
    }
    crate::models::round_to(profit, 2)
}

/// Ceiling on daily-window DR income at full curtailment every
/// participating day.
pub fn max_dr_profit(cfg: &SimulationConfig) -> f64 {
    let dr = &cfg.demand_response;
    if dr.duration_hr <= 0.0 {
        return 0.0;
    }
    let loss = cfg.battery.rtt_loss_rate();
    let base_kwh = cfg.battery.usable_kwh_base() * (1.0 - loss).sqrt();
    let capacity_kw = cfg.battery.pcs_kw.min(base_kwh / dr.duration_hr);
    let income = capacity_kw * dr.execution_rate_percent * dr.duration_hr * dr.rate
        * dr.rebate_multiplier_percent
        * dr.participating_days
        / 10_000.0;
    crate::models::round_to(income, 2)
}

/// Ceiling on spinning-reserve income: every hour not claimed by the
/// battery's own cycling or the DR window is bid at the full rate.
pub fn max_spinning_profit(cfg: &SimulationConfig) -> f64 {
    let s = &cfg.spinning;
    let b = &cfg.battery;
    let dr_hours = cfg.demand_response.duration_hr;

    // Hours to empty the battery at full PCS power, before loss
    // adjustment.
    let discharge_hours = (b.usable_kwh_base() / b.pcs_kw).ceil();
    let cycles = b.max_daily_cycles as f64;

    let summer_days = cfg.tariff.summer_days;
    let not_summer_days = cfg.tariff.not_summer_days;
    let non_working_days =
        365.0 - summer_days - not_summer_days - cfg.calendar.non_biddable_days;

    let summer_hours = 24.0 - dr_hours.max(discharge_hours) * 2.0;
    let not_summer_hours =
        24.0 - dr_hours.max(discharge_hours) * 2.0 - discharge_hours * 2.0 * (cycles - 1.0);

    let total_hours = summer_days * summer_hours
        + not_summer_days * not_summer_hours
        + non_working_days * 24.0;

    let capacity_income = (s.capacity_price + s.performance_price) * total_hours * s.bid_kw
        / 1000.0
        * (s.win_ratio_percent / 100.0)
        * (s.discount_percent / 100.0);
    let energy_income = s.monthly_triggers * s.day_ahead_price * 12.0 * s.bid_kw / 1000.0;

    crate::models::round_to(capacity_income + energy_income, 2)
}

/// Theoretical-maximum first-year income for a scenario mode, the
/// denominator of the 0-100 performance score.
pub fn max_profit_by_mode(
    cfg: &SimulationConfig,
    mode: ScenarioMode,
    lc_program: Option<LcProgram>,
) -> Result<f64> {
    let arbitrage = max_arbitrage_profit(cfg);
    let total = match mode {
        ScenarioMode::EnergyOnly => arbitrage,
        ScenarioMode::EnergyLc => {
            let program = lc_program.ok_or_else(|| {
                SimError::Validation(
                    "energy_lc mode requires a large-consumer program".to_string(),
                )
            })?;
            arbitrage + max_large_consumer_profit(cfg, program)
        }
        ScenarioMode::EnergyDr => arbitrage + max_dr_profit(cfg),
        ScenarioMode::EnergyRegulation => arbitrage + max_spinning_profit(cfg),
        ScenarioMode::EnergyDrRegulation => {
            arbitrage + max_dr_profit(cfg) + max_spinning_profit(cfg)
        }
    };
    Ok(total)
}

/// Actual income against the theoretical maximum, clamped to 0-100.
pub fn performance_score(actual: f64, theoretical_max: f64) -> f64 {
    if theoretical_max <= 0.0 {
        return 0.0;
    }
    (actual / theoretical_max * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatteryConfig, SimulationConfig, TariffConfig};

    #[test]
    fn fixed_step_counts_scale_with_headroom() {
        assert_eq!(fixed_step_unit_counts(1000.0, 125.0, 4), vec![2, 4, 6, 8]);
        assert_eq!(fixed_step_unit_counts(500.0, 125.0, 4), vec![1, 2, 3, 4]);
        // Three units of headroom: step stays 1 and options cap at the
        // headroom.
        assert_eq!(fixed_step_unit_counts(400.0, 125.0, 4), vec![1, 2, 3]);
    }

    #[test]
    fn fixed_step_counts_empty_below_one_unit() {
        assert_eq!(fixed_step_unit_counts(100.0, 125.0, 4), Vec::<u32>::new());
    }

    #[test]
    fn obligated_hours_reduction_starts_past_400_hours() {
        assert_eq!(
            large_consumer_reduction(100.0, 30_000.0, LcProgram::ObligatedHours),
            0.0
        );
        assert_eq!(
            large_consumer_reduction(100.0, 50_000.0, LcProgram::ObligatedHours),
            100_000.0
        );
    }

    #[test]
    fn tiered_reduction_sums_tiers() {
        // 100 kW: tiers at 15000 and 40000 kWh.
        let r = large_consumer_reduction(100.0, 50_000.0, LcProgram::TieredRebate);
        assert_eq!(r, 15_000.0 * 1.0 + 25_000.0 * 2.0 + 10_000.0 * 5.0);
    }

    #[test]
    fn lc_program_parse_rejects_unknown() {
        assert!(LcProgram::parse("義務時數型").is_ok());
        assert!(LcProgram::parse("其他").is_err());
    }

    fn resolved_config() -> SimulationConfig {
        SimulationConfig {
            tariff: TariffConfig {
                plan: "高壓三段式電價".to_string(),
                tariff_adjust_factor: 1.0,
                ..Default::default()
            },
            battery: BatteryConfig {
                unit_count: 8,
                ..Default::default()
            },
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    #[test]
    fn max_lc_profit_floors_at_one() {
        // An enormous obligation zeroes the rebate; the estimator
        // returns 1 so score ratios stay defined.
        let mut cfg = resolved_config();
        cfg.large_consumer.obligated_kw = 100_000.0;
        assert_eq!(
            max_large_consumer_profit(&cfg, LcProgram::ObligatedHours),
            1.0
        );
    }

    #[test]
    fn max_arbitrage_profit_is_positive_for_real_plan() {
        let cfg = resolved_config();
        assert!(max_arbitrage_profit(&cfg) > 0.0);
    }

    #[test]
    fn max_dr_profit_zero_for_standby_program() {
        // The 0h program has no execution hours.
        let cfg = resolved_config();
        assert_eq!(max_dr_profit(&cfg), 0.0);
    }

    #[test]
    fn mode_maximum_stacks_the_streams() {
        let cfg = resolved_config();
        let energy = max_profit_by_mode(&cfg, ScenarioMode::EnergyOnly, None).unwrap();
        let regulation =
            max_profit_by_mode(&cfg, ScenarioMode::EnergyRegulation, None).unwrap();
        assert_eq!(energy, max_arbitrage_profit(&cfg));
        assert_eq!(regulation, energy + max_spinning_profit(&cfg));
        assert!(max_profit_by_mode(&cfg, ScenarioMode::EnergyLc, None).is_err());
    }

    #[test]
    fn score_is_a_clamped_percentage() {
        assert_eq!(performance_score(50.0, 200.0), 25.0);
        assert_eq!(performance_score(300.0, 200.0), 100.0);
        assert_eq!(performance_score(10.0, 0.0), 0.0);
        assert_eq!(performance_score(-10.0, 200.0), 0.0);
    }
}
