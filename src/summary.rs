//! Scenario cash-flow generation: one revenue mode, one battery fleet,
//! one row-labelled table spanning Year 0 through Year N, plus the
//! ROI/IRR figures derived from its net-cash row.

use log::warn;
use serde::Serialize;

use crate::arbitrage::{
    batch_transferred_energy, calculate_transferable_energy, count_high_peaks,
    first_cycle_window, full_day_window, second_cycle_window, DispatchSample, DispatchStats,
};
use crate::config::{SimulationConfig, TransferVolumes};
use crate::demand_response::calculate_dr_capacity;
use crate::error::{Result, SimError};
use crate::finance::{loan_payment_per_year, return_figures, ReturnFigures};
use crate::models::{AnnotatedLoadProfile, Season};
use crate::sizing::{
    large_consumer_reduction, max_profit_by_mode, performance_score, LcProgram,
};
use crate::spinning::{spinning_summary, total_spinning_gain, weekend_load_stats};

pub const ROW_BUILD_CAPACITY: &str = "建置容量(kWh)";
pub const ROW_USABLE_CAPACITY: &str = "實際可用容量(kWh)";
pub const ROW_BID_CAPACITY: &str = "投標容量";
pub const ROW_RESERVED_CAPACITY: &str = "保留容量";
pub const ROW_CONTRACT_REDUCTION: &str = "降契約容量";
pub const ROW_ARBITRAGE: &str = "電價差收益";
pub const ROW_LARGE_CONSUMER: &str = "用電大戶收益";
pub const ROW_DR: &str = "日選時段型";
pub const ROW_ANCILLARY: &str = "輔助服務價金";
pub const ROW_TOTAL_INCOME: &str = "總收入";
pub const ROW_LAND_RENT: &str = "土地租金";
pub const ROW_INSURANCE: &str = "保險費用";
pub const ROW_OM: &str = "維運+監控EMS費用";
pub const ROW_AGG_SHARE: &str = "聚合分潤比例";
pub const ROW_INTEREST: &str = "利息費用";
pub const ROW_TOTAL_EXPENSE: &str = "總支出";
pub const ROW_TOTAL_EXPENSE_EX_INTEREST: &str = "總支出(不含利息)";
pub const ROW_NET_CASH: &str = "Net Cash";

/// Revenue-stream combination for one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    EnergyOnly,
    EnergyLc,
    EnergyDr,
    EnergyRegulation,
    EnergyDrRegulation,
}

impl ScenarioMode {
    pub fn code(&self) -> &'static str {
        match self {
            ScenarioMode::EnergyOnly => "energy_only",
            ScenarioMode::EnergyLc => "energy_lc",
            ScenarioMode::EnergyDr => "energy_dr",
            ScenarioMode::EnergyRegulation => "energy_regulation",
            ScenarioMode::EnergyDrRegulation => "energy_dr_regulation",
        }
    }

    /// Row labels in table order for this mode.
    pub fn row_labels(&self) -> &'static [&'static str] {
        match self {
            ScenarioMode::EnergyOnly => &[
                ROW_BUILD_CAPACITY,
                ROW_USABLE_CAPACITY,
                ROW_RESERVED_CAPACITY,
                ROW_CONTRACT_REDUCTION,
                ROW_ARBITRAGE,
                ROW_TOTAL_INCOME,
                ROW_LAND_RENT,
                ROW_INSURANCE,
                ROW_OM,
                ROW_INTEREST,
                ROW_TOTAL_EXPENSE,
                ROW_TOTAL_EXPENSE_EX_INTEREST,
                ROW_NET_CASH,
            ],
            ScenarioMode::EnergyLc => &[
                ROW_BUILD_CAPACITY,
                ROW_USABLE_CAPACITY,
                ROW_RESERVED_CAPACITY,
                ROW_CONTRACT_REDUCTION,
                ROW_ARBITRAGE,
                ROW_LARGE_CONSUMER,
                ROW_TOTAL_INCOME,
                ROW_LAND_RENT,
                ROW_INSURANCE,
                ROW_OM,
                ROW_INTEREST,
                ROW_TOTAL_EXPENSE,
                ROW_TOTAL_EXPENSE_EX_INTEREST,
                ROW_NET_CASH,
            ],
            ScenarioMode::EnergyDr => &[
                ROW_BUILD_CAPACITY,
                ROW_USABLE_CAPACITY,
                ROW_RESERVED_CAPACITY,
                ROW_CONTRACT_REDUCTION,
                ROW_ARBITRAGE,
                ROW_DR,
                ROW_TOTAL_INCOME,
                ROW_LAND_RENT,
                ROW_INSURANCE,
                ROW_OM,
                ROW_INTEREST,
                ROW_TOTAL_EXPENSE,
                ROW_TOTAL_EXPENSE_EX_INTEREST,
                ROW_NET_CASH,
            ],
            ScenarioMode::EnergyRegulation => &[
                ROW_BUILD_CAPACITY,
                ROW_USABLE_CAPACITY,
                ROW_BID_CAPACITY,
                ROW_RESERVED_CAPACITY,
                ROW_CONTRACT_REDUCTION,
                ROW_ARBITRAGE,
                ROW_ANCILLARY,
                ROW_TOTAL_INCOME,
                ROW_LAND_RENT,
                ROW_INSURANCE,
                ROW_OM,
                ROW_AGG_SHARE,
                ROW_INTEREST,
                ROW_TOTAL_EXPENSE,
                ROW_TOTAL_EXPENSE_EX_INTEREST,
                ROW_NET_CASH,
            ],
            ScenarioMode::EnergyDrRegulation => &[
                ROW_BUILD_CAPACITY,
                ROW_USABLE_CAPACITY,
                ROW_BID_CAPACITY,
                ROW_RESERVED_CAPACITY,
                ROW_CONTRACT_REDUCTION,
                ROW_ARBITRAGE,
                ROW_DR,
                ROW_ANCILLARY,
                ROW_TOTAL_INCOME,
                ROW_LAND_RENT,
                ROW_INSURANCE,
                ROW_OM,
                ROW_AGG_SHARE,
                ROW_INTEREST,
                ROW_TOTAL_EXPENSE,
                ROW_TOTAL_EXPENSE_EX_INTEREST,
                ROW_NET_CASH,
            ],
        }
    }

    pub fn has_regulation(&self) -> bool {
        matches!(
            self,
            ScenarioMode::EnergyRegulation | ScenarioMode::EnergyDrRegulation
        )
    }

    pub fn has_dr(&self) -> bool {
        matches!(
            self,
            ScenarioMode::EnergyDr | ScenarioMode::EnergyDrRegulation
        )
    }
}

/// One labelled row. `cells[0]` is Year 0; blank cells stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlowRow {
    pub label: &'static str,
    pub cells: Vec<Option<f64>>,
}

/// Row-labelled cash-flow table over Year 0..=years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlowTable {
    pub years: u32,
    pub rows: Vec<CashFlowRow>,
}

impl CashFlowTable {
    fn new(labels: &[&'static str], years: u32) -> CashFlowTable {
        CashFlowTable {
            years,
            rows: labels
                .iter()
                .map(|&label| CashFlowRow {
                    label,
                    cells: vec![None; years as usize + 1],
                })
                .collect(),
        }
    }

    pub fn row(&self, label: &str) -> Option<&CashFlowRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    fn row_mut(&mut self, label: &str) -> Option<&mut CashFlowRow> {
        self.rows.iter_mut().find(|r| r.label == label)
    }

    /// Fill Year 1..=N, leaving Year 0 untouched.
    fn set_operating(&mut self, label: &str, values: &[f64]) {
        if let Some(row) = self.row_mut(label) {
            for (cell, &v) in row.cells.iter_mut().skip(1).zip(values) {
                *cell = Some(v);
            }
        }
    }

    fn set_cell(&mut self, label: &str, column: usize, value: Option<f64>) {
        if let Some(row) = self.row_mut(label) {
            if let Some(cell) = row.cells.get_mut(column) {
                *cell = value;
            }
        }
    }

    /// Operating-year values (Year 1..=N), with blanks read as zero.
    pub fn operating_values(&self, label: &str) -> Vec<f64> {
        match self.row(label) {
            Some(row) => row
                .cells
                .iter()
                .skip(1)
                .map(|c| c.unwrap_or(0.0))
                .collect(),
            None => vec![0.0; self.years as usize],
        }
    }

    pub fn column_headers(&self) -> Vec<String> {
        (0..=self.years).map(|y| format!("Year {y}")).collect()
    }
}

/// What to run: one mode over one planning horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryRequest {
    pub mode: ScenarioMode,
    pub years: u32,
    pub is_aggregation: bool,
    pub lc_program: Option<LcProgram>,
}

/// A generated scenario: the table, the return figures, and the
/// resolved config that actually drove the run (cycle count may have
/// been corrected).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub table: CashFlowTable,
    pub returns: ReturnFigures,
    /// First-year income against the mode's theoretical maximum, 0-100.
    pub performance_score: f64,
    pub config: SimulationConfig,
}

struct DispatchInputs<'a> {
    cfg: &'a SimulationConfig,
    profile: &'a AnnotatedLoadProfile,
    consider_lc: bool,
}

impl DispatchInputs<'_> {
    fn run(
        &self,
        window: crate::models::TimeWindow,
        consider_lc: bool,
    ) -> (Vec<DispatchSample>, Vec<DispatchStats>) {
        calculate_transferable_energy(
            self.profile,
            &self.cfg.tariff.plan,
            &self.cfg.tariff.contract_new,
            self.cfg.battery.pcs_kw,
            window,
            consider_lc,
        )
    }
}

/// Build the cash-flow table for one scenario.
pub fn generate_summary(
    config: &SimulationConfig,
    profile: &AnnotatedLoadProfile,
    request: &SummaryRequest,
) -> Result<ScenarioSummary> {
    if request.years == 0 {
        return Err(SimError::Validation(
            "planning horizon must be at least one year".to_string(),
        ));
    }
    if request.mode == ScenarioMode::EnergyLc && request.lc_program.is_none() {
        return Err(SimError::Validation(
            "energy_lc mode requires a large-consumer program".to_string(),
        ));
    }

    let mut cfg = config.resolve()?;
    let years = request.years as usize;
    let consider_lc = request.lc_program.is_some();
    let loss = cfg.battery.rtt_loss_rate();

    let mut table = CashFlowTable::new(request.mode.row_labels(), request.years);

    let usable = cfg.battery.usable_kwh_by_year(request.years);
    let reserved = vec![0.0; years];
    let delta: Vec<f64> = usable
        .iter()
        .zip(&reserved)
        .map(|(u, r)| u - r)
        .collect();

    table.set_operating(
        ROW_BUILD_CAPACITY,
        &vec![cfg.battery.installed_capacity_kwh; years],
    );
    table.set_operating(ROW_USABLE_CAPACITY, &usable);
    table.set_operating(ROW_RESERVED_CAPACITY, &reserved);
    table.set_operating(ROW_CONTRACT_REDUCTION, &vec![0.0; years]);

    // Single sites under 1 MW cannot enter the reserve market alone.
    let bid_kw = if request.is_aggregation || cfg.spinning.bid_kw >= 1000.0 {
        cfg.spinning.bid_kw
    } else {
        0.0
    };
    if request.mode.has_regulation() {
        table.set_operating(ROW_BID_CAPACITY, &vec![bid_kw; years]);
    }

    let inputs = DispatchInputs {
        cfg: &cfg,
        profile,
        consider_lc,
    };

    // Whole-day dispatch drives arbitrage, DR and spinning statistics.
    let (samples, stats) = inputs.run(full_day_window(), consider_lc);

    let summer = batch_transferred_energy(&stats, &delta, Season::Summer, loss, consider_lc);

    // Non-summer transfer depends on the cycle count. Two cycles only
    // hold when the weekday price curve actually carries two separate
    // high-price peaks; otherwise the count is corrected to one.
    let monday_levels = profile
        .iter()
        .filter(|s| s.season == Season::NotSummer && s.weekday == chrono::Weekday::Mon)
        .map(|s| s.tou_level);
    let (not_summer_general, not_summer_lc) = if cfg.battery.max_daily_cycles == 2 {
        if count_high_peaks(monday_levels) == 2 {
            let (_, stats_first) = inputs.run(first_cycle_window(), false);
            let first =
                batch_transferred_energy(&stats_first, &delta, Season::NotSummer, loss, false);
            let (_, stats_second) = inputs.run(second_cycle_window(), consider_lc);
            let second = batch_transferred_energy(
                &stats_second,
                &delta,
                Season::NotSummer,
                loss,
                consider_lc,
            );
            let combined: Vec<f64> = first
                .general_kwh
                .iter()
                .zip(&second.general_kwh)
                .map(|(a, b)| a + b)
                .collect();
            // The obligation window falls entirely inside the second
            // cycle.
            (combined, second.large_consumer_kwh)
        } else {
            warn!(
                "non-summer weekday curve has a single high-price peak; \
                 correcting max daily cycles from 2 to 1"
            );
            cfg.battery.max_daily_cycles = 1;
            let series =
                batch_transferred_energy(&stats, &delta, Season::NotSummer, loss, consider_lc);
            (series.general_kwh, series.large_consumer_kwh)
        }
    } else {
        let series =
            batch_transferred_energy(&stats, &delta, Season::NotSummer, loss, consider_lc);
        (series.general_kwh, series.large_consumer_kwh)
    };

    let t = &cfg.tariff;
    let arbitrage: Vec<f64> = (0..years)
        .map(|i| {
            let spread = (t.adjusted_summer_max_price - t.adjusted_summer_min_price)
                * t.summer_days
                * summer.general_kwh[i]
                + (t.adjusted_not_summer_max_price - t.adjusted_not_summer_min_price)
                    * t.not_summer_days
                    * not_summer_general[i];
            let charge_cost = t.adjusted_summer_min_price
                * t.summer_days
                * summer.general_kwh[i]
                * loss
                + t.adjusted_not_summer_min_price * t.not_summer_days * not_summer_general[i]
                    * loss;
            spread - charge_cost
        })
        .collect();
    table.set_operating(ROW_ARBITRAGE, &arbitrage);

    if request.mode == ScenarioMode::EnergyLc {
        let program = request.lc_program.unwrap_or(LcProgram::ObligatedHours);
        let lc_income: Vec<f64> = (0..years)
            .map(|i| {
                let discharge_kwh = (t.summer_days * summer.large_consumer_kwh[i]
                    + t.not_summer_days * not_summer_lc[i])
                    .round();
                large_consumer_reduction(
                    cfg.large_consumer.obligated_kw,
                    discharge_kwh,
                    program,
                )
            })
            .collect();
        table.set_operating(ROW_LARGE_CONSUMER, &lc_income);
    }

    if request.mode.has_dr() {
        let dr = &cfg.demand_response;
        let window = dr.window.ok_or_else(|| {
            SimError::Validation("demand-response window is not resolved".to_string())
        })?;
        let dr_income: Vec<f64> = delta
            .iter()
            .map(|&avail| {
                let (_, capacity_kw) = calculate_dr_capacity(
                    &samples,
                    &stats,
                    window,
                    dr.duration_hr,
                    avail * (1.0 - loss).sqrt(),
                );
                capacity_kw * dr.execution_rate_percent * dr.duration_hr * dr.rate
                    * dr.rebate_multiplier_percent
                    * dr.participating_days
                    / 10_000.0
            })
            .collect();
        table.set_operating(ROW_DR, &dr_income);
    }

    if request.mode.has_regulation() {
        let s = &cfg.spinning;
        let non_working_days =
            365.0 - t.summer_days - t.not_summer_days - cfg.calendar.non_biddable_days;
        let weekend = weekend_load_stats(&samples, cfg.battery.pcs_kw);
        let trigger_income =
            s.monthly_triggers * s.day_ahead_price * 12.0 * bid_kw / 1000.0;

        let mut ancillary = Vec::with_capacity(years);
        for &avail in &delta {
            let rows = spinning_summary(&samples, cfg.battery.pcs_kw, avail);
            let (single, aggregated) = total_spinning_gain(
                &weekend,
                &rows,
                non_working_days,
                t.summer_days,
                t.not_summer_days,
                s.capacity_price,
                s.performance_price,
                cfg.demand_response.duration_hr,
                cfg.battery.max_daily_cycles as f64,
            )?;
            let base = if request.is_aggregation {
                aggregated
            } else if bid_kw < 1000.0 {
                0.0
            } else {
                single
            };
            ancillary.push(
                base * (s.win_ratio_percent / 100.0) * (s.discount_percent / 100.0)
                    + trigger_income,
            );
        }
        table.set_operating(ROW_ANCILLARY, &ancillary);
    }

    let income_labels = [
        ROW_CONTRACT_REDUCTION,
        ROW_ARBITRAGE,
        ROW_DR,
        ROW_ANCILLARY,
        ROW_LARGE_CONSUMER,
    ];
    let mut total_income = vec![0.0; years];
    for label in income_labels {
        if table.row(label).is_some() {
            for (sum, v) in total_income.iter_mut().zip(table.operating_values(label)) {
                *sum += v;
            }
        }
    }
    table.set_operating(ROW_TOTAL_INCOME, &total_income);

    table.set_operating(
        ROW_LAND_RENT,
        &vec![cfg.battery.capacity_kwh * cfg.opex.land_rent_per_kwh; years],
    );
    table.set_operating(
        ROW_INSURANCE,
        &vec![cfg.capex.battery * cfg.opex.insurance_rate_percent / 100.0; years],
    );
    let cloud = if request.mode.has_regulation() {
        cfg.opex.cloud_platform
    } else {
        0.0
    };
    table.set_operating(
        ROW_OM,
        &vec![cfg.opex.site_om + cfg.opex.ems_om + cloud + cfg.opex.other_fixed; years],
    );

    if request.mode.has_regulation() {
        let share = if request.is_aggregation {
            cfg.aggregation_share_percent / 100.0
        } else {
            0.0
        };
        let agg_share: Vec<f64> = table
            .operating_values(ROW_ANCILLARY)
            .iter()
            .map(|v| v * share)
            .collect();
        table.set_operating(ROW_AGG_SHARE, &agg_share);
    }

    let capex_total = cfg.capex.total();
    let loan_ratio = cfg.financing.loan_ratio_percent / 100.0;
    let interest = if loan_ratio <= 0.0 {
        vec![0.0; years]
    } else {
        let annual = loan_payment_per_year(
            capex_total * loan_ratio,
            cfg.financing.term_years,
            cfg.financing.interest_rate_percent / 100.0,
        )?;
        (1..=request.years)
            .map(|y| if y <= cfg.financing.term_years { annual } else { 0.0 })
            .collect()
    };
    table.set_operating(ROW_INTEREST, &interest);

    let expense_labels = [
        ROW_LAND_RENT,
        ROW_INSURANCE,
        ROW_OM,
        ROW_AGG_SHARE,
        ROW_INTEREST,
    ];
    let mut total_expense = vec![0.0; years];
    let mut total_expense_ex_interest = vec![0.0; years];
    for label in expense_labels {
        if table.row(label).is_some() {
            let values = table.operating_values(label);
            for i in 0..years {
                total_expense[i] += values[i];
                if label != ROW_INTEREST {
                    total_expense_ex_interest[i] += values[i];
                }
            }
        }
    }
    table.set_operating(ROW_TOTAL_EXPENSE, &total_expense);
    table.set_operating(ROW_TOTAL_EXPENSE_EX_INTEREST, &total_expense_ex_interest);

    let net_cash: Vec<f64> = total_income
        .iter()
        .zip(&total_expense)
        .map(|(i, e)| i - e)
        .collect();
    table.set_operating(ROW_NET_CASH, &net_cash);

    // Year 0: the equity outlay, plus the capacity rows carried over
    // from Year 1.
    let equity = capex_total * (1.0 - loan_ratio);
    for label in [
        ROW_BUILD_CAPACITY,
        ROW_USABLE_CAPACITY,
        ROW_BID_CAPACITY,
        ROW_RESERVED_CAPACITY,
    ] {
        if let Some(year_one) = table.row(label).and_then(|r| r.cells.get(1).copied()) {
            table.set_cell(label, 0, year_one);
        }
    }
    table.set_cell(ROW_TOTAL_EXPENSE, 0, Some(equity));
    table.set_cell(ROW_TOTAL_EXPENSE_EX_INTEREST, 0, Some(equity));
    table.set_cell(ROW_NET_CASH, 0, Some(-equity));

    let mut full_net_cash = vec![-equity];
    full_net_cash.extend_from_slice(&net_cash);
    let returns = return_figures(&full_net_cash, equity, request.years);

    let max_profit = max_profit_by_mode(&cfg, request.mode, request.lc_program)?;
    let score = performance_score(
        total_income.first().copied().unwrap_or(0.0),
        max_profit,
    );

    cfg.transfer = TransferVolumes {
        summer_daily_kwh: summer.general_kwh.first().copied().unwrap_or(0.0),
        not_summer_daily_kwh: not_summer_general.first().copied().unwrap_or(0.0),
    };

    Ok(ScenarioSummary {
        table,
        returns,
        performance_score: score,
        config: cfg,
    })
}
