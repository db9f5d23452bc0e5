//! Simulation configuration: the user-supplied inputs plus the
//! resolver that back-fills every derivable field.
//!
//! `resolve` is idempotent. It never mutates in place; callers get a
//! fresh config with the derived fields populated from the inputs and
//! the static rate book.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{round_to, ContractCapacity, Season, TimeWindow};
use crate::tariff::{dr_program, plan_rates};

/// Tariff plan, contract set and adjusted energy prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    pub contract_old: ContractCapacity,
    pub contract_new: ContractCapacity,
    /// Billing category, e.g. "高壓三段式電價".
    pub plan: String,
    pub industry: String,
    /// Percentage multiplier applied to every published energy price.
    pub tariff_adjust_factor: f64,

    // Resolved from the rate book.
    pub summer_days: f64,
    pub not_summer_days: f64,
    pub summer_max_price: f64,
    pub summer_min_price: f64,
    pub not_summer_max_price: f64,
    pub not_summer_min_price: f64,
    pub adjusted_summer_max_price: f64,
    pub adjusted_summer_min_price: f64,
    pub adjusted_not_summer_max_price: f64,
    pub adjusted_not_summer_min_price: f64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        TariffConfig {
            contract_old: ContractCapacity::default(),
            contract_new: ContractCapacity::default(),
            plan: String::new(),
            industry: String::new(),
            tariff_adjust_factor: 1.0,
            summer_days: 0.0,
            not_summer_days: 0.0,
            summer_max_price: 0.0,
            summer_min_price: 0.0,
            not_summer_max_price: 0.0,
            not_summer_min_price: 0.0,
            adjusted_summer_max_price: 0.0,
            adjusted_summer_min_price: 0.0,
            adjusted_not_summer_max_price: 0.0,
            adjusted_not_summer_min_price: 0.0,
        }
    }
}

/// Battery fleet parameters. Per-unit ratings scale with the unit
/// count into fleet totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub unit_pcs_kw: f64,
    pub unit_capacity_kwh: f64,
    pub unit_count: u32,
    /// Round-trip energy loss, percent.
    pub rtt_loss_percent: f64,
    /// Year-over-year usable-capacity decay, percent.
    pub annual_decay_percent: f64,
    pub soc_upper_percent: f64,
    pub soc_lower_percent: f64,
    pub max_daily_cycles: u32,

    // Resolved.
    pub pcs_kw: f64,
    pub capacity_kwh: f64,
    pub c_rate: f64,
    pub installed_capacity_kwh: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        BatteryConfig {
            unit_pcs_kw: 125.0,
            unit_capacity_kwh: 261.0,
            unit_count: 1,
            rtt_loss_percent: 10.0,
            annual_decay_percent: 2.0,
            soc_upper_percent: 95.0,
            soc_lower_percent: 5.0,
            max_daily_cycles: 2,
            pcs_kw: 0.0,
            capacity_kwh: 0.0,
            c_rate: 0.0,
            installed_capacity_kwh: 0.0,
        }
    }
}

impl BatteryConfig {
    /// Round-trip loss as a fraction.
    pub fn rtt_loss_rate(&self) -> f64 {
        self.rtt_loss_percent / 100.0
    }

    /// Nameplate usable energy between the SOC bounds, kWh.
    pub fn usable_kwh_base(&self) -> f64 {
        self.capacity_kwh * (self.soc_upper_percent - self.soc_lower_percent) / 100.0
    }

    /// Usable energy per project year after linear decay, rounded to
    /// three decimals.
    pub fn usable_kwh_by_year(&self, years: u32) -> Vec<f64> {
        let base = self.usable_kwh_base();
        let decay = self.annual_decay_percent / 100.0;
        (1..=years)
            .map(|y| round_to(base * (1.0 - decay * (y as f64 - 1.0)), 3))
            .collect()
    }
}

/// Year-0 construction costs, NTD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapexConfig {
    pub unit_build_cost_per_kwh: f64,
    pub battery_install: f64,
    pub hv_equipment: f64,
    pub hv_equipment_install: f64,
    pub design_fee: f64,
    pub other: f64,

    // Resolved.
    pub battery: f64,
    pub ems: f64,
}

impl Default for CapexConfig {
    fn default() -> Self {
        CapexConfig {
            unit_build_cost_per_kwh: 10_000.0,
            battery_install: 0.0,
            hv_equipment: 0.0,
            hv_equipment_install: 0.0,
            design_fee: 0.0,
            other: 0.0,
            battery: 0.0,
            ems: 0.0,
        }
    }
}

impl CapexConfig {
    pub fn total(&self) -> f64 {
        self.battery
            + self.battery_install
            + self.hv_equipment
            + self.hv_equipment_install
            + self.design_fee
            + self.other
            + self.ems
    }
}

/// Recurring annual costs, NTD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpexConfig {
    /// Land rent per installed kWh per year.
    pub land_rent_per_kwh: f64,
    pub insurance_rate_percent: f64,
    pub other_fixed: f64,

    // Resolved.
    pub site_om: f64,
    pub ems_om: f64,
    pub cloud_platform: f64,
}

impl Default for OpexConfig {
    fn default() -> Self {
        OpexConfig {
            land_rent_per_kwh: 0.0,
            insurance_rate_percent: 1.5,
            other_fixed: 5000.0,
            site_om: 0.0,
            ems_om: 0.0,
            cloud_platform: 0.0,
        }
    }
}

/// Unit prices for the EMS and trading-platform services.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRateConfig {
    pub ems_per_kwh: f64,
    pub cloud_fee_per_mw: f64,
    pub field_comm_per_year: f64,
    pub ems_warranty_percent: f64,
    pub site_om_percent: f64,
}

impl Default for ServiceRateConfig {
    fn default() -> Self {
        ServiceRateConfig {
            ems_per_kwh: 750.0,
            cloud_fee_per_mw: 50_000.0,
            field_comm_per_year: 100_000.0,
            ems_warranty_percent: 10.0,
            site_om_percent: 1.0,
        }
    }
}

/// Days removed from the arbitrage and bidding calendars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub possible_over_days: f64,
    pub maintenance_days: f64,

    // Resolved: over days plus the maintenance outage.
    pub non_biddable_days: f64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig {
            possible_over_days: 0.0,
            maintenance_days: 15.0,
            non_biddable_days: 0.0,
        }
    }
}

/// Spinning-reserve market parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinningConfig {
    pub capacity_price: f64,
    pub performance_price: f64,
    pub win_ratio_percent: f64,
    pub discount_percent: f64,
    pub monthly_triggers: f64,
    pub day_ahead_price: f64,
    pub reserved_kw: f64,

    // Resolved: the fleet PCS rating.
    pub bid_kw: f64,
}

impl Default for SpinningConfig {
    fn default() -> Self {
        SpinningConfig {
            capacity_price: 179.0,
            performance_price: 100.0,
            win_ratio_percent: 100.0,
            discount_percent: 100.0,
            monthly_triggers: 1.0,
            day_ahead_price: 6000.0,
            reserved_kw: 0.0,
            bid_kw: 0.0,
        }
    }
}

/// Daily-window demand-response program parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrConfig {
    /// Program code: 0h, 2h, 4h, 6h or 6h_batch.
    pub program: String,
    pub execution_rate_percent: f64,
    pub rebate_multiplier_percent: f64,
    pub may_oct_days: f64,

    // Resolved from the program table.
    pub window: Option<TimeWindow>,
    pub duration_hr: f64,
    pub rate: f64,
    pub participating_days: f64,
}

impl Default for DrConfig {
    fn default() -> Self {
        DrConfig {
            program: "0h".to_string(),
            execution_rate_percent: 100.0,
            rebate_multiplier_percent: 120.0,
            may_oct_days: 132.0,
            window: None,
            duration_hr: 0.0,
            rate: 0.0,
            participating_days: 0.0,
        }
    }
}

/// Renewable-obligation (large consumer) parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LargeConsumerConfig {
    pub obligated_kw: f64,
    pub obligation_percent: f64,
    pub early_bird_offset_percent: f64,
    pub existing_offset_percent: f64,
}

impl Default for LargeConsumerConfig {
    fn default() -> Self {
        LargeConsumerConfig {
            obligated_kw: 0.0,
            obligation_percent: 10.0,
            early_bird_offset_percent: 0.0,
            existing_offset_percent: 0.0,
        }
    }
}

/// Loan terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancingConfig {
    pub loan_ratio_percent: f64,
    pub interest_rate_percent: f64,
    pub term_years: u32,
}

impl Default for FinancingConfig {
    fn default() -> Self {
        FinancingConfig {
            loan_ratio_percent: 70.0,
            interest_rate_percent: 2.0,
            term_years: 7,
        }
    }
}

/// Daily transferable-energy volumes, filled by the scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferVolumes {
    pub summer_daily_kwh: f64,
    pub not_summer_daily_kwh: f64,
}

/// The complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tariff: TariffConfig,
    pub battery: BatteryConfig,
    pub capex: CapexConfig,
    pub opex: OpexConfig,
    pub service_rates: ServiceRateConfig,
    pub calendar: CalendarConfig,
    pub spinning: SpinningConfig,
    pub demand_response: DrConfig,
    pub large_consumer: LargeConsumerConfig,
    pub financing: FinancingConfig,
    pub transfer: TransferVolumes,
    /// Aggregator profit share, percent of ancillary income.
    pub aggregation_share_percent: f64,
    /// Caller-defined extra annual income, NTD.
    pub custom_annual_income: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tariff: TariffConfig::default(),
            battery: BatteryConfig::default(),
            capex: CapexConfig::default(),
            opex: OpexConfig::default(),
            service_rates: ServiceRateConfig::default(),
            calendar: CalendarConfig::default(),
            spinning: SpinningConfig::default(),
            demand_response: DrConfig::default(),
            large_consumer: LargeConsumerConfig::default(),
            financing: FinancingConfig::default(),
            transfer: TransferVolumes::default(),
            aggregation_share_percent: 10.0,
            custom_annual_income: 0.0,
        }
    }
}

impl SimulationConfig {
    /// Back-fill every derived field from the inputs and the rate
    /// book. Resolving an already resolved config is a no-op.
    pub fn resolve(&self) -> Result<SimulationConfig> {
        let mut cfg = self.clone();

        let b = &mut cfg.battery;
        b.pcs_kw = b.unit_pcs_kw * b.unit_count as f64;
        b.capacity_kwh = b.unit_capacity_kwh * b.unit_count as f64;
        b.c_rate = round_to(b.pcs_kw / b.capacity_kwh, 3);
        b.installed_capacity_kwh = b.capacity_kwh;

        let summer = plan_rates(&cfg.tariff.plan, Season::Summer)?;
        let not_summer = plan_rates(&cfg.tariff.plan, Season::NotSummer)?;
        let t = &mut cfg.tariff;
        t.summer_days = summer.day_count;
        t.not_summer_days = not_summer.day_count;
        t.summer_max_price = summer.max_price;
        t.summer_min_price = summer.min_price;
        t.not_summer_max_price = not_summer.max_price;
        t.not_summer_min_price = not_summer.min_price;
        t.adjusted_summer_max_price = round_to(t.summer_max_price * t.tariff_adjust_factor, 5);
        t.adjusted_summer_min_price = round_to(t.summer_min_price * t.tariff_adjust_factor, 5);
        t.adjusted_not_summer_max_price =
            round_to(t.not_summer_max_price * t.tariff_adjust_factor, 5);
        t.adjusted_not_summer_min_price =
            round_to(t.not_summer_min_price * t.tariff_adjust_factor, 5);

        cfg.spinning.bid_kw = cfg.battery.pcs_kw;
        cfg.calendar.non_biddable_days =
            cfg.calendar.possible_over_days + cfg.calendar.maintenance_days;

        let program = dr_program(&cfg.demand_response.program)?;
        let dr = &mut cfg.demand_response;
        dr.window = Some(TimeWindow::new(program.start(), program.end()));
        dr.duration_hr = program.duration_hr;
        dr.rate = program.rate;
        dr.participating_days = dr.may_oct_days - cfg.calendar.possible_over_days;

        cfg.capex.battery =
            cfg.battery.installed_capacity_kwh * cfg.capex.unit_build_cost_per_kwh;
        cfg.capex.ems = cfg.battery.installed_capacity_kwh * cfg.service_rates.ems_per_kwh;
        cfg.opex.ems_om = cfg.capex.ems * cfg.service_rates.ems_warranty_percent / 100.0;
        cfg.opex.cloud_platform = cfg.service_rates.cloud_fee_per_mw * cfg.battery.pcs_kw
            / 1000.0
            + cfg.service_rates.field_comm_per_year;
        cfg.opex.site_om = cfg.capex.battery * cfg.service_rates.site_om_percent / 100.0;

        Ok(cfg)
    }
}
