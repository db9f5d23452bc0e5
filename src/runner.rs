//! Multi-scenario driver: validates the request, prepares the load
//! profile, enumerates the scenario grid and runs every combination in
//! parallel.

use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::billing::{annual_cost, AnnualCostSummary};
use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::models::{AnnotatedLoadProfile, ContractCapacity};
use crate::profile::{HourlyCurvePoint, PointRecord, RawWeekProfile};
use crate::sizing::{fixed_step_unit_counts, LcProgram};
use crate::summary::{generate_summary, ScenarioMode, ScenarioSummary, SummaryRequest};
use crate::tariff::TouTable;

/// Spinning-reserve participation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpProgram {
    Single,
    Agg,
}

impl SpProgram {
    pub fn code(&self) -> &'static str {
        match self {
            SpProgram::Single => "single",
            SpProgram::Agg => "agg",
        }
    }

    fn short_label(&self) -> &'static str {
        match self {
            SpProgram::Single => "單一",
            SpProgram::Agg => "聚合",
        }
    }
}

/// One cell of the scenario grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationTask {
    pub label: String,
    pub unit_count: u32,
    pub mode: ScenarioMode,
    pub dr_program: Option<String>,
    pub sp_program: Option<SpProgram>,
    pub lc_program: Option<LcProgram>,
}

/// Flat per-scenario result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    #[serde(rename = "台數")]
    pub unit_count: u32,
    #[serde(rename = "ROI")]
    pub roi: f64,
    #[serde(rename = "IRR")]
    pub irr: Option<f64>,
    #[serde(rename = "Annual_ROI")]
    pub annual_roi: Option<f64>,
    #[serde(rename = "Average_ROI")]
    pub average_roi: f64,
    #[serde(rename = "模式")]
    pub mode: &'static str,
    #[serde(rename = "DR方案")]
    pub dr_program: String,
    #[serde(rename = "即時備轉方案")]
    pub sp_program: String,
    #[serde(rename = "用電大戶方案")]
    pub lc_program: String,
    #[serde(rename = "mode_comb")]
    pub label: String,
}

/// One executed scenario: the flat row plus its full cash-flow table
/// and the config snapshot that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRun {
    pub result: ScenarioResult,
    pub summary: ScenarioSummary,
}

/// The load profile selection, in priority order.
#[derive(Debug, Clone, Default)]
pub struct LoadOverrides {
    /// Manually adjusted hourly curve applied on top of the reference.
    pub hourly_update: Option<Vec<HourlyCurvePoint>>,
    /// Caller-uploaded 15-minute representative week.
    pub points: Option<Vec<PointRecord>>,
}

/// Everything the driver needs for one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub contract_old: ContractCapacity,
    pub contract_new: ContractCapacity,
    pub plan: String,
    pub industry: String,
    pub tariff_adjust_factor: f64,
    /// Unit counts to evaluate; `None` derives them from the contract.
    pub units: Option<Vec<u32>>,
    pub dr_programs: Vec<String>,
    pub sp_programs: Vec<SpProgram>,
    pub lc_programs: Vec<LcProgram>,
    pub years: u32,
}

impl Default for EvaluationRequest {
    fn default() -> Self {
        EvaluationRequest {
            contract_old: ContractCapacity::default(),
            contract_new: ContractCapacity::default(),
            plan: String::new(),
            industry: String::new(),
            tariff_adjust_factor: 1.0,
            units: None,
            dr_programs: vec!["2h".into(), "4h".into(), "6h".into()],
            sp_programs: vec![SpProgram::Single, SpProgram::Agg],
            lc_programs: vec![LcProgram::ObligatedHours, LcProgram::TieredRebate],
            years: 15,
        }
    }
}

/// The full evaluation output: one row per scenario, every cash-flow
/// table, and the no-storage baseline bill.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub results: Vec<ScenarioResult>,
    pub runs: Vec<ScenarioRun>,
    pub baseline: AnnualCostSummary,
}

/// Run one scenario for one fleet size.
pub fn run_simulation(
    config: &SimulationConfig,
    task: &SimulationTask,
    profile: &AnnotatedLoadProfile,
    years: u32,
) -> Result<ScenarioRun> {
    let mut cfg = config.clone();
    cfg.battery.unit_count = task.unit_count;
    // Every mode resolves a DR program; non-DR modes use the standby
    // program so the config stays complete.
    cfg.demand_response.program = match (&task.dr_program, task.mode.has_dr()) {
        (Some(code), true) => code.clone(),
        (None, true) => {
            return Err(SimError::Validation(
                "DR mode requires a program code".to_string(),
            ))
        }
        _ => "0h".to_string(),
    };

    let request = SummaryRequest {
        mode: task.mode,
        years,
        is_aggregation: task.sp_program == Some(SpProgram::Agg),
        lc_program: task.lc_program,
    };
    let summary = generate_summary(&cfg, profile, &request)?;

    let result = ScenarioResult {
        unit_count: task.unit_count,
        roi: summary.returns.roi,
        irr: summary.returns.irr,
        annual_roi: summary.returns.annual_roi,
        average_roi: summary.returns.average_roi,
        mode: task.mode.code(),
        dr_program: cfg.demand_response.program.clone(),
        sp_program: if task.mode == ScenarioMode::EnergyDrRegulation {
            task.sp_program
                .map(|p| p.code().to_string())
                .unwrap_or_else(|| "-".to_string())
        } else {
            "-".to_string()
        },
        lc_program: if task.mode == ScenarioMode::EnergyLc {
            task.lc_program
                .map(|p| p.label().to_string())
                .unwrap_or_else(|| "-".to_string())
        } else {
            "-".to_string()
        },
        label: task.label.clone(),
    };
    Ok(ScenarioRun { result, summary })
}

fn validate_request(request: &EvaluationRequest) -> Result<()> {
    request.contract_old.validate()?;
    request.contract_new.validate()?;
    if request.plan.is_empty() {
        return Err(SimError::Validation(
            "billing category must be a non-empty string".to_string(),
        ));
    }
    if request.industry.is_empty() {
        return Err(SimError::Validation(
            "industry class must be a non-empty string".to_string(),
        ));
    }
    if !request.tariff_adjust_factor.is_finite() {
        return Err(SimError::Validation(
            "tariff adjust factor must be a number".to_string(),
        ));
    }
    if request.years == 0 {
        return Err(SimError::Validation(
            "planning horizon must be a positive number of years".to_string(),
        ));
    }
    Ok(())
}

/// Build the scenario grid for the given option lists. `energy_only`
/// always runs; DR and spinning jointly add their compound scenarios,
/// while the large-consumer option never combines with the others.
fn enumerate_tasks(
    unit_options: &[u32],
    dr_programs: &[String],
    sp_programs: &[SpProgram],
    lc_programs: &[LcProgram],
) -> Vec<SimulationTask> {
    let mut tasks = Vec::new();

    let mut push = |label: String,
                    unit: u32,
                    mode: ScenarioMode,
                    dr: Option<String>,
                    sp: Option<SpProgram>,
                    lc: Option<LcProgram>| {
        tasks.push(SimulationTask {
            label,
            unit_count: unit,
            mode,
            dr_program: dr,
            sp_program: sp,
            lc_program: lc,
        });
    };

    for &unit in unit_options {
        push(
            "電價套利".to_string(),
            unit,
            ScenarioMode::EnergyOnly,
            None,
            None,
            None,
        );
    }

    let has_dr = !dr_programs.is_empty();
    let has_sp = !sp_programs.is_empty();
    let has_lc = !lc_programs.is_empty();

    if has_lc {
        for &unit in unit_options {
            for &lc in lc_programs {
                push(
                    format!("電價套利-{}", lc.label()),
                    unit,
                    ScenarioMode::EnergyLc,
                    None,
                    None,
                    Some(lc),
                );
            }
        }
    }
    if has_dr {
        for &unit in unit_options {
            for dr in dr_programs {
                push(
                    format!("電價套利-日選{dr}"),
                    unit,
                    ScenarioMode::EnergyDr,
                    Some(dr.clone()),
                    None,
                    None,
                );
            }
        }
    }
    if has_sp {
        for &unit in unit_options {
            for &sp in sp_programs {
                push(
                    format!("電價套利-即時{}", sp.short_label()),
                    unit,
                    ScenarioMode::EnergyRegulation,
                    None,
                    Some(sp),
                    None,
                );
            }
        }
    }
    if has_dr && has_sp {
        for &unit in unit_options {
            for dr in dr_programs {
                for &sp in sp_programs {
                    push(
                        format!("電價套利-日選{dr}-即時{}", sp.short_label()),
                        unit,
                        ScenarioMode::EnergyDrRegulation,
                        Some(dr.clone()),
                        Some(sp),
                        None,
                    );
                }
            }
        }
    }
    tasks
}

/// Run the whole scenario grid.
///
/// The load profile is chosen in priority order: the manual hourly
/// curve scaled onto the reference week, then caller-uploaded points,
/// then the reference week rescaled to the main contract capacity.
pub fn run_all_simulations(
    config: Option<SimulationConfig>,
    reference: &RawWeekProfile,
    overrides: &LoadOverrides,
    tou: &TouTable,
    request: &EvaluationRequest,
) -> Result<EvaluationOutcome> {
    validate_request(request)?;

    let mut cfg = config.unwrap_or_default();
    cfg.tariff.plan = request.plan.clone();
    cfg.tariff.industry = request.industry.clone();
    cfg.tariff.tariff_adjust_factor = request.tariff_adjust_factor;
    cfg.tariff.contract_old = request.contract_old;
    cfg.tariff.contract_new = request.contract_new;

    let main_contract_kw = request.contract_old.regular_kw;

    // The renewable obligation only binds contracts of 5 MW and up.
    let mut lc_programs = request.lc_programs.clone();
    if main_contract_kw >= 5000.0 {
        let lc = &cfg.large_consumer;
        cfg.large_consumer.obligated_kw = main_contract_kw * lc.obligation_percent / 100.0
            * (100.0 - lc.early_bird_offset_percent - lc.existing_offset_percent)
            / 100.0;
    } else {
        cfg.large_consumer.obligated_kw = 0.0;
        lc_programs.clear();
    }

    let week = match (&overrides.hourly_update, &overrides.points) {
        (Some(targets), _) if !targets.is_empty() => {
            info!("scaling reference week with the manual hourly curve");
            let mut week = reference.clone();
            week.scale_by_hourly_targets(targets)?;
            week
        }
        (_, Some(points)) if !points.is_empty() => {
            info!("using the uploaded representative week");
            RawWeekProfile::from_points(points)?
        }
        _ => {
            info!("scaling reference week to the main contract capacity");
            let mut week = reference.clone();
            week.scale_to_peak(main_contract_kw)?;
            week
        }
    };
    let profile = week.normalize(tou, &request.plan)?;

    let baseline = annual_cost(
        &profile,
        &request.plan,
        &request.contract_old,
        &request.contract_new,
        request.tariff_adjust_factor,
    )?;

    let mut unit_options = match &request.units {
        Some(units) => units.clone(),
        None => fixed_step_unit_counts(
            (main_contract_kw * 0.8).floor(),
            cfg.battery.unit_pcs_kw,
            4,
        ),
    };
    if unit_options.is_empty() {
        unit_options = vec![1];
    }
    info!("evaluating unit counts {unit_options:?}");

    let tasks = enumerate_tasks(
        &unit_options,
        &request.dr_programs,
        &request.sp_programs,
        &lc_programs,
    );
    info!("running {} scenarios", tasks.len());

    // Each task owns a config clone; collection preserves task order.
    let runs: Vec<ScenarioRun> = tasks
        .par_iter()
        .map(|task| run_simulation(&cfg, task, &profile, request.years))
        .collect::<Result<Vec<_>>>()?;

    let results = runs.iter().map(|r| r.result.clone()).collect();
    Ok(EvaluationOutcome {
        results,
        runs,
        baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> Vec<u32> {
        vec![2, 4]
    }

    #[test]
    fn enumeration_always_includes_energy_only() {
        let tasks = enumerate_tasks(&units(), &[], &[], &[]);
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.mode == ScenarioMode::EnergyOnly));
        assert!(tasks.iter().all(|t| t.label == "電價套利"));
    }

    #[test]
    fn dr_and_sp_add_their_compound_grid() {
        let dr = vec!["2h".to_string(), "4h".to_string()];
        let sp = vec![SpProgram::Single, SpProgram::Agg];
        let tasks = enumerate_tasks(&units(), &dr, &sp, &[]);
        // 2 energy_only + 4 dr + 4 sp + 8 dr_sp.
        assert_eq!(tasks.len(), 18);
        assert!(tasks
            .iter()
            .any(|t| t.label == "電價套利-日選2h-即時聚合"));
        assert!(tasks.iter().any(|t| t.label == "電價套利-即時單一"));
    }

    #[test]
    fn lc_never_combines_with_dr_or_sp() {
        let dr = vec!["2h".to_string()];
        let lc = vec![LcProgram::ObligatedHours];
        let tasks = enumerate_tasks(&units(), &dr, &[], &lc);
        // 2 energy_only + 2 lc + 2 dr, no compound scenarios.
        assert_eq!(tasks.len(), 6);
        assert!(tasks
            .iter()
            .any(|t| t.label == "電價套利-義務時數型"));
        assert!(!tasks
            .iter()
            .any(|t| t.mode == ScenarioMode::EnergyDrRegulation));
    }

    #[test]
    fn validation_rejects_empty_plan() {
        let request = EvaluationRequest {
            plan: String::new(),
            industry: "製造業".to_string(),
            ..Default::default()
        };
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn validation_rejects_negative_contract() {
        let request = EvaluationRequest {
            plan: "高壓三段式電價".to_string(),
            industry: "製造業".to_string(),
            contract_old: ContractCapacity {
                regular_kw: -1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_request(&request).is_err());
    }
}
