use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use ess_evaluator::{
    run_all_simulations, ContractCapacity, EvaluationRequest, LcProgram, LoadInput, LoadOverrides,
    SimulationConfig, SpProgram, TouTable,
};

#[derive(Parser)]
#[command(name = "ess_evaluator")]
#[command(about = "Evaluate battery storage returns under Taiwan TOU tariffs")]
struct Args {
    /// TOU schedule CSV (plan, season, weekday, slot prices)
    #[arg(long)]
    tou: String,

    /// Load profile: meter-export CSV or representative-week JSON
    #[arg(long)]
    profile: String,

    /// Manually adjusted hourly curve JSON, applied on top of the profile
    #[arg(long)]
    hourly_curve: Option<String>,

    /// Simulation config JSON; defaults are used when omitted
    #[arg(long)]
    config: Option<String>,

    /// Tariff plan name, e.g. 高壓三段式
    #[arg(long)]
    plan: String,

    /// Industry label for the report
    #[arg(long, default_value = "其他")]
    industry: String,

    /// Current regular contract capacity in kW
    #[arg(long)]
    old_regular: f64,

    /// Current semi-peak (or non-summer) contract capacity in kW
    #[arg(long, default_value = "0")]
    old_secondary: f64,

    /// Current Saturday semi-peak contract capacity in kW
    #[arg(long, default_value = "0")]
    old_saturday: f64,

    /// Current off-peak contract capacity in kW
    #[arg(long, default_value = "0")]
    old_off_peak: f64,

    /// Adjusted regular contract capacity; defaults to the current value
    #[arg(long)]
    new_regular: Option<f64>,

    #[arg(long)]
    new_secondary: Option<f64>,

    #[arg(long)]
    new_saturday: Option<f64>,

    #[arg(long)]
    new_off_peak: Option<f64>,

    /// Battery unit counts to evaluate; derived from the contract when omitted
    #[arg(long, value_delimiter = ',')]
    units: Option<Vec<u32>>,

    /// Demand-response program codes
    #[arg(long, value_delimiter = ',', default_values = ["2h", "4h", "6h"])]
    dr_programs: Vec<String>,

    /// Spinning-reserve participation: single, agg
    #[arg(long, value_delimiter = ',', default_values = ["single", "agg"])]
    sp_programs: Vec<String>,

    /// Large-consumer clause options: 義務時數型, 累進回饋型
    #[arg(long, value_delimiter = ',', default_values = ["義務時數型", "累進回饋型"])]
    lc_programs: Vec<String>,

    /// Evaluation horizon in years
    #[arg(long, default_value = "15")]
    years: u32,

    /// Tariff adjustment factor applied to the yearly bill
    #[arg(long, default_value = "1.0")]
    adjust: f64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    output: OutputFormat,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Summary,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("loading TOU schedule from {}", args.tou);
    let tou = TouTable::from_path(&args.tou)?;

    info!("loading load profile from {}", args.profile);
    let input = if Path::new(&args.profile)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    {
        let file =
            File::open(&args.profile).with_context(|| format!("cannot open {}", args.profile))?;
        LoadInput::from_json_reader(file)?
    } else {
        LoadInput::from_csv_path(&args.profile)?
    };
    let reference = input.to_week(&args.plan)?;

    // An uploaded representative week is used exactly; meter exports
    // are rescaled so their peak matches the main contract.
    let mut overrides = LoadOverrides::default();
    if let LoadInput::Points(points) = &input {
        overrides.points = Some(points.clone());
    }
    if let Some(path) = &args.hourly_curve {
        let file = File::open(path).with_context(|| format!("cannot open {path}"))?;
        overrides.hourly_update = Some(serde_json::from_reader(file)?);
    }

    let config: Option<SimulationConfig> = match &args.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("cannot open {path}"))?;
            Some(serde_json::from_reader(file)?)
        }
        None => None,
    };

    let contract_old = ContractCapacity {
        regular_kw: args.old_regular,
        secondary_kw: args.old_secondary,
        saturday_kw: args.old_saturday,
        off_peak_kw: args.old_off_peak,
    };
    let contract_new = ContractCapacity {
        regular_kw: args.new_regular.unwrap_or(contract_old.regular_kw),
        secondary_kw: args.new_secondary.unwrap_or(contract_old.secondary_kw),
        saturday_kw: args.new_saturday.unwrap_or(contract_old.saturday_kw),
        off_peak_kw: args.new_off_peak.unwrap_or(contract_old.off_peak_kw),
    };

    let mut sp_programs = Vec::new();
    for code in &args.sp_programs {
        match code.as_str() {
            "single" => sp_programs.push(SpProgram::Single),
            "agg" => sp_programs.push(SpProgram::Agg),
            other => bail!("unknown spinning-reserve option '{other}'"),
        }
    }
    let lc_programs = args
        .lc_programs
        .iter()
        .map(|code| LcProgram::parse(code))
        .collect::<ess_evaluator::Result<Vec<_>>>()?;

    let request = EvaluationRequest {
        contract_old,
        contract_new,
        plan: args.plan.clone(),
        industry: args.industry.clone(),
        tariff_adjust_factor: args.adjust,
        units: args.units.clone(),
        dr_programs: args.dr_programs.clone(),
        sp_programs,
        lc_programs,
        years: args.years,
    };

    let outcome = run_all_simulations(config, &reference, &overrides, &tou, &request)?;
    info!("evaluated {} scenarios", outcome.results.len());

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        OutputFormat::Csv => {
            println!(
                "台數,模式,DR方案,即時備轉方案,用電大戶方案,ROI,IRR,Annual_ROI,Average_ROI,mode_comb"
            );
            for r in &outcome.results {
                println!(
                    "{},{},{},{},{},{:.4},{},{},{:.4},{}",
                    r.unit_count,
                    r.mode,
                    r.dr_program,
                    r.sp_program,
                    r.lc_program,
                    r.roi,
                    r.irr.map_or(String::new(), |v| format!("{v:.4}")),
                    r.annual_roi.map_or(String::new(), |v| format!("{v:.4}")),
                    r.average_roi,
                    r.label
                );
            }
        }
        OutputFormat::Summary => {
            let baseline = &outcome.baseline;
            println!("年度電費基準 ({} / {})", args.plan, args.industry);
            println!("====================");
            println!("年用電度數: {:.0} 度", baseline.annual_kwh);
            println!("年基本電費: {:.0} 元", baseline.basic_fee);
            println!("年流動電費: {:.0} 元", baseline.flow_fee);
            println!("年總電費:   {:.0} 元", baseline.total_fee);
            println!();
            println!("情境排名 (依 ROI):");

            let mut ranked: Vec<_> = outcome.results.iter().collect();
            ranked.sort_by(|a, b| b.roi.total_cmp(&a.roi));
            for r in ranked {
                let irr = r
                    .irr
                    .map_or("-".to_string(), |v| format!("{:.2}%", v * 100.0));
                println!(
                    "  {} x{}: ROI {:.2}%, IRR {}",
                    r.label,
                    r.unit_count,
                    r.roi * 100.0,
                    irr
                );
            }
        }
    }

    Ok(())
}
