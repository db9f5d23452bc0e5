pub mod arbitrage;
pub mod billing;
pub mod config;
pub mod demand_response;
pub mod error;
pub mod finance;
pub mod models;
pub mod profile;
pub mod runner;
pub mod sizing;
pub mod spinning;
pub mod summary;
pub mod tariff;

pub use config::SimulationConfig;
pub use error::{Result, SimError};
pub use models::{AnnotatedLoadProfile, ContractCapacity, Season, TouTag, WeekdayClass};
pub use profile::{LoadInput, RawWeekProfile};
pub use runner::{
    run_all_simulations, run_simulation, EvaluationOutcome, EvaluationRequest, LoadOverrides,
    ScenarioResult, ScenarioRun, SimulationTask, SpProgram,
};
pub use sizing::LcProgram;
pub use summary::{generate_summary, CashFlowTable, ScenarioMode, ScenarioSummary, SummaryRequest};
pub use tariff::TouTable;
