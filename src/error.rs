//! Error types shared across the evaluation engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Tariff plan has no entry in the schedule table for the requested season.
    #[error("unknown tariff plan {plan:?} for season {season}")]
    PlanNotFound { plan: String, season: String },

    /// The day-select DR program code is not one of the published programs.
    #[error("unknown demand-response program {0:?}")]
    UnknownDrProgram(String),

    /// Large-consumer clause plan code is not 義務時數型 or 累進回饋型.
    #[error("unsupported large-consumer plan {0:?}")]
    UnsupportedLargeConsumerPlan(String),

    /// Input data failed a structural or semantic check.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Load profile file could not be understood as long, wide or point format.
    #[error("unrecognized load profile format: {0}")]
    Format(String),

    /// Financing parameters are inconsistent (e.g. loan ratio set but rate is zero).
    #[error("invalid financing parameters: {0}")]
    Financing(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
