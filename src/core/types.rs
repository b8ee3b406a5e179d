use serde::Serialize;

use super::solver::SolverSpec;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalMode {
    FixedAmount,
    PercentageOfBalance,
}

/// The parameter a goal-seeking call solves for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UnknownField {
    Rate,
    Duration,
    PeriodicAmount,
    StartingPrincipal,
}

#[derive(Debug, Clone)]
pub struct SimulationParameters {
    /// Annual nominal rate in percent. Negative values are tolerated.
    pub annual_rate: f64,
    pub total_years: u32,
    /// Years during which contributions are made; accumulation only.
    pub contribution_years: u32,
    pub starting_principal: f64,
    /// Monthly contribution or withdrawal. In percentage-of-balance mode this
    /// is the annual percentage of the balance withdrawn instead.
    pub periodic_amount: f64,
    pub withdrawal_mode: WithdrawalMode,
    /// Switches from direct projection to goal-seeking when present.
    pub target_final_value: Option<f64>,
    pub unknown: Option<UnknownField>,
    /// Replaces the per-unknown solver defaults when present.
    pub solver_override: Option<SolverSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearPoint {
    pub year: u32,
    pub principal_to_date: f64,
    pub profit: f64,
    pub total_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    pub series: Vec<YearPoint>,
    /// Direct projections report the final balance (accumulation) or the
    /// lifespan in years (distribution, `f64::INFINITY` when sustainable).
    /// Goal-seeking calls report the solved unknown.
    pub solved_value: Option<f64>,
    pub succeeded: bool,
    pub error_reason: Option<String>,
}

impl SimulationOutcome {
    pub fn success(series: Vec<YearPoint>, solved_value: Option<f64>) -> Self {
        Self {
            series,
            solved_value,
            succeeded: true,
            error_reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            series: Vec::new(),
            solved_value: None,
            succeeded: false,
            error_reason: Some(reason.into()),
        }
    }
}
