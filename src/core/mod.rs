mod engine;
mod solver;
mod types;

pub use engine::{project_accumulation, project_distribution};
pub use solver::SolverSpec;
pub use types::{SimulationOutcome, SimulationParameters, UnknownField, WithdrawalMode, YearPoint};
