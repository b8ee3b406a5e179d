use super::engine;
use super::types::{SimulationOutcome, SimulationParameters, UnknownField, WithdrawalMode};

/// Per-unknown bisection configuration. Duration is integer-stepped, the
/// others are continuous; tolerances are absolute in target currency units.
#[derive(Debug, Clone, Copy)]
pub struct SolverSpec {
    pub bracket: (f64, f64),
    pub tolerance: f64,
    pub max_iterations: u32,
    /// If the solved value lands within this distance of the caller's current
    /// value for the field, the current value is returned verbatim.
    pub snap_epsilon: f64,
    pub integer_steps: bool,
}

impl SolverSpec {
    pub fn rate() -> Self {
        Self {
            bracket: (0.0001, 50.0),
            tolerance: 1.0,
            max_iterations: 100,
            snap_epsilon: 0.001,
            integer_steps: false,
        }
    }

    pub fn duration() -> Self {
        Self {
            bracket: (1.0, 50.0),
            tolerance: 1.0,
            max_iterations: 100,
            snap_epsilon: 0.0,
            integer_steps: true,
        }
    }

    pub fn periodic_amount(bracket_high: f64) -> Self {
        Self {
            bracket: (0.0, bracket_high),
            tolerance: 1.0,
            max_iterations: 100,
            snap_epsilon: 1.0,
            integer_steps: false,
        }
    }

    pub fn starting_principal() -> Self {
        // Closed-form inversion; only the snap threshold applies.
        Self {
            bracket: (0.0, f64::MAX),
            tolerance: 1.0,
            max_iterations: 1,
            snap_epsilon: 1.0,
            integer_steps: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Monotonicity {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, PartialEq)]
enum SolveState {
    Converged(f64),
    Exhausted(f64),
    Failed(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Simulator {
    Accumulation,
    Distribution,
}

pub(crate) fn solve_accumulation(
    params: &SimulationParameters,
    unknown: UnknownField,
    target: f64,
) -> SimulationOutcome {
    if !target.is_finite() || target < 0.0 {
        return SimulationOutcome::failure("target final value must be non-negative and finite");
    }

    let (state, snap_epsilon) = match unknown {
        UnknownField::Rate => {
            let spec = params.solver_override.unwrap_or_else(SolverSpec::rate);
            let state = bisect(spec, Monotonicity::Increasing, target, |rate| {
                engine::accumulation_final_balance(
                    rate,
                    params.total_years,
                    params.contribution_years,
                    params.periodic_amount,
                    params.starting_principal,
                )
            });
            (state, spec.snap_epsilon)
        }
        UnknownField::Duration => {
            let spec = params.solver_override.unwrap_or_else(SolverSpec::duration);
            let state = bisect(spec, Monotonicity::Increasing, target, |years| {
                let years = years.round().max(0.0) as u32;
                engine::accumulation_final_balance(
                    params.annual_rate,
                    years,
                    years,
                    params.periodic_amount,
                    params.starting_principal,
                )
            });
            (state, spec.snap_epsilon)
        }
        UnknownField::PeriodicAmount => {
            let months = contribution_months(params).max(1) as f64;
            let spec = params
                .solver_override
                .unwrap_or_else(|| SolverSpec::periodic_amount(2.0 * target / months));
            let state = bisect(spec, Monotonicity::Increasing, target, |amount| {
                engine::accumulation_final_balance(
                    params.annual_rate,
                    params.total_years,
                    params.contribution_years,
                    amount,
                    params.starting_principal,
                )
            });
            (state, spec.snap_epsilon)
        }
        UnknownField::StartingPrincipal => {
            // Closed-form inversion; only the override's snap threshold applies.
            let spec = params
                .solver_override
                .unwrap_or_else(SolverSpec::starting_principal);
            let state = solve_accumulation_principal(params, target);
            (state, spec.snap_epsilon)
        }
    };

    finish(params, unknown, snap_epsilon, state, Simulator::Accumulation)
}

pub(crate) fn solve_distribution(
    params: &SimulationParameters,
    unknown: UnknownField,
    target: f64,
) -> SimulationOutcome {
    if !target.is_finite() || target < 0.0 {
        return SimulationOutcome::failure("target final value must be non-negative and finite");
    }

    let (state, snap_epsilon) = match unknown {
        UnknownField::Rate => {
            let spec = params.solver_override.unwrap_or_else(SolverSpec::rate);
            let state = bisect(spec, Monotonicity::Increasing, target, |rate| {
                engine::distribution_final_balance(
                    rate,
                    params.total_years,
                    params.withdrawal_mode,
                    params.periodic_amount,
                    params.starting_principal,
                )
            });
            (state, spec.snap_epsilon)
        }
        UnknownField::Duration => {
            // Longer withdrawal horizons leave less behind.
            let spec = params.solver_override.unwrap_or_else(SolverSpec::duration);
            let state = bisect(spec, Monotonicity::Decreasing, target, |years| {
                let years = years.round().max(0.0) as u32;
                engine::distribution_final_balance(
                    params.annual_rate,
                    years,
                    params.withdrawal_mode,
                    params.periodic_amount,
                    params.starting_principal,
                )
            });
            (state, spec.snap_epsilon)
        }
        UnknownField::PeriodicAmount => {
            let spec = params
                .solver_override
                .unwrap_or_else(|| SolverSpec::periodic_amount(withdrawal_bracket_high(params)));
            let state = bisect(spec, Monotonicity::Decreasing, target, |amount| {
                engine::distribution_final_balance(
                    params.annual_rate,
                    params.total_years,
                    params.withdrawal_mode,
                    amount,
                    params.starting_principal,
                )
            });
            (state, spec.snap_epsilon)
        }
        UnknownField::StartingPrincipal => {
            let spec = params
                .solver_override
                .unwrap_or_else(SolverSpec::starting_principal);
            let state = solve_distribution_principal(params, target);
            (state, spec.snap_epsilon)
        }
    };

    finish(params, unknown, snap_epsilon, state, Simulator::Distribution)
}

/// Closed-form starting-principal inversion for the accumulation recurrence:
/// `target = principal * g^n + pmt * af(r, m) * g^(n - m)` where `g = 1 + r`,
/// `n` counts all months and `m` the contributing months.
fn solve_accumulation_principal(params: &SimulationParameters, target: f64) -> SolveState {
    let r = engine::monthly_rate(params.annual_rate);
    let n = (params.total_years * engine::MONTHS_PER_YEAR) as i32;
    let m = contribution_months(params);

    let growth = (1.0 + r).powi(n);
    if growth == 0.0 || !growth.is_finite() {
        return SolveState::Failed("degenerate growth factor in principal inversion".to_string());
    }

    let contributed = params.periodic_amount * annuity_factor(r, m) * (1.0 + r).powi(n - m);
    let principal = (target - contributed) / growth;
    principal_state(principal)
}

fn solve_distribution_principal(params: &SimulationParameters, target: f64) -> SolveState {
    let r = engine::monthly_rate(params.annual_rate);
    let n = (params.total_years * engine::MONTHS_PER_YEAR) as i32;

    match params.withdrawal_mode {
        WithdrawalMode::FixedAmount => {
            let growth = (1.0 + r).powi(n);
            if growth == 0.0 || !growth.is_finite() {
                return SolveState::Failed(
                    "degenerate growth factor in principal inversion".to_string(),
                );
            }
            let withdrawn = params.periodic_amount * annuity_factor(r, n);
            principal_state((target + withdrawn) / growth)
        }
        WithdrawalMode::PercentageOfBalance => {
            // Growth then proportional withdrawal is a constant monthly factor.
            let factor = (1.0 + r - engine::monthly_rate(params.periodic_amount)).powi(n);
            if factor == 0.0 || !factor.is_finite() {
                return SolveState::Failed(
                    "degenerate growth factor in principal inversion".to_string(),
                );
            }
            principal_state(target / factor)
        }
    }
}

fn principal_state(principal: f64) -> SolveState {
    if !principal.is_finite() || principal < 0.0 {
        SolveState::Failed(
            "target unreachable: solved starting principal is negative or non-finite".to_string(),
        )
    } else {
        SolveState::Converged(principal)
    }
}

fn annuity_factor(monthly_rate: f64, months: i32) -> f64 {
    if monthly_rate.abs() < 1e-12 {
        months as f64
    } else {
        ((1.0 + monthly_rate).powi(months) - 1.0) / monthly_rate
    }
}

fn contribution_months(params: &SimulationParameters) -> i32 {
    (params.contribution_years.min(params.total_years) * engine::MONTHS_PER_YEAR) as i32
}

fn withdrawal_bracket_high(params: &SimulationParameters) -> f64 {
    match params.withdrawal_mode {
        WithdrawalMode::FixedAmount => {
            let months = (params.total_years.max(1) * engine::MONTHS_PER_YEAR) as f64;
            2.0 * (params.starting_principal / months
                + params.starting_principal * engine::monthly_rate(params.annual_rate))
        }
        // The unknown is an annual percentage of the balance.
        WithdrawalMode::PercentageOfBalance => 100.0,
    }
}

fn bisect(
    spec: SolverSpec,
    monotonicity: Monotonicity,
    target: f64,
    objective: impl Fn(f64) -> f64,
) -> SolveState {
    let (bracket_low, bracket_high) = spec.bracket;
    let f_low = objective(bracket_low);
    let f_high = objective(bracket_high);
    let (f_min, f_max) = match monotonicity {
        Monotonicity::Increasing => (f_low, f_high),
        Monotonicity::Decreasing => (f_high, f_low),
    };

    if target < f_min - spec.tolerance || target > f_max + spec.tolerance {
        return SolveState::Failed("target unreachable within the search bracket".to_string());
    }

    let mut low = bracket_low;
    let mut high = bracket_high;
    let mut best_value = f64::NAN;
    let mut best_diff = f64::INFINITY;

    for _ in 0..spec.max_iterations {
        let mut mid = (low + high) / 2.0;
        if spec.integer_steps {
            mid = mid.round();
        }

        let diff = objective(mid) - target;
        if diff.abs() < best_diff {
            best_diff = diff.abs();
            best_value = mid;
        }
        if diff.abs() <= spec.tolerance {
            return SolveState::Converged(mid);
        }

        let overshoot = match monotonicity {
            Monotonicity::Increasing => diff > 0.0,
            Monotonicity::Decreasing => diff < 0.0,
        };
        if overshoot {
            high = mid;
        } else {
            low = mid;
        }

        if spec.integer_steps && high - low <= 1.0 {
            break;
        }
    }

    if best_value.is_finite() && best_value >= 0.0 {
        SolveState::Exhausted(best_value)
    } else {
        SolveState::Failed("no finite non-negative solution found".to_string())
    }
}

fn finish(
    params: &SimulationParameters,
    unknown: UnknownField,
    snap_epsilon: f64,
    state: SolveState,
    simulator: Simulator,
) -> SimulationOutcome {
    let value = match state {
        SolveState::Converged(value) | SolveState::Exhausted(value) => value,
        SolveState::Failed(reason) => return SimulationOutcome::failure(reason),
    };

    let snapped = snap_to_origin(value, current_value(params, unknown), snap_epsilon);
    let solved_params = substitute(params, unknown, snapped);
    let rerun = match simulator {
        Simulator::Accumulation => engine::project_accumulation(&solved_params),
        Simulator::Distribution => engine::project_distribution(&solved_params),
    };

    SimulationOutcome::success(rerun.series, Some(snapped))
}

fn snap_to_origin(value: f64, origin: f64, epsilon: f64) -> f64 {
    if (value - origin).abs() < epsilon {
        origin
    } else {
        value
    }
}

fn current_value(params: &SimulationParameters, unknown: UnknownField) -> f64 {
    match unknown {
        UnknownField::Rate => params.annual_rate,
        UnknownField::Duration => params.total_years as f64,
        UnknownField::PeriodicAmount => params.periodic_amount,
        UnknownField::StartingPrincipal => params.starting_principal,
    }
}

fn substitute(
    params: &SimulationParameters,
    unknown: UnknownField,
    value: f64,
) -> SimulationParameters {
    let mut solved = params.clone();
    solved.target_final_value = None;
    solved.unknown = None;
    match unknown {
        UnknownField::Rate => solved.annual_rate = value,
        UnknownField::Duration => {
            let years = value.round().max(0.0) as u32;
            solved.total_years = years;
            solved.contribution_years = years;
        }
        UnknownField::PeriodicAmount => solved.periodic_amount = value,
        UnknownField::StartingPrincipal => solved.starting_principal = value,
    }
    solved
}
