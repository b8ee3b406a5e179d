use super::solver;
use super::types::{SimulationOutcome, SimulationParameters, WithdrawalMode, YearPoint};

pub(crate) const MONTHS_PER_YEAR: u32 = 12;
pub(crate) const LIFESPAN_CAP_YEARS: u32 = 100;
pub(crate) const SUSTAINABLE_DISPLAY_YEARS: u32 = 50;
const DISPLAY_TAIL_YEARS: u32 = 5;

pub(crate) fn monthly_rate(annual_rate_percent: f64) -> f64 {
    annual_rate_percent / 100.0 / MONTHS_PER_YEAR as f64
}

/// Growth is applied before the period cash flow (ordinary annuity). The
/// ordering is load-bearing: swapping it changes every projected total.
pub(crate) fn compound_step(balance: f64, periodic_rate: f64, cash_flow: f64) -> f64 {
    balance * (1.0 + periodic_rate) + cash_flow
}

/// Forward-projects a balance under recurring monthly contributions, or
/// solves for an unknown parameter when a target final value is supplied.
pub fn project_accumulation(params: &SimulationParameters) -> SimulationOutcome {
    match (params.unknown, params.target_final_value) {
        (Some(unknown), Some(target)) => solver::solve_accumulation(params, unknown, target),
        (Some(_), None) => SimulationOutcome::failure("goal-seeking requires a target final value"),
        (None, Some(_)) => {
            SimulationOutcome::failure("a target final value requires an unknown field to solve for")
        }
        (None, None) => {
            let series = accumulation_series(params);
            let final_balance = series.last().map(|p| p.total_balance).unwrap_or(0.0);
            SimulationOutcome::success(series, Some(final_balance))
        }
    }
}

/// Forward-projects a balance under recurring monthly withdrawals. The direct
/// answer is the lifespan of the policy in years, `f64::INFINITY` when annual
/// growth covers the annual withdrawal. With a target final value the call is
/// routed through the goal-seeking solver instead.
pub fn project_distribution(params: &SimulationParameters) -> SimulationOutcome {
    match (params.unknown, params.target_final_value) {
        (Some(unknown), Some(target)) => solver::solve_distribution(params, unknown, target),
        (Some(_), None) => SimulationOutcome::failure("goal-seeking requires a target final value"),
        (None, Some(_)) => {
            SimulationOutcome::failure("a target final value requires an unknown field to solve for")
        }
        (None, None) => {
            if is_sustainable(params) {
                let series = distribution_series(params, SUSTAINABLE_DISPLAY_YEARS);
                return SimulationOutcome::success(series, Some(f64::INFINITY));
            }

            let lifespan = lifespan_years(params);
            let display_years =
                (lifespan.ceil() as u32 + DISPLAY_TAIL_YEARS).min(SUSTAINABLE_DISPLAY_YEARS);
            let series = distribution_series(params, display_years);
            SimulationOutcome::success(series, Some(lifespan))
        }
    }
}

pub(crate) fn accumulation_series(params: &SimulationParameters) -> Vec<YearPoint> {
    let rate = monthly_rate(params.annual_rate);
    let mut balance = params.starting_principal;
    let mut principal = params.starting_principal;
    let mut series = Vec::with_capacity(params.total_years as usize + 1);
    series.push(YearPoint {
        year: 0,
        principal_to_date: principal,
        profit: 0.0,
        total_balance: balance.max(0.0),
    });

    for year in 1..=params.total_years {
        let contribution = if year <= params.contribution_years {
            params.periodic_amount
        } else {
            0.0
        };
        for _ in 0..MONTHS_PER_YEAR {
            balance = compound_step(balance, rate, contribution);
            principal += contribution;
        }
        series.push(YearPoint {
            year,
            principal_to_date: principal,
            profit: (balance - principal).max(0.0),
            total_balance: balance.max(0.0),
        });
    }

    series
}

pub(crate) fn accumulation_final_balance(
    annual_rate: f64,
    total_years: u32,
    contribution_years: u32,
    periodic_amount: f64,
    starting_principal: f64,
) -> f64 {
    let rate = monthly_rate(annual_rate);
    let mut balance = starting_principal;
    for year in 1..=total_years {
        let contribution = if year <= contribution_years {
            periodic_amount
        } else {
            0.0
        };
        for _ in 0..MONTHS_PER_YEAR {
            balance = compound_step(balance, rate, contribution);
        }
    }
    balance
}

pub(crate) fn is_sustainable(params: &SimulationParameters) -> bool {
    let annual_growth = params.starting_principal * params.annual_rate / 100.0;
    annual_growth >= annual_withdrawal(params)
}

fn annual_withdrawal(params: &SimulationParameters) -> f64 {
    match params.withdrawal_mode {
        WithdrawalMode::FixedAmount => params.periodic_amount * MONTHS_PER_YEAR as f64,
        WithdrawalMode::PercentageOfBalance => {
            params.starting_principal * params.periodic_amount / 100.0
        }
    }
}

fn monthly_outflow(balance: f64, params: &SimulationParameters) -> f64 {
    match params.withdrawal_mode {
        WithdrawalMode::FixedAmount => params.periodic_amount,
        WithdrawalMode::PercentageOfBalance => {
            balance * monthly_rate(params.periodic_amount)
        }
    }
}

/// Month-resolution lifespan of an unsustainable policy, capped at 100 years.
fn lifespan_years(params: &SimulationParameters) -> f64 {
    let rate = monthly_rate(params.annual_rate);
    let mut balance = params.starting_principal;
    for month in 1..=LIFESPAN_CAP_YEARS * MONTHS_PER_YEAR {
        balance = compound_step(balance, rate, -monthly_outflow(balance, params));
        if balance <= 0.0 {
            return month as f64 / MONTHS_PER_YEAR as f64;
        }
    }
    LIFESPAN_CAP_YEARS as f64
}

/// Year-granularity display series for the withdrawal path. The balance is
/// clamped at zero and the series stops at the year it first reaches zero.
pub(crate) fn distribution_series(
    params: &SimulationParameters,
    display_years: u32,
) -> Vec<YearPoint> {
    let rate = monthly_rate(params.annual_rate);
    let mut balance = params.starting_principal;
    let mut series = Vec::with_capacity(display_years as usize + 1);
    series.push(YearPoint {
        year: 0,
        principal_to_date: 0.0,
        profit: 0.0,
        total_balance: balance.max(0.0),
    });

    'years: for year in 1..=display_years {
        for _ in 0..MONTHS_PER_YEAR {
            balance = compound_step(balance, rate, -monthly_outflow(balance, params));
            if balance <= 0.0 {
                series.push(YearPoint {
                    year,
                    principal_to_date: 0.0,
                    profit: 0.0,
                    total_balance: 0.0,
                });
                break 'years;
            }
        }
        series.push(YearPoint {
            year,
            principal_to_date: 0.0,
            profit: 0.0,
            total_balance: balance,
        });
    }

    series
}

/// Balance left after `total_years` of withdrawals; zero once depleted.
pub(crate) fn distribution_final_balance(
    annual_rate: f64,
    total_years: u32,
    withdrawal_mode: WithdrawalMode,
    periodic_amount: f64,
    starting_principal: f64,
) -> f64 {
    let rate = monthly_rate(annual_rate);
    let mut balance = starting_principal;
    for _ in 0..total_years * MONTHS_PER_YEAR {
        let outflow = match withdrawal_mode {
            WithdrawalMode::FixedAmount => periodic_amount,
            WithdrawalMode::PercentageOfBalance => balance * monthly_rate(periodic_amount),
        };
        balance = compound_step(balance, rate, -outflow);
        if balance <= 0.0 {
            return 0.0;
        }
    }
    balance
}
