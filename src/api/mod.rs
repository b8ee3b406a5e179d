use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    SimulationOutcome, SimulationParameters, UnknownField, WithdrawalMode, YearPoint,
    project_accumulation, project_distribution,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalMode {
    FixedAmount,
    PercentageOfBalance,
}

impl From<CliWithdrawalMode> for WithdrawalMode {
    fn from(value: CliWithdrawalMode) -> Self {
        match value {
            CliWithdrawalMode::FixedAmount => WithdrawalMode::FixedAmount,
            CliWithdrawalMode::PercentageOfBalance => WithdrawalMode::PercentageOfBalance,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliUnknownField {
    Rate,
    Duration,
    PeriodicAmount,
    StartingPrincipal,
}

impl From<CliUnknownField> for UnknownField {
    fn from(value: CliUnknownField) -> Self {
        match value {
            CliUnknownField::Rate => UnknownField::Rate,
            CliUnknownField::Duration => UnknownField::Duration,
            CliUnknownField::PeriodicAmount => UnknownField::PeriodicAmount,
            CliUnknownField::StartingPrincipal => UnknownField::StartingPrincipal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalMode {
    #[serde(alias = "fixed", alias = "fixedAmount", alias = "fixed_amount")]
    FixedAmount,
    #[serde(
        alias = "percentage",
        alias = "percentageOfBalance",
        alias = "percentage_of_balance"
    )]
    PercentageOfBalance,
}

impl From<ApiWithdrawalMode> for CliWithdrawalMode {
    fn from(value: ApiWithdrawalMode) -> Self {
        match value {
            ApiWithdrawalMode::FixedAmount => CliWithdrawalMode::FixedAmount,
            ApiWithdrawalMode::PercentageOfBalance => CliWithdrawalMode::PercentageOfBalance,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiUnknownField {
    Rate,
    Duration,
    #[serde(alias = "amount", alias = "periodicAmount", alias = "periodic_amount")]
    PeriodicAmount,
    #[serde(
        alias = "principal",
        alias = "startingPrincipal",
        alias = "starting_principal"
    )]
    StartingPrincipal,
}

impl From<ApiUnknownField> for CliUnknownField {
    fn from(value: ApiUnknownField) -> Self {
        match value {
            ApiUnknownField::Rate => CliUnknownField::Rate,
            ApiUnknownField::Duration => CliUnknownField::Duration,
            ApiUnknownField::PeriodicAmount => CliUnknownField::PeriodicAmount,
            ApiUnknownField::StartingPrincipal => CliUnknownField::StartingPrincipal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
enum ResponsePhase {
    Accumulation,
    Distribution,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    annual_rate: Option<f64>,
    total_years: Option<u32>,
    contribution_years: Option<u32>,
    starting_principal: Option<f64>,
    periodic_amount: Option<f64>,
    withdrawal_mode: Option<ApiWithdrawalMode>,
    target_final_value: Option<f64>,
    unknown: Option<ApiUnknownField>,
}

#[derive(Parser, Debug)]
#[command(
    name = "tsumitate",
    about = "Deterministic savings and drawdown projection engine with goal seeking"
)]
struct Cli {
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Annual nominal growth rate in percent"
    )]
    annual_rate: f64,
    #[arg(long, default_value_t = 30)]
    total_years: u32,
    #[arg(long, help = "Years of contributions; defaults to --total-years")]
    contribution_years: Option<u32>,
    #[arg(long, default_value_t = 0.0)]
    starting_principal: f64,
    #[arg(
        long,
        default_value_t = 30_000.0,
        help = "Monthly contribution or withdrawal; in percentage-of-balance mode, the annual percent of the balance withdrawn"
    )]
    periodic_amount: f64,
    #[arg(long, value_enum, default_value_t = CliWithdrawalMode::FixedAmount)]
    withdrawal_mode: CliWithdrawalMode,
    #[arg(long, help = "Switches from projection to goal seeking")]
    target_final_value: Option<f64>,
    #[arg(long, value_enum, help = "The field the goal seek solves for")]
    unknown: Option<CliUnknownField>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    phase: ResponsePhase,
    succeeded: bool,
    /// Absent for failures and for sustainable-forever distributions (the
    /// infinite lifespan does not survive JSON; see `sustainable_forever`).
    solved_value: Option<f64>,
    sustainable_forever: bool,
    error_reason: Option<String>,
    series: Vec<YearPoint>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// Error messages use the payload field names; the JSON API returns them
// verbatim and the CLI flags are spelled the same modulo case.
fn build_parameters(cli: Cli) -> Result<SimulationParameters, String> {
    if !cli.annual_rate.is_finite() {
        return Err("annualRate must be finite".to_string());
    }

    if cli.total_years > 100 {
        return Err("totalYears must be <= 100".to_string());
    }

    if !cli.starting_principal.is_finite() || cli.starting_principal < 0.0 {
        return Err("startingPrincipal must be >= 0".to_string());
    }

    if !cli.periodic_amount.is_finite() || cli.periodic_amount < 0.0 {
        return Err("periodicAmount must be >= 0".to_string());
    }

    let contribution_years = cli.contribution_years.unwrap_or(cli.total_years);
    if contribution_years > cli.total_years {
        return Err("contributionYears must be <= totalYears".to_string());
    }

    if let Some(target) = cli.target_final_value {
        if !target.is_finite() || target < 0.0 {
            return Err("targetFinalValue must be >= 0".to_string());
        }
    }

    Ok(SimulationParameters {
        annual_rate: cli.annual_rate,
        total_years: cli.total_years,
        contribution_years,
        starting_principal: cli.starting_principal,
        periodic_amount: cli.periodic_amount,
        withdrawal_mode: cli.withdrawal_mode.into(),
        target_final_value: cli.target_final_value,
        unknown: cli.unknown.map(Into::into),
        solver_override: None,
    })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/accumulation",
            get(accumulation_get_handler).post(accumulation_post_handler),
        )
        .route(
            "/api/distribution",
            get(distribution_get_handler).post(distribution_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("tsumitate HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn accumulation_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(ResponsePhase::Accumulation, payload).await
}

async fn accumulation_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(ResponsePhase::Accumulation, payload).await
}

async fn distribution_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(ResponsePhase::Distribution, payload).await
}

async fn distribution_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(ResponsePhase::Distribution, payload).await
}

async fn project_handler_impl(phase: ResponsePhase, payload: ProjectPayload) -> Response {
    let params = match parameters_from_payload(payload) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    // Engine-level failures (unreachable target etc.) are normal outcomes the
    // client renders, not HTTP errors.
    let outcome = match phase {
        ResponsePhase::Accumulation => project_accumulation(&params),
        ResponsePhase::Distribution => project_distribution(&params),
    };
    json_response(StatusCode::OK, build_project_response(phase, outcome))
}

fn build_project_response(phase: ResponsePhase, outcome: SimulationOutcome) -> ProjectResponse {
    let sustainable_forever = outcome
        .solved_value
        .is_some_and(|v| v.is_infinite() && v > 0.0);
    ProjectResponse {
        phase,
        succeeded: outcome.succeeded,
        solved_value: outcome.solved_value.filter(|v| v.is_finite()),
        sustainable_forever,
        error_reason: outcome.error_reason,
        series: outcome.series,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn parameters_from_json(json: &str) -> Result<SimulationParameters, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    parameters_from_payload(payload)
}

fn parameters_from_payload(payload: ProjectPayload) -> Result<SimulationParameters, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.annual_rate {
        cli.annual_rate = v;
    }
    if let Some(v) = payload.total_years {
        cli.total_years = v;
    }
    if let Some(v) = payload.contribution_years {
        cli.contribution_years = Some(v);
    }
    if let Some(v) = payload.starting_principal {
        cli.starting_principal = v;
    }
    if let Some(v) = payload.periodic_amount {
        cli.periodic_amount = v;
    }
    if let Some(v) = payload.withdrawal_mode {
        cli.withdrawal_mode = v.into();
    }
    if let Some(v) = payload.target_final_value {
        cli.target_final_value = Some(v);
    }
    if let Some(v) = payload.unknown {
        cli.unknown = Some(v.into());
    }

    build_parameters(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        annual_rate: 5.0,
        total_years: 30,
        contribution_years: None,
        starting_principal: 0.0,
        periodic_amount: 30_000.0,
        withdrawal_mode: CliWithdrawalMode::FixedAmount,
        target_final_value: None,
        unknown: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    #[test]
    fn build_parameters_defaults_contribution_years_to_total_years() {
        let mut cli = sample_cli();
        cli.total_years = 25;
        cli.contribution_years = None;

        let params = build_parameters(cli).expect("valid parameters");
        assert_eq!(params.contribution_years, 25);
    }

    #[test]
    fn build_parameters_rejects_contribution_years_beyond_horizon() {
        let mut cli = sample_cli();
        cli.total_years = 10;
        cli.contribution_years = Some(15);

        let err = build_parameters(cli).expect_err("must reject");
        assert!(err.contains("contributionYears"));
    }

    #[test]
    fn build_parameters_rejects_negative_principal() {
        let mut cli = sample_cli();
        cli.starting_principal = -1.0;

        let err = build_parameters(cli).expect_err("must reject");
        assert!(err.contains("startingPrincipal"));
    }

    #[test]
    fn build_parameters_rejects_oversized_horizon() {
        let mut cli = sample_cli();
        cli.total_years = 101;

        let err = build_parameters(cli).expect_err("must reject");
        assert!(err.contains("totalYears"));
    }

    #[test]
    fn build_parameters_rejects_negative_target() {
        let mut cli = sample_cli();
        cli.target_final_value = Some(-5.0);

        let err = build_parameters(cli).expect_err("must reject");
        assert!(err.contains("targetFinalValue"));
    }

    #[test]
    fn validation_errors_use_payload_field_names() {
        let json = r#"{ "totalYears": 101 }"#;
        let err = parameters_from_json(json).expect_err("must reject");
        assert_eq!(err, "totalYears must be <= 100");
    }

    #[test]
    fn parameters_from_json_parses_web_keys() {
        let json = r#"{
          "annualRate": 4.5,
          "totalYears": 35,
          "contributionYears": 20,
          "startingPrincipal": 1500000,
          "periodicAmount": 45000,
          "withdrawalMode": "percentage-of-balance",
          "targetFinalValue": 30000000,
          "unknown": "periodic-amount"
        }"#;
        let params = parameters_from_json(json).expect("json should parse");

        assert_approx(params.annual_rate, 4.5);
        assert_eq!(params.total_years, 35);
        assert_eq!(params.contribution_years, 20);
        assert_approx(params.starting_principal, 1_500_000.0);
        assert_approx(params.periodic_amount, 45_000.0);
        assert_eq!(params.withdrawal_mode, WithdrawalMode::PercentageOfBalance);
        assert_eq!(params.target_final_value, Some(30_000_000.0));
        assert_eq!(params.unknown, Some(UnknownField::PeriodicAmount));
    }

    #[test]
    fn parameters_from_json_accepts_aliases_and_defaults() {
        let json = r#"{
          "withdrawalMode": "fixed",
          "unknown": "startingPrincipal"
        }"#;
        let params = parameters_from_json(json).expect("json should parse");

        assert_eq!(params.withdrawal_mode, WithdrawalMode::FixedAmount);
        assert_eq!(params.unknown, Some(UnknownField::StartingPrincipal));
        // Untouched fields fall back to the documented defaults.
        assert_approx(params.annual_rate, 5.0);
        assert_eq!(params.total_years, 30);
        assert_approx(params.periodic_amount, 30_000.0);
    }

    #[test]
    fn parameters_from_json_rejects_unknown_enum_value() {
        let json = r#"{ "withdrawalMode": "lump-sum" }"#;
        let err = parameters_from_json(json).expect_err("must reject");
        assert!(err.contains("Invalid API JSON payload"));
    }

    #[test]
    fn response_serialization_contains_expected_fields() {
        let params = build_parameters(sample_cli()).expect("valid parameters");
        let outcome = project_accumulation(&params);
        let response = build_project_response(ResponsePhase::Accumulation, outcome);

        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"phase\":\"accumulation\""));
        assert!(json.contains("\"succeeded\":true"));
        assert!(json.contains("\"solvedValue\""));
        assert!(json.contains("\"sustainableForever\":false"));
        assert!(json.contains("\"series\""));
        assert!(json.contains("\"totalBalance\""));
        assert!(json.contains("\"principalToDate\""));
        assert!(json.contains("\"profit\""));
    }

    #[test]
    fn sustainable_distribution_maps_infinity_to_flag() {
        let mut cli = sample_cli();
        cli.starting_principal = 10_000_000.0;
        cli.annual_rate = 6.0;
        cli.periodic_amount = 40_000.0;

        let params = build_parameters(cli).expect("valid parameters");
        let outcome = project_distribution(&params);
        let response = build_project_response(ResponsePhase::Distribution, outcome);

        assert!(response.sustainable_forever);
        assert_eq!(response.solved_value, None);

        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"sustainableForever\":true"));
        assert!(json.contains("\"solvedValue\":null"));
    }

    #[test]
    fn engine_failure_is_a_successful_http_payload() {
        let mut cli = sample_cli();
        cli.target_final_value = Some(1_000_000.0);
        cli.unknown = Some(CliUnknownField::Rate);

        let params = build_parameters(cli).expect("valid parameters");
        let outcome = project_accumulation(&params);
        let response = build_project_response(ResponsePhase::Accumulation, outcome);

        assert!(!response.succeeded);
        assert!(response.series.is_empty());
        assert!(
            response
                .error_reason
                .as_deref()
                .expect("reason")
                .contains("unreachable")
        );
    }
}
