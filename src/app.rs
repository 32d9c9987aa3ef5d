//! HTTP layer.
//!
//! Every browser session owns its own [`Logframe`], found through the
//! `portal_session` cookie and created on first use. The project portfolio is
//! shared by all sessions and written to disk after each change. A request
//! holds the lock of the state it touches while it changes it, so edits
//! from one session are applied one at a time.

use axum::{
    Json, Router,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::PortalConfig;
use crate::error::{PortalError, Result};
use crate::export::{build_document, export_xlsx, render_document_html};
use crate::import::{ImportReport, reconcile};
use crate::loader::{from_csv_str, from_xlsx_bytes};
use crate::logframe::{ActivityDraft, BudgetDraft, DanglingRef, DeleteReport, KpiDraft, Logframe};
use crate::model::{NodeRef, ProjectInfo};
use crate::numbering::{Numbering, compute_numbers};
use crate::portfolio::{
    self, ActivityInput, BudgetLineInput, BudgetTotals, FrameworkNode, FrameworkNodeInput,
    Indicator, IndicatorInput, PeriodStatus, PlannedBudgetLine, PortfolioActivity,
    PortfolioMetrics, PortfolioStore, Project, ProjectInput, QaStatus, RecentEntry,
    ReportingPeriod, RowId, StrategicIndicatorInput, StrategicStatus, UpsertSummary,
};
use crate::saving;

pub const SESSION_COOKIE: &str = "portal_session";

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

struct SessionEntry {
    logframe: Logframe,
    last_seen: Instant,
}

pub struct AppState {
    config: PortalConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    portfolio: Mutex<PortfolioStore>,
    snapshot_lock: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl AppState {
    pub fn new(config: PortalConfig, portfolio: PortfolioStore) -> Self {
        AppState {
            config,
            sessions: Mutex::new(HashMap::new()),
            portfolio: Mutex::new(portfolio),
            snapshot_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run `f` against the logframe of session `id`, creating it if needed.
    /// Idle sessions past the configured lifetime are dropped first.
    fn with_logframe<T>(&self, id: &str, f: impl FnOnce(&mut Logframe) -> Result<T>) -> Result<T> {
        let ttl = Duration::from_secs(self.config.session_ttl);
        let mut sessions = lock(&self.sessions);
        sessions.retain(|_, entry| entry.last_seen.elapsed() < ttl);

        let entry = sessions
            .entry(id.to_string())
            .or_insert_with(|| SessionEntry {
                logframe: Logframe::new(),
                last_seen: Instant::now(),
            });
        entry.last_seen = Instant::now();
        f(&mut entry.logframe)
    }

    fn read_portfolio<T>(&self, f: impl FnOnce(&PortfolioStore) -> T) -> T {
        f(&lock(&self.portfolio))
    }

    /// Apply a change to the portfolio and persist it when it succeeded.
    ///
    /// The snapshot is written on the blocking pool from a copy taken after
    /// the change, one save at a time, so a later save never loses to an
    /// earlier one.
    async fn mutate_portfolio<T>(&self, f: impl FnOnce(&mut PortfolioStore) -> Result<T>) -> Result<T> {
        let value = {
            let mut store = lock(&self.portfolio);
            f(&mut store)?
        };

        let _saving = self.snapshot_lock.lock().await;
        let store = lock(&self.portfolio).clone();
        let path = self.config.portfolio_snapshot_path();
        let saved = tokio::task::spawn_blocking({
            let path = path.clone();
            move || saving::save_portfolio(&store, &path)
        })
        .await;
        match saved {
            Ok(Ok(())) => {}
            // The change stays in memory and is written with the next save.
            Ok(Err(e)) => error!("could not persist portfolio to {}: {}", path.display(), e),
            Err(e) => error!("portfolio save task failed: {}", e),
        }
        Ok(value)
    }
}

type SharedState = Arc<AppState>;

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

#[derive(Serialize)]
struct Created<T> {
    id: T,
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = match &self {
            PortalError::Validation { .. } | PortalError::Import { .. } => StatusCode::BAD_REQUEST,
            #[cfg(feature = "xlsx")]
            PortalError::Calamine(_) => StatusCode::BAD_REQUEST,
            PortalError::NotFound { .. } => StatusCode::NOT_FOUND,
            PortalError::Duplicate { .. } => StatusCode::CONFLICT,
            PortalError::MissingDependency { .. } => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        (
            status,
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some(self.to_string()),
            }),
        )
            .into_response()
    }
}

fn ok() -> StatusResponse {
    StatusResponse {
        status: "ok".to_string(),
        message: None,
    }
}

/// Session id from the cookie, or a fresh one added to the jar.
fn session_id(jar: CookieJar) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = cookie.value().to_string();
        return (jar, id);
    }
    let id = Uuid::new_v4().to_string();
    let mut cookie = Cookie::new(SESSION_COOKIE, id.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    (jar.add(cookie), id)
}

fn respond<T: Serialize>(jar: CookieJar, result: Result<T>) -> Response {
    match result {
        Ok(value) => (jar, Json(value)).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

/// Run `f` on the caller's logframe and answer with its JSON result.
fn session_call<T: Serialize>(
    state: &AppState,
    jar: CookieJar,
    f: impl FnOnce(&mut Logframe) -> Result<T>,
) -> Response {
    let (jar, id) = session_id(jar);
    let result = state.with_logframe(&id, f);
    respond(jar, result)
}

/// Start the server and block until it stops.
pub async fn run(config: PortalConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let portfolio = saving::load_portfolio_or_default(config.portfolio_snapshot_path())?;
    info!(
        "portfolio loaded: {} project(s) from {}",
        portfolio.projects.len(),
        config.portfolio_snapshot_path().display()
    );

    let bind_addr = config.bind_addr.clone();
    let app = router(Arc::new(AppState::new(config, portfolio)));

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(export_document))
        // Logframe of the current session
        .route("/api/logframe", get(get_logframe))
        .route("/api/logframe/check", get(check_logframe))
        .route("/api/project", put(set_project_info))
        .route("/api/goals", post(add_goal))
        .route("/api/goals/:id", put(rename_goal).delete(delete_goal))
        .route("/api/outcomes", post(add_outcome))
        .route("/api/outcomes/:id", put(update_outcome).delete(delete_outcome))
        .route("/api/outputs", post(add_output))
        .route("/api/outputs/:id", put(update_output).delete(delete_output))
        .route("/api/kpis", post(add_kpi))
        .route("/api/kpis/:id", put(update_kpi).delete(remove_kpi))
        .route("/api/activities", post(add_activity))
        .route("/api/activities/:id", put(update_activity).delete(remove_activity))
        .route("/api/budget", post(add_budget_line))
        .route("/api/budget/:id", put(update_budget_line).delete(remove_budget_line))
        .route("/api/export/xlsx", get(export_workbook))
        .route("/api/export/document", get(export_document))
        .route("/api/import", post(import_workbook))
        // Portfolio
        .route(
            "/api/portfolio/projects",
            get(list_projects).post(create_project).delete(delete_all_projects),
        )
        .route(
            "/api/portfolio/projects/:id",
            get(project_detail).put(update_project).delete(delete_project),
        )
        .route("/api/portfolio/projects/:id/periods", post(generate_periods))
        .route("/api/portfolio/nodes", post(add_framework_node))
        .route("/api/portfolio/indicators", post(add_indicator))
        .route("/api/portfolio/activities", post(add_portfolio_activity))
        .route("/api/portfolio/budget-lines", post(add_portfolio_budget_line))
        .route("/api/portfolio/targets", put(upsert_target))
        .route("/api/portfolio/actuals", put(upsert_actual))
        .route("/api/portfolio/periods/:id/status", put(set_period_status))
        .route("/api/portfolio/periods/generate", post(generate_missing_periods))
        .route("/api/portfolio/periods/overdue", post(mark_overdue))
        .route("/api/portfolio/strategic", post(add_strategic_indicator))
        .route("/api/portfolio/mappings", post(map_indicator))
        .route("/api/portfolio/dashboard", get(dashboard))
        .route("/api/admin/projects.csv", get(export_projects_csv))
        .route("/api/admin/projects", post(upsert_projects))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---- logframe handlers ----

#[derive(Serialize)]
struct LogframeView {
    logframe: Logframe,
    numbering: Numbering,
    funding_total: f64,
}

#[derive(Deserialize)]
struct NameForm {
    name: String,
}

#[derive(Deserialize)]
struct OutcomeForm {
    name: String,
    goal_id: String,
}

#[derive(Deserialize)]
struct OutputForm {
    name: String,
    #[serde(default)]
    assumptions: String,
    outcome_id: String,
}

async fn get_logframe(State(state): State<SharedState>, jar: CookieJar) -> Response {
    session_call(&state, jar, |lf| {
        Ok(LogframeView {
            numbering: compute_numbers(lf, true),
            funding_total: lf.funding_total(),
            logframe: lf.clone(),
        })
    })
}

async fn check_logframe(State(state): State<SharedState>, jar: CookieJar) -> Response {
    session_call(&state, jar, |lf| -> Result<Vec<DanglingRef>> {
        Ok(lf.dangling_references())
    })
}

async fn set_project_info(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(info): Json<ProjectInfo>,
) -> Response {
    session_call(&state, jar, |lf| lf.set_project_info(info).map(|_| ok()))
}

async fn add_goal(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(form): Json<NameForm>,
) -> Response {
    session_call(&state, jar, |lf| lf.add_goal(&form.name).map(|id| Created { id }))
}

async fn rename_goal(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(form): Json<NameForm>,
) -> Response {
    session_call(&state, jar, |lf| lf.rename_goal(&id, &form.name).map(|_| ok()))
}

async fn delete_goal(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    session_call(&state, jar, |lf| -> Result<DeleteReport> {
        lf.delete(&NodeRef::Goal(id))
    })
}

async fn add_outcome(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(form): Json<OutcomeForm>,
) -> Response {
    session_call(&state, jar, |lf| {
        lf.add_outcome(&form.name, &form.goal_id).map(|id| Created { id })
    })
}

async fn update_outcome(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(form): Json<OutcomeForm>,
) -> Response {
    session_call(&state, jar, |lf| {
        lf.update_outcome(&id, &form.name, &form.goal_id).map(|_| ok())
    })
}

async fn delete_outcome(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    session_call(&state, jar, |lf| lf.delete(&NodeRef::Outcome(id)))
}

async fn add_output(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(form): Json<OutputForm>,
) -> Response {
    session_call(&state, jar, |lf| {
        lf.add_output(&form.name, &form.assumptions, &form.outcome_id)
            .map(|id| Created { id })
    })
}

async fn update_output(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(form): Json<OutputForm>,
) -> Response {
    session_call(&state, jar, |lf| {
        lf.update_output(&id, &form.name, &form.assumptions, &form.outcome_id)
            .map(|_| ok())
    })
}

async fn delete_output(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    session_call(&state, jar, |lf| lf.delete(&NodeRef::Output(id)))
}

async fn add_kpi(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(draft): Json<KpiDraft>,
) -> Response {
    session_call(&state, jar, |lf| lf.add_kpi(&draft).map(|id| Created { id }))
}

async fn update_kpi(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(draft): Json<KpiDraft>,
) -> Response {
    session_call(&state, jar, |lf| lf.update_kpi(&id, &draft).map(|_| ok()))
}

async fn remove_kpi(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    session_call(&state, jar, |lf| lf.remove_kpi(&id).map(|_| ok()))
}

async fn add_activity(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(draft): Json<ActivityDraft>,
) -> Response {
    session_call(&state, jar, |lf| lf.add_activity(&draft).map(|id| Created { id }))
}

async fn update_activity(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(draft): Json<ActivityDraft>,
) -> Response {
    session_call(&state, jar, |lf| lf.update_activity(&id, &draft).map(|_| ok()))
}

async fn remove_activity(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    session_call(&state, jar, |lf| lf.remove_activity(&id).map(|_| ok()))
}

async fn add_budget_line(
    State(state): State<SharedState>,
    jar: CookieJar,
    Json(draft): Json<BudgetDraft>,
) -> Response {
    session_call(&state, jar, |lf| {
        lf.add_budget_line(&draft).map(|id| Created { id })
    })
}

async fn update_budget_line(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(draft): Json<BudgetDraft>,
) -> Response {
    session_call(&state, jar, |lf| {
        lf.update_budget_line(&id, &draft).map(|_| ok())
    })
}

async fn remove_budget_line(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Response {
    session_call(&state, jar, |lf| lf.remove_budget_line(&id).map(|_| ok()))
}

async fn export_workbook(State(state): State<SharedState>, jar: CookieJar) -> Response {
    let (jar, id) = session_id(jar);
    match state.with_logframe(&id, |lf| export_xlsx(lf)) {
        Ok(bytes) => (
            jar,
            [
                (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"logframe.xlsx\"",
                ),
            ],
            Body::from(bytes),
        )
            .into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

async fn export_document(State(state): State<SharedState>, jar: CookieJar) -> Response {
    let (jar, id) = session_id(jar);
    match state.with_logframe(&id, |lf| render_document_html(&build_document(lf))) {
        Ok(html) => (jar, Html(html)).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

/// Name, file name and bytes of the first multipart field called `field`.
async fn read_upload(mut multipart: Multipart, field: &str) -> Result<(String, Vec<u8>)> {
    while let Ok(Some(part)) = multipart.next_field().await {
        if part.name() != Some(field) {
            continue;
        }
        let file_name = part.file_name().unwrap_or_default().to_string();
        let bytes = part
            .bytes()
            .await
            .map_err(|e| PortalError::validation(field, e.to_string()))?;
        if bytes.is_empty() {
            break;
        }
        return Ok((file_name, bytes.to_vec()));
    }
    Err(PortalError::validation(field, "No file data received"))
}

async fn import_workbook(
    State(state): State<SharedState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
    let (jar, id) = session_id(jar);
    let result: Result<ImportReport> = async {
        let (_, bytes) = read_upload(multipart, "file").await?;
        // Parse before taking the session lock.
        let book = from_xlsx_bytes(&bytes)?;
        let order = state.config.date_order;
        state.with_logframe(&id, |lf| -> Result<ImportReport> { reconcile(&book, lf, order) })
    }
    .await;
    respond(jar, result)
}

// ---- portfolio handlers ----

#[derive(Serialize)]
struct ProjectDetail {
    project: Project,
    progress_pct: u8,
    budget: BudgetTotals,
    nodes: Vec<FrameworkNode>,
    indicators: Vec<Indicator>,
    periods: Vec<ReportingPeriod>,
    activities: Vec<PortfolioActivity>,
    budget_lines: Vec<PlannedBudgetLine>,
}

#[derive(Serialize)]
struct DashboardView {
    metrics: PortfolioMetrics,
    recent: Vec<RecentEntry>,
    strategic: Vec<StrategicStatus>,
}

#[derive(Deserialize)]
struct DashboardQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct TargetForm {
    indicator_id: RowId,
    period_id: RowId,
    value: f64,
}

#[derive(Deserialize)]
struct ActualForm {
    indicator_id: RowId,
    period_id: RowId,
    value: f64,
    #[serde(default)]
    qa_status: QaStatus,
}

#[derive(Deserialize)]
struct PeriodStatusForm {
    status: PeriodStatus,
}

#[derive(Deserialize)]
struct MappingForm {
    indicator_id: RowId,
    strategic_indicator_id: RowId,
}

#[derive(Serialize)]
struct Count {
    count: usize,
}

async fn list_projects(State(state): State<SharedState>) -> Json<Vec<Project>> {
    Json(state.read_portfolio(|store| store.projects.values().cloned().collect()))
}

async fn project_detail(State(state): State<SharedState>, Path(id): Path<RowId>) -> Response {
    let today = today();
    let result = state.read_portfolio(|store| -> Result<ProjectDetail> {
        let project = store.project(id)?.clone();
        Ok(ProjectDetail {
            progress_pct: portfolio::project_progress_pct(project.start_date, project.end_date, today),
            budget: portfolio::budget_totals(store, id),
            nodes: store.nodes_of(id).into_iter().cloned().collect(),
            indicators: store.indicators_of(id).cloned().collect(),
            periods: store.periods_of(id).cloned().collect(),
            activities: store.activities_of(id).cloned().collect(),
            budget_lines: store.budget_lines_of(id).cloned().collect(),
            project,
        })
    });
    match result {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => e.into_response(),
    }
}

fn portfolio_response<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Creating a project also lays out its reporting periods.
async fn create_project(
    State(state): State<SharedState>,
    Json(input): Json<ProjectInput>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            let id = store.create_project(&input, today())?;
            portfolio::generate_reporting_periods(store, id)?;
            Ok(Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn update_project(
    State(state): State<SharedState>,
    Path(id): Path<RowId>,
    Json(input): Json<ProjectInput>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.update_project(id, &input, today()).map(|_| ok())
        })
        .await;
    portfolio_response(result)
}

async fn delete_project(State(state): State<SharedState>, Path(id): Path<RowId>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.delete_project(id).map(|count| Count { count })
        })
        .await;
    portfolio_response(result)
}

async fn delete_all_projects(State(state): State<SharedState>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            Ok(Count {
                count: store.delete_all_projects(),
            })
        })
        .await;
    portfolio_response(result)
}

async fn generate_periods(State(state): State<SharedState>, Path(id): Path<RowId>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            portfolio::generate_reporting_periods(store, id).map(|count| Count { count })
        })
        .await;
    portfolio_response(result)
}

/// Lay out periods for every project that has none yet.
async fn generate_missing_periods(State(state): State<SharedState>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            portfolio::generate_missing_periods(store).map(|count| Count { count })
        })
        .await;
    portfolio_response(result)
}

async fn add_framework_node(
    State(state): State<SharedState>,
    Json(input): Json<FrameworkNodeInput>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.add_framework_node(&input).map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn add_indicator(
    State(state): State<SharedState>,
    Json(input): Json<IndicatorInput>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.add_indicator(&input).map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn add_portfolio_activity(
    State(state): State<SharedState>,
    Json(input): Json<ActivityInput>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.add_activity(&input).map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn add_portfolio_budget_line(
    State(state): State<SharedState>,
    Json(input): Json<BudgetLineInput>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.add_budget_line(&input).map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn upsert_target(State(state): State<SharedState>, Json(form): Json<TargetForm>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store
                .upsert_target(form.indicator_id, form.period_id, form.value)
                .map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn upsert_actual(State(state): State<SharedState>, Json(form): Json<ActualForm>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store
                .upsert_actual(form.indicator_id, form.period_id, form.value, form.qa_status)
                .map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn set_period_status(
    State(state): State<SharedState>,
    Path(id): Path<RowId>,
    Json(form): Json<PeriodStatusForm>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.set_period_status(id, form.status).map(|_| ok())
        })
        .await;
    portfolio_response(result)
}

async fn mark_overdue(State(state): State<SharedState>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            Ok(Count {
                count: portfolio::mark_overdue_periods(store, today()),
            })
        })
        .await;
    portfolio_response(result)
}

async fn add_strategic_indicator(
    State(state): State<SharedState>,
    Json(input): Json<StrategicIndicatorInput>,
) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store.add_strategic_indicator(&input).map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn map_indicator(State(state): State<SharedState>, Json(form): Json<MappingForm>) -> Response {
    let result = state
        .mutate_portfolio(|store| {
            store
                .map_indicator(form.indicator_id, form.strategic_indicator_id)
                .map(|id| Created { id })
        })
        .await;
    portfolio_response(result)
}

async fn dashboard(
    State(state): State<SharedState>,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardView> {
    let today = today();
    Json(state.read_portfolio(|store| DashboardView {
        metrics: portfolio::portfolio_metrics(store, today),
        recent: portfolio::recent_activity(store, query.limit.unwrap_or(8), today),
        strategic: portfolio::strategic_status(store),
    }))
}

async fn export_projects_csv(State(state): State<SharedState>) -> Response {
    let csv = state.read_portfolio(portfolio::export_projects_csv);
    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"projects_export.csv\"",
            ),
        ],
        csv,
    )
        .into_response()
}

async fn upsert_projects(State(state): State<SharedState>, multipart: Multipart) -> Response {
    let result: Result<UpsertSummary> = async {
        let (file_name, bytes) = read_upload(multipart, "file").await?;
        let sheet = if file_name.to_lowercase().ends_with(".xlsx") {
            from_xlsx_bytes(&bytes)?
                .sheets
                .into_iter()
                .next()
                .ok_or_else(|| PortalError::validation("file", "workbook has no sheets"))?
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|_| PortalError::validation("file", "CSV must be UTF-8"))?;
            from_csv_str("projects", &text)
        };
        let order = state.config.date_order;
        state
            .mutate_portfolio(|store| -> Result<UpsertSummary> {
                portfolio::upsert_projects(store, &sheet, today(), order)
            })
            .await
    }
    .await;
    portfolio_response(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::ProjectStatus;

    fn input(title: &str) -> ProjectInput {
        ProjectInput {
            title: title.into(),
            description: String::new(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
            status: ProjectStatus::Planned,
            manager_user: "lead@example.org".into(),
            funder: "Open Fund".into(),
            overhead_rate: 0.1,
            notes: String::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_change_reaches_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = PortalConfig {
            data_dir: dir.path().join("data"),
            ..PortalConfig::default()
        };
        let path = config.portfolio_snapshot_path();
        let state = Arc::new(AppState::new(config, PortfolioStore::new()));

        let (a, b) = tokio::join!(
            state.mutate_portfolio(|store| store.create_project(&input("Wells"), today())),
            state.mutate_portfolio(|store| store.create_project(&input("Schools"), today())),
        );
        assert!(a.is_ok() && b.is_ok());

        let failed = state
            .mutate_portfolio(|store| store.create_project(&input(""), today()))
            .await;
        assert!(failed.is_err());

        let saved = saving::load_portfolio_or_default(&path).unwrap();
        assert_eq!(saved.projects.len(), 2);
        assert_eq!(saved, *lock(&state.portfolio));
    }
}
