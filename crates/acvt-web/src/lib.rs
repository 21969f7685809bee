//! Axum + Askama admin console for ACVT.

use std::collections::BTreeMap;
use std::sync::Arc;

use acvt_backend::{AdminBackend, BackendError};
use acvt_core::{
    field_messages, humanize_key, AdminStatistics, ApprovalFilter, ApprovalStage, Employee,
    EmployeeForm, FieldMessage, IssuedCredentials, NormalizedComplaint, Page, Vendor, VendorForm,
};
use acvt_sync::{ComplaintFeed, ComplaintSnapshot, ConsoleConfig};
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

pub const CRATE_NAME: &str = "acvt-web";

pub const COMPLAINTS_FETCH_FAILED: &str = "Failed to fetch complaints. Please try again.";

pub struct AppState {
    pub config: ConsoleConfig,
    pub feed: ComplaintFeed,
}

impl AppState {
    pub fn new(config: ConsoleConfig, backend: Arc<dyn AdminBackend>) -> Self {
        Self {
            config,
            feed: ComplaintFeed::new(backend),
        }
    }

    pub fn from_config(config: ConsoleConfig) -> anyhow::Result<Self> {
        let backend = config.build_backend()?;
        Ok(Self::new(config, backend))
    }

    fn backend(&self) -> &Arc<dyn AdminBackend> {
        self.feed.backend()
    }
}

#[derive(Debug, Deserialize, Default)]
struct ComplaintsQuery {
    approval: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(Debug, Clone)]
struct ComplaintRow {
    id: String,
    title: String,
    employee_name: String,
    department: String,
    priority: String,
    status_key: String,
    status_label: String,
    stage_key: String,
    stage_label: String,
    submitted: String,
}

impl From<&NormalizedComplaint> for ComplaintRow {
    fn from(c: &NormalizedComplaint) -> Self {
        Self {
            id: c.id.clone(),
            title: c.title.clone(),
            employee_name: c.employee_name.clone(),
            department: c.department.clone(),
            priority: c.priority.to_string(),
            status_key: c.status.as_str().to_string(),
            status_label: c.status.label().to_string(),
            stage_key: c.approval_stage.as_str().to_string(),
            stage_label: c.approval_stage.label().to_string(),
            submitted: date_text(c.date_submitted),
        }
    }
}

fn date_text(date: Option<acvt_core::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Clone)]
struct FilterOption {
    key: String,
    label: String,
    selected: bool,
}

fn filter_options(filter: ApprovalFilter) -> Vec<FilterOption> {
    let mut options = vec![FilterOption {
        key: "all".into(),
        label: "All".into(),
        selected: filter == ApprovalFilter::All,
    }];
    options.extend(ApprovalStage::ALL.into_iter().map(|stage| FilterOption {
        key: stage.as_str().into(),
        label: stage.label().into(),
        selected: filter == ApprovalFilter::Stage(stage),
    }));
    options
}

#[derive(Debug, Clone)]
struct ResponseRow {
    sender: String,
    message: String,
    timestamp: String,
}

#[derive(Debug, Clone)]
struct CountRow {
    label: String,
    count: u64,
}

fn count_rows(counts: &BTreeMap<String, u64>) -> Vec<CountRow> {
    counts
        .iter()
        .map(|(key, count)| CountRow {
            label: humanize_key(key),
            count: *count,
        })
        .collect()
}

#[derive(Debug, Clone)]
struct RecentRow {
    id: String,
    title: String,
    employee_name: String,
    status_label: String,
    submitted: String,
}

#[derive(Debug, Clone)]
struct EmployeeRow {
    id: String,
    name: String,
    email: String,
    department: String,
    role: String,
    joined: String,
    /// Values for the inline edit form.
    form: EmployeeForm,
    editing: bool,
    errors: Vec<FieldMessage>,
}

impl From<&Employee> for EmployeeRow {
    fn from(e: &Employee) -> Self {
        Self {
            id: e.id.clone(),
            name: e.name.clone(),
            email: e.email.clone(),
            department: e.department.clone(),
            role: e.role.clone(),
            joined: date_text(e.joined_on()),
            form: EmployeeForm::from(e),
            editing: false,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct VendorRow {
    id: String,
    name: String,
    email: String,
    phone: String,
    service_type: String,
    address: String,
    contact_person: String,
    form: VendorForm,
    editing: bool,
    errors: Vec<FieldMessage>,
}

impl From<&Vendor> for VendorRow {
    fn from(v: &Vendor) -> Self {
        Self {
            id: v.id.clone(),
            name: v.name.clone(),
            email: v.email.clone(),
            phone: v.phone.clone(),
            service_type: v.service_type.clone(),
            address: v.address.clone().unwrap_or_default(),
            contact_person: v.contact_person.clone().unwrap_or_default(),
            form: VendorForm::from(v),
            editing: false,
            errors: Vec::new(),
        }
    }
}

/// What a mutation left behind for the next render of a management page.
#[derive(Debug, Default)]
struct Outcome<F> {
    notice: Option<String>,
    error: Option<String>,
    field_errors: Vec<FieldMessage>,
    credentials: Option<IssuedCredentials>,
    /// Rejected edit: record id and the values the user submitted.
    editing: Option<(String, F)>,
}

impl<F> Outcome<F> {
    fn rejected_edit(kind: &str, id: String, form: F, errors: &ValidationErrors) -> Self {
        Self {
            error: Some(format!("{kind} {id} was not updated.")),
            field_errors: field_messages(errors),
            editing: Some((id, form)),
            notice: None,
            credentials: None,
        }
    }

    /// Move field errors onto the edited row when it is on the page.
    fn attach_to_row(&mut self, id: &str) -> Option<(F, Vec<FieldMessage>)> {
        match self.editing.take() {
            Some((edit_id, form)) if edit_id == id => Some((form, std::mem::take(&mut self.field_errors))),
            other => {
                self.editing = other;
                None
            }
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    stats: AdminStatistics,
    complaint_status: Vec<CountRow>,
    asset_status: Vec<CountRow>,
    user_roles: Vec<CountRow>,
    recent: Vec<RecentRow>,
}

#[derive(Template)]
#[template(path = "complaints.html")]
struct ComplaintsTemplate {
    error: Option<String>,
    total: usize,
    pending_approval: usize,
    in_progress: usize,
    resolved: usize,
    filters: Vec<FilterOption>,
    approval: String,
    rows: Vec<ComplaintRow>,
    page: usize,
    per_page: usize,
    total_pages: usize,
    total_items: usize,
    prev_page: Option<usize>,
    next_page: Option<usize>,
}

#[derive(Template)]
#[template(path = "complaint_detail.html")]
struct ComplaintDetailTemplate {
    complaint: ComplaintRow,
    description: String,
    resolved: String,
    responses: Vec<ResponseRow>,
}

#[derive(Template)]
#[template(path = "employees.html")]
struct EmployeesTemplate {
    employees: Vec<EmployeeRow>,
    form: EmployeeForm,
    notice: Option<String>,
    error: Option<String>,
    field_errors: Vec<FieldMessage>,
    credentials: Option<IssuedCredentials>,
}

#[derive(Template)]
#[template(path = "vendors.html")]
struct VendorsTemplate {
    vendors: Vec<VendorRow>,
    form: VendorForm,
    notice: Option<String>,
    error: Option<String>,
    field_errors: Vec<FieldMessage>,
    credentials: Option<IssuedCredentials>,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    title: String,
    message: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/complaints", get(complaints_handler))
        .route("/complaints/{id}", get(complaint_detail_handler))
        .route("/api/complaints", get(api_complaints_handler))
        .route("/api/complaints/summary", get(api_summary_handler))
        .route("/employees", get(employees_handler).post(create_employee_handler))
        .route("/employees/{id}", post(update_employee_handler))
        .route("/employees/{id}/delete", post(delete_employee_handler))
        .route("/vendors", get(vendors_handler).post(create_vendor_handler))
        .route("/vendors/{id}", post(update_vendor_handler))
        .route("/vendors/{id}/delete", post(delete_vendor_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(Arc::new(state))
}

pub async fn serve(config: ConsoleConfig) -> anyhow::Result<()> {
    let port = config.web_port;
    let state = AppState::from_config(config)?;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, backend = state.backend().name(), "admin console listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(ConsoleConfig::from_env()?).await
}

async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.backend().statistics().await {
        Ok(stats) => {
            let recent = stats
                .recent_complaints
                .iter()
                .map(|c| RecentRow {
                    id: c.id.clone(),
                    title: c.title.clone(),
                    employee_name: c.employee_name.clone(),
                    status_label: c.lifecycle_status().label().to_string(),
                    submitted: date_text(acvt_core::timestamp_to_date(&c.date_submitted)),
                })
                .collect();
            render_html(DashboardTemplate {
                complaint_status: count_rows(&stats.complaint_status),
                asset_status: count_rows(&stats.asset_status),
                user_roles: count_rows(&stats.user_roles),
                recent,
                stats,
            })
        }
        Err(err) => backend_error(&err, "statistics"),
    }
}

/// Refresh the feed; on failure the previous snapshot stays visible.
async fn refreshed_snapshot(state: &AppState) -> (Arc<ComplaintSnapshot>, Option<String>) {
    match state.feed.refresh().await {
        Ok(outcome) => (outcome.snapshot().clone(), None),
        Err(_) => (state.feed.current().await, Some(COMPLAINTS_FETCH_FAILED.to_string())),
    }
}

async fn complaints_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ComplaintsQuery>,
) -> Response {
    let (snapshot, error) = refreshed_snapshot(&state).await;
    let summary = snapshot.summary();
    let filter = ApprovalFilter::parse(query.approval.as_deref().unwrap_or_default());
    let filtered = filter.apply(&snapshot.complaints);
    let page = Page::of(
        &filtered,
        query.page,
        query.per_page.or(Some(state.config.rows_per_page)),
    );

    render_html(ComplaintsTemplate {
        error,
        total: summary.total,
        pending_approval: summary.pending_approval,
        in_progress: summary.in_progress,
        resolved: summary.resolved,
        filters: filter_options(filter),
        approval: filter.as_str().to_string(),
        rows: page.items.iter().map(ComplaintRow::from).collect(),
        prev_page: page.has_prev().then(|| page.page - 1),
        next_page: page.has_next().then(|| page.page + 1),
        page: page.page,
        per_page: page.per_page,
        total_pages: page.total_pages,
        total_items: page.total_items,
    })
}

async fn complaint_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let mut snapshot = state.feed.current().await;
    if !snapshot.is_loaded() {
        snapshot = refreshed_snapshot(&state).await.0;
    }
    let Some(complaint) = snapshot.find(&id) else {
        return error_page(
            StatusCode::NOT_FOUND,
            "Complaint not found",
            &format!("No complaint with id {id}."),
        );
    };

    render_html(ComplaintDetailTemplate {
        complaint: ComplaintRow::from(complaint),
        description: complaint.description.clone(),
        resolved: date_text(complaint.date_resolved),
        responses: complaint
            .responses
            .iter()
            .map(|r| ResponseRow {
                sender: r.sender.as_str().to_string(),
                message: r.message.clone(),
                timestamp: r.timestamp.clone(),
            })
            .collect(),
    })
}

async fn api_complaints_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ComplaintsQuery>,
) -> Response {
    match state.feed.refresh().await {
        Ok(outcome) => {
            let filter = ApprovalFilter::parse(query.approval.as_deref().unwrap_or_default());
            Json(filter.apply(&outcome.snapshot().complaints)).into_response()
        }
        Err(_) => json_error(StatusCode::BAD_GATEWAY, COMPLAINTS_FETCH_FAILED),
    }
}

async fn api_summary_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.feed.refresh().await {
        Ok(outcome) => Json(outcome.snapshot().summary()).into_response(),
        Err(_) => json_error(StatusCode::BAD_GATEWAY, COMPLAINTS_FETCH_FAILED),
    }
}

async fn employees_page(
    state: &AppState,
    form: EmployeeForm,
    mut outcome: Outcome<EmployeeForm>,
    status: StatusCode,
) -> Response {
    match state.backend().list_employees().await {
        Ok(employees) => {
            let rows: Vec<EmployeeRow> = employees
                .iter()
                .map(|e| {
                    let mut row = EmployeeRow::from(e);
                    if let Some((submitted, errors)) = outcome.attach_to_row(&e.id) {
                        row.form = submitted;
                        row.errors = errors;
                        row.editing = true;
                    }
                    row
                })
                .collect();
            let mut resp = render_html(EmployeesTemplate {
                employees: rows,
                form,
                notice: outcome.notice,
                error: outcome.error,
                field_errors: outcome.field_errors,
                credentials: outcome.credentials,
            });
            if resp.status() == StatusCode::OK {
                *resp.status_mut() = status;
            }
            resp
        }
        Err(err) => backend_error(&err, "employees"),
    }
}

async fn employees_handler(State(state): State<Arc<AppState>>) -> Response {
    employees_page(&state, EmployeeForm::default(), Outcome::default(), StatusCode::OK).await
}

async fn create_employee_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<EmployeeForm>,
) -> Response {
    if let Err(errors) = form.validate() {
        let outcome = Outcome {
            field_errors: field_messages(&errors),
            ..Default::default()
        };
        return employees_page(&state, form, outcome, StatusCode::UNPROCESSABLE_ENTITY).await;
    }

    match state.backend().create_employee(&form).await {
        Ok(created) => {
            info!(id = %created.record.id, "employee created");
            let outcome = Outcome {
                notice: Some(format!("Employee {} created.", created.record.name)),
                credentials: created.credentials(),
                ..Default::default()
            };
            employees_page(&state, EmployeeForm::default(), outcome, StatusCode::OK).await
        }
        Err(err) => {
            let outcome = Outcome {
                error: Some(err.user_message("employee")),
                ..Default::default()
            };
            employees_page(&state, form, outcome, mutation_status(&err)).await
        }
    }
}

async fn update_employee_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(form): Form<EmployeeForm>,
) -> Response {
    if let Err(errors) = form.validate() {
        let outcome = Outcome::rejected_edit("Employee", id, form, &errors);
        return employees_page(&state, EmployeeForm::default(), outcome, StatusCode::UNPROCESSABLE_ENTITY).await;
    }
    match state.backend().update_employee(&id, &form).await {
        Ok(_) => Redirect::to("/employees").into_response(),
        Err(err) => mutation_error(&err, "employee"),
    }
}

async fn delete_employee_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.backend().delete_employee(&id).await {
        Ok(()) => Redirect::to("/employees").into_response(),
        Err(err) => mutation_error(&err, "employee"),
    }
}

async fn vendors_page(
    state: &AppState,
    form: VendorForm,
    mut outcome: Outcome<VendorForm>,
    status: StatusCode,
) -> Response {
    match state.backend().list_vendors().await {
        Ok(vendors) => {
            let rows: Vec<VendorRow> = vendors
                .iter()
                .map(|v| {
                    let mut row = VendorRow::from(v);
                    if let Some((submitted, errors)) = outcome.attach_to_row(&v.id) {
                        row.form = submitted;
                        row.errors = errors;
                        row.editing = true;
                    }
                    row
                })
                .collect();
            let mut resp = render_html(VendorsTemplate {
                vendors: rows,
                form,
                notice: outcome.notice,
                error: outcome.error,
                field_errors: outcome.field_errors,
                credentials: outcome.credentials,
            });
            if resp.status() == StatusCode::OK {
                *resp.status_mut() = status;
            }
            resp
        }
        Err(err) => backend_error(&err, "vendors"),
    }
}

async fn vendors_handler(State(state): State<Arc<AppState>>) -> Response {
    vendors_page(&state, VendorForm::default(), Outcome::default(), StatusCode::OK).await
}

async fn create_vendor_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<VendorForm>,
) -> Response {
    if let Err(errors) = form.validate() {
        let outcome = Outcome {
            field_errors: field_messages(&errors),
            ..Default::default()
        };
        return vendors_page(&state, form, outcome, StatusCode::UNPROCESSABLE_ENTITY).await;
    }

    match state.backend().create_vendor(&form).await {
        Ok(created) => {
            info!(id = %created.record.id, "vendor created");
            let outcome = Outcome {
                notice: Some(format!("Vendor {} created.", created.record.name)),
                credentials: created.credentials(),
                ..Default::default()
            };
            vendors_page(&state, VendorForm::default(), outcome, StatusCode::OK).await
        }
        Err(err) => {
            let outcome = Outcome {
                error: Some(err.user_message("vendor")),
                ..Default::default()
            };
            vendors_page(&state, form, outcome, mutation_status(&err)).await
        }
    }
}

async fn update_vendor_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Form(form): Form<VendorForm>,
) -> Response {
    if let Err(errors) = form.validate() {
        let outcome = Outcome::rejected_edit("Vendor", id, form, &errors);
        return vendors_page(&state, VendorForm::default(), outcome, StatusCode::UNPROCESSABLE_ENTITY).await;
    }
    match state.backend().update_vendor(&id, &form).await {
        Ok(_) => Redirect::to("/vendors").into_response(),
        Err(err) => mutation_error(&err, "vendor"),
    }
}

async fn delete_vendor_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.backend().delete_vendor(&id).await {
        Ok(()) => Redirect::to("/vendors").into_response(),
        Err(err) => mutation_error(&err, "vendor"),
    }
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.config.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    warn!(error = %err, "template rendering failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    let mut resp = render_html(ErrorTemplate {
        title: title.to_string(),
        message: message.to_string(),
    });
    if resp.status() == StatusCode::OK {
        *resp.status_mut() = status;
    }
    resp
}

fn backend_error(err: &BackendError, subject: &str) -> Response {
    warn!(subject, error = %err, "backend call failed");
    error_page(StatusCode::BAD_GATEWAY, "Backend unavailable", &err.user_message(subject))
}

fn mutation_status(err: &BackendError) -> StatusCode {
    if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_GATEWAY
    }
}

fn mutation_error(err: &BackendError, subject: &str) -> Response {
    warn!(subject, error = %err, "backend mutation failed");
    let title = if err.is_not_found() {
        "Not found"
    } else {
        "Backend unavailable"
    };
    error_page(mutation_status(err), title, &err.user_message(subject))
}

fn json_error(status: StatusCode, detail: &str) -> Response {
    (status, Json(serde_json::json!({ "detail": detail }))).into_response()
}
