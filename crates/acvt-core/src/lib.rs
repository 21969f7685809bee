//! Core domain model and complaint status projection for ACVT.
//!
//! Everything in here is pure: backend records go in, UI-facing records come
//! out. Unknown or missing values fall back to documented defaults instead of
//! producing errors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationErrors};

pub use chrono::NaiveDate;

pub const CRATE_NAME: &str = "acvt-core";

pub const UNKNOWN_EMPLOYEE: &str = "Unknown Employee";
pub const UNKNOWN_DEPARTMENT: &str = "Unknown Department";

/// Rows per page in the complaints table when the caller does not ask for more.
pub const DEFAULT_ROWS_PER_PAGE: usize = 5;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Employee reference embedded in a backend complaint record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawEmployeeRef {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

/// Reply attached to a backend complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawReply {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from_user: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,
}

/// Complaint exactly as the backend returns it. Every field tolerates absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawComplaint {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employee_id: String,
    #[serde(default)]
    pub employee: Option<RawEmployeeRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date_submitted: String,
    #[serde(default)]
    pub resolution_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub replies: Vec<RawReply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Case-insensitive; absent, empty or unrecognized labels become `Medium`.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            _ => Self::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse UI-facing complaint state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStatus {
    #[default]
    New,
    InProgress,
    Resolved,
    Closed,
}

impl LifecycleStatus {
    pub const ALL: [LifecycleStatus; 4] = [Self::New, Self::InProgress, Self::Resolved, Self::Closed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in-progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which approval tier a complaint awaits, or how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    #[default]
    PendingAts,
    PendingAssistantManager,
    PendingManager,
    Approved,
    Rejected,
}

impl ApprovalStage {
    pub const ALL: [ApprovalStage; 5] = [
        Self::PendingAts,
        Self::PendingAssistantManager,
        Self::PendingManager,
        Self::Approved,
        Self::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingAts => "pending_ats",
            Self::PendingAssistantManager => "pending_assistant_manager",
            Self::PendingManager => "pending_manager",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PendingAts => "Pending ATS",
            Self::PendingAssistantManager => "Pending Assistant Manager",
            Self::PendingManager => "Pending Manager",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Exact key lookup, used for filter values. Not the backend mapping.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == key)
    }

    /// True when the stage key contains "pending".
    pub fn is_pending(self) -> bool {
        self.as_str().contains("pending")
    }
}

impl fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Manager,
    Employee,
}

impl Sender {
    /// Only the literal tag `employee` is an employee; every other tag is a manager.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "employee" {
            Self::Employee
        } else {
            Self::Manager
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintResponse {
    pub id: String,
    pub message: String,
    #[serde(rename = "from")]
    pub sender: Sender,
    pub timestamp: String,
}

/// Complaint in the shape the console renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedComplaint {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: LifecycleStatus,
    pub approval_stage: ApprovalStage,
    pub date_submitted: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_resolved: Option<NaiveDate>,
    pub responses: Vec<ComplaintResponse>,
}

pub fn map_lifecycle_status(raw_status: &str) -> LifecycleStatus {
    match raw_status.to_lowercase().as_str() {
        "open" | "submitted" => LifecycleStatus::New,
        "in_progress" | "forwarded" | "pending_approval" => LifecycleStatus::InProgress,
        "resolved" => LifecycleStatus::Resolved,
        "closed" | "rejected" => LifecycleStatus::Closed,
        _ => LifecycleStatus::New,
    }
}

pub fn map_approval_stage(raw_status: &str) -> ApprovalStage {
    match raw_status.to_lowercase().as_str() {
        "open" | "submitted" => ApprovalStage::PendingAts,
        "forwarded" => ApprovalStage::PendingAssistantManager,
        "pending_approval" => ApprovalStage::PendingManager,
        "resolved" => ApprovalStage::Approved,
        "rejected" => ApprovalStage::Rejected,
        _ => ApprovalStage::PendingAts,
    }
}

/// Calendar date of a backend timestamp. Offsets are converted to UTC first;
/// naive timestamps are taken as-is. Unparseable input yields `None`.
pub fn timestamp_to_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub fn normalize_complaint(raw: &RawComplaint) -> NormalizedComplaint {
    let employee = raw.employee.as_ref();
    NormalizedComplaint {
        id: raw.id.clone(),
        employee_id: raw.employee_id.clone(),
        employee_name: non_empty(employee.and_then(|e| e.name.as_deref()))
            .unwrap_or(UNKNOWN_EMPLOYEE)
            .to_string(),
        department: non_empty(employee.and_then(|e| e.department.as_deref()))
            .unwrap_or(UNKNOWN_DEPARTMENT)
            .to_string(),
        title: raw.title.clone(),
        description: raw.description.clone(),
        priority: Priority::parse_or_default(raw.priority.as_deref()),
        status: map_lifecycle_status(&raw.status),
        approval_stage: map_approval_stage(&raw.status),
        date_submitted: timestamp_to_date(&raw.date_submitted),
        date_resolved: raw.resolution_date.as_deref().and_then(timestamp_to_date),
        responses: raw
            .replies
            .iter()
            .map(|reply| ComplaintResponse {
                id: reply.id.clone(),
                message: reply.message.clone(),
                sender: Sender::from_tag(&reply.from_user),
                timestamp: reply.timestamp.clone(),
            })
            .collect(),
    }
}

pub fn normalize_complaints(raw: &[RawComplaint]) -> Vec<NormalizedComplaint> {
    raw.iter().map(normalize_complaint).collect()
}

/// Counter cards shown above the complaints table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComplaintSummary {
    pub total: usize,
    pub pending_approval: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

impl ComplaintSummary {
    pub fn from_complaints(complaints: &[NormalizedComplaint]) -> Self {
        Self {
            total: complaints.len(),
            pending_approval: complaints
                .iter()
                .filter(|c| c.approval_stage.is_pending())
                .count(),
            in_progress: complaints
                .iter()
                .filter(|c| c.status == LifecycleStatus::InProgress)
                .count(),
            resolved: complaints
                .iter()
                .filter(|c| c.status == LifecycleStatus::Resolved)
                .count(),
        }
    }
}

pub fn count_by_stage(complaints: &[NormalizedComplaint]) -> BTreeMap<ApprovalStage, usize> {
    let mut counts = BTreeMap::new();
    for complaint in complaints {
        *counts.entry(complaint.approval_stage).or_default() += 1;
    }
    counts
}

pub fn count_by_status(complaints: &[NormalizedComplaint]) -> BTreeMap<LifecycleStatus, usize> {
    let mut counts = BTreeMap::new();
    for complaint in complaints {
        *counts.entry(complaint.status).or_default() += 1;
    }
    counts
}

/// User-selected approval filter for the complaints table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalFilter {
    #[default]
    All,
    Stage(ApprovalStage),
}

impl ApprovalFilter {
    /// Unknown values select everything.
    pub fn parse(raw: &str) -> Self {
        ApprovalStage::from_key(raw.trim())
            .map(Self::Stage)
            .unwrap_or(Self::All)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Stage(stage) => stage.as_str(),
        }
    }

    pub fn matches(&self, complaint: &NormalizedComplaint) -> bool {
        match self {
            Self::All => true,
            Self::Stage(stage) => complaint.approval_stage == *stage,
        }
    }

    pub fn apply(&self, complaints: &[NormalizedComplaint]) -> Vec<NormalizedComplaint> {
        complaints
            .iter()
            .filter(|c| self.matches(c))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T: Clone> Page<T> {
    /// One-based page of `all`; out-of-range pages are clamped.
    pub fn of(all: &[T], page: Option<usize>, per_page: Option<usize>) -> Self {
        let per_page = per_page.unwrap_or(DEFAULT_ROWS_PER_PAGE).max(1);
        let total_pages = all.len().max(1).div_ceil(per_page);
        let page = page.unwrap_or(1).clamp(1, total_pages);
        let items = all
            .iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();
        Self {
            items,
            page,
            per_page,
            total_items: all.len(),
            total_pages,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Employee {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub department: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default)]
    pub date_joined: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl Employee {
    pub fn joined_on(&self) -> Option<NaiveDate> {
        self.date_joined.as_deref().and_then(timestamp_to_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Validate)]
pub struct EmployeeForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
}

impl From<&Employee> for EmployeeForm {
    fn from(employee: &Employee) -> Self {
        Self {
            name: employee.name.clone(),
            email: employee.email.clone(),
            department: employee.department.clone(),
            role: employee.role.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Vendor {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_type: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Validate)]
pub struct VendorForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Service type is required"))]
    pub service_type: String,
    #[serde(default)]
    pub contact_person: String,
}

impl From<&Vendor> for VendorForm {
    fn from(vendor: &Vendor) -> Self {
        Self {
            name: vendor.name.clone(),
            email: vendor.email.clone(),
            phone: vendor.phone.clone(),
            address: vendor.address.clone().unwrap_or_default(),
            service_type: vendor.service_type.clone(),
            contact_person: vendor.contact_person.clone().unwrap_or_default(),
        }
    }
}

/// One validation message per offending field, sorted by field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMessage {
    pub field: String,
    pub message: String,
}

pub fn field_messages(errors: &ValidationErrors) -> Vec<FieldMessage> {
    let mut out: Vec<FieldMessage> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| FieldMessage {
                field: field.to_string(),
                message: e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid")),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

/// Login issued by the backend when an employee or vendor is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredentials {
    pub username: String,
    pub temp_password: String,
}

/// Create responses carry the record plus one-time credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithCredentials<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub temp_password: Option<String>,
}

impl<T> WithCredentials<T> {
    pub fn credentials(&self) -> Option<IssuedCredentials> {
        let username = non_empty(self.username.as_deref())?;
        let temp_password = non_empty(self.temp_password.as_deref())?;
        Some(IssuedCredentials {
            username: username.to_string(),
            temp_password: temp_password.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EntityCounts {
    pub employees: u64,
    pub assets: u64,
    pub complaints: u64,
    pub vendors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecentComplaint {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date_submitted: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub employee_name: String,
}

impl RecentComplaint {
    pub fn lifecycle_status(&self) -> LifecycleStatus {
        map_lifecycle_status(&self.status)
    }
}

/// Payload of the backend's admin statistics endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdminStatistics {
    pub counts: EntityCounts,
    pub asset_status: BTreeMap<String, u64>,
    pub complaint_status: BTreeMap<String, u64>,
    pub user_roles: BTreeMap<String, u64>,
    pub recent_complaints: Vec<RecentComplaint>,
    pub ats_complaints: u64,
    pub assistant_manager_complaints: u64,
    pub manager_complaints: u64,
    pub active_complaints: u64,
}

/// "in_progress" -> "In Progress", as the dashboard labels chart buckets.
pub fn humanize_key(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_status(status: &str) -> RawComplaint {
        RawComplaint {
            id: "c-1".into(),
            employee_id: "e-1".into(),
            title: "Broken monitor".into(),
            description: "Flickers constantly".into(),
            status: status.into(),
            date_submitted: "2024-03-04T09:15:00Z".into(),
            ..Default::default()
        }
    }

    #[test]
    fn open_and_submitted_are_new_and_pending_ats_in_any_case() {
        for raw in ["open", "OPEN", "submitted", "Submitted"] {
            assert_eq!(map_lifecycle_status(raw), LifecycleStatus::New, "{raw}");
            assert_eq!(map_approval_stage(raw), ApprovalStage::PendingAts, "{raw}");
        }
    }

    #[test]
    fn working_statuses_are_in_progress() {
        for raw in ["in_progress", "forwarded", "pending_approval", "Forwarded"] {
            assert_eq!(map_lifecycle_status(raw), LifecycleStatus::InProgress, "{raw}");
        }
        assert_eq!(map_approval_stage("forwarded"), ApprovalStage::PendingAssistantManager);
        assert_eq!(map_approval_stage("PENDING_APPROVAL"), ApprovalStage::PendingManager);
        assert_eq!(map_approval_stage("in_progress"), ApprovalStage::PendingAts);
    }

    #[test]
    fn terminal_statuses() {
        assert_eq!(map_lifecycle_status("resolved"), LifecycleStatus::Resolved);
        assert_eq!(map_approval_stage("resolved"), ApprovalStage::Approved);
        assert_eq!(map_lifecycle_status("closed"), LifecycleStatus::Closed);
        assert_eq!(map_lifecycle_status("rejected"), LifecycleStatus::Closed);
        assert_eq!(map_approval_stage("rejected"), ApprovalStage::Rejected);
        assert_eq!(map_approval_stage("closed"), ApprovalStage::PendingAts);
    }

    #[test]
    fn unknown_statuses_fall_back_to_defaults() {
        for raw in ["bogus", "", " open", "unknown"] {
            assert_eq!(map_lifecycle_status(raw), LifecycleStatus::New, "{raw:?}");
            assert_eq!(map_approval_stage(raw), ApprovalStage::PendingAts, "{raw:?}");
        }
    }

    #[test]
    fn missing_employee_uses_sentinels() {
        let normalized = normalize_complaint(&raw_with_status("open"));
        assert_eq!(normalized.employee_name, UNKNOWN_EMPLOYEE);
        assert_eq!(normalized.department, UNKNOWN_DEPARTMENT);

        let mut blank = raw_with_status("open");
        blank.employee = Some(RawEmployeeRef {
            id: "e-1".into(),
            name: Some(String::new()),
            email: None,
            department: None,
        });
        let normalized = normalize_complaint(&blank);
        assert_eq!(normalized.employee_name, UNKNOWN_EMPLOYEE);
        assert_eq!(normalized.department, UNKNOWN_DEPARTMENT);
    }

    #[test]
    fn embedded_employee_is_used_when_present() {
        let mut raw = raw_with_status("open");
        raw.employee = Some(RawEmployeeRef {
            id: "e-1".into(),
            name: Some("Ayesha Khan".into()),
            email: Some("ayesha@example.com".into()),
            department: Some("Finance".into()),
        });
        let normalized = normalize_complaint(&raw);
        assert_eq!(normalized.employee_name, "Ayesha Khan");
        assert_eq!(normalized.department, "Finance");
    }

    #[test]
    fn reply_sender_is_employee_only_for_exact_tag() {
        let mut raw = raw_with_status("open");
        raw.replies = ["employee", "manager", "ats", "", "Employee"]
            .iter()
            .enumerate()
            .map(|(i, tag)| RawReply {
                id: format!("r-{i}"),
                message: "hello".into(),
                from_user: tag.to_string(),
                timestamp: "2024-03-05T10:00:00".into(),
            })
            .collect();
        let senders = normalize_complaint(&raw)
            .responses
            .into_iter()
            .map(|r| r.sender)
            .collect::<Vec<_>>();
        assert_eq!(
            senders,
            vec![
                Sender::Employee,
                Sender::Manager,
                Sender::Manager,
                Sender::Manager,
                Sender::Manager
            ]
        );
    }

    #[test]
    fn priority_defaults_to_medium() {
        let mut raw = raw_with_status("open");
        assert_eq!(normalize_complaint(&raw).priority, Priority::Medium);
        raw.priority = Some("urgent".into());
        assert_eq!(normalize_complaint(&raw).priority, Priority::Medium);
        raw.priority = Some("HIGH".into());
        assert_eq!(normalize_complaint(&raw).priority, Priority::High);
        raw.priority = Some("low".into());
        assert_eq!(normalize_complaint(&raw).priority, Priority::Low);
    }

    #[test]
    fn normalizing_twice_is_deep_equal() {
        let mut raw = raw_with_status("pending_approval");
        raw.resolution_date = Some("2024-03-09T18:00:00+05:00".into());
        raw.replies.push(RawReply {
            id: "r-1".into(),
            message: "Looking into it".into(),
            from_user: "ats".into(),
            timestamp: "2024-03-05T10:00:00".into(),
        });
        assert_eq!(normalize_complaint(&raw), normalize_complaint(&raw));
    }

    #[test]
    fn forwarded_without_replies_or_resolution() {
        let normalized = normalize_complaint(&raw_with_status("forwarded"));
        assert_eq!(normalized.status, LifecycleStatus::InProgress);
        assert_eq!(normalized.approval_stage, ApprovalStage::PendingAssistantManager);
        assert_eq!(normalized.date_resolved, None);
        assert!(normalized.responses.is_empty());

        let json = serde_json::to_value(&normalized).unwrap();
        assert!(json.get("dateResolved").is_none());
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["approvalStage"], "pending_assistant_manager");
        assert_eq!(json["responses"], serde_json::json!([]));
    }

    #[test]
    fn timestamps_truncate_to_dates() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        assert_eq!(timestamp_to_date("2024-03-04T09:15:00Z"), date(2024, 3, 4));
        assert_eq!(timestamp_to_date("2024-03-04T23:30:00-02:00"), date(2024, 3, 5));
        assert_eq!(timestamp_to_date("2024-03-04T09:15:00.123456"), date(2024, 3, 4));
        assert_eq!(timestamp_to_date("2024-03-04 09:15:00"), date(2024, 3, 4));
        assert_eq!(timestamp_to_date("2024-03-04"), date(2024, 3, 4));
        assert_eq!(timestamp_to_date("yesterday"), None);
        assert_eq!(timestamp_to_date(""), None);
    }

    #[test]
    fn sparse_backend_json_deserializes() {
        let raw: RawComplaint = serde_json::from_value(serde_json::json!({
            "id": "c-9",
            "title": null,
            "status": "resolved",
            "replies": null,
            "employee": {"name": "Bilal"},
            "extra_field": 42
        }))
        .unwrap();
        let normalized = normalize_complaint(&raw);
        assert_eq!(normalized.title, "");
        assert_eq!(normalized.employee_name, "Bilal");
        assert_eq!(normalized.department, UNKNOWN_DEPARTMENT);
        assert_eq!(normalized.status, LifecycleStatus::Resolved);
        assert_eq!(normalized.approval_stage, ApprovalStage::Approved);
        assert_eq!(normalized.date_submitted, None);
    }

    #[test]
    fn summary_counts_pending_in_progress_and_resolved() {
        let complaints = ["open", "forwarded", "pending_approval", "resolved", "rejected", "closed"]
            .iter()
            .map(|s| normalize_complaint(&raw_with_status(s)))
            .collect::<Vec<_>>();
        let summary = ComplaintSummary::from_complaints(&complaints);
        assert_eq!(
            summary,
            ComplaintSummary {
                total: 6,
                // "closed" maps to the default pending_ats stage.
                pending_approval: 4,
                in_progress: 2,
                resolved: 1,
            }
        );
        assert_eq!(count_by_stage(&complaints)[&ApprovalStage::PendingAts], 2);
        assert_eq!(count_by_status(&complaints)[&LifecycleStatus::Closed], 2);
    }

    #[test]
    fn approval_filter_matches_stage_equality() {
        let complaints = ["open", "forwarded", "forwarded", "resolved"]
            .iter()
            .map(|s| normalize_complaint(&raw_with_status(s)))
            .collect::<Vec<_>>();
        assert_eq!(ApprovalFilter::parse("all").apply(&complaints).len(), 4);
        assert_eq!(ApprovalFilter::parse("nonsense"), ApprovalFilter::All);
        let filter = ApprovalFilter::parse("pending_assistant_manager");
        assert_eq!(filter, ApprovalFilter::Stage(ApprovalStage::PendingAssistantManager));
        assert_eq!(filter.apply(&complaints).len(), 2);
        assert_eq!(ApprovalFilter::parse("approved").apply(&complaints).len(), 1);
        assert!(ApprovalFilter::parse("rejected").apply(&complaints).is_empty());
    }

    #[test]
    fn pages_are_clamped_and_never_empty() {
        let rows = (1..=12).collect::<Vec<_>>();
        let page = Page::of(&rows, None, None);
        assert_eq!(page.items, vec![1, 2, 3, 4, 5]);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_prev());
        assert!(page.has_next());

        let last = Page::of(&rows, Some(99), Some(5));
        assert_eq!(last.page, 3);
        assert_eq!(last.items, vec![11, 12]);

        let empty = Page::<u8>::of(&[], Some(0), Some(0));
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn forms_report_field_messages() {
        let form = VendorForm {
            name: String::new(),
            email: "not-an-email".into(),
            phone: "0300-1234567".into(),
            service_type: "HVAC".into(),
            ..Default::default()
        };
        let errors = form.validate().unwrap_err();
        let fields = field_messages(&errors)
            .into_iter()
            .map(|m| m.field)
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["email", "name"]);

        let ok = EmployeeForm {
            name: "Sara".into(),
            email: "sara@example.com".into(),
            department: "IT".into(),
            role: "employee".into(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn omitted_form_fields_reach_validation() {
        let form: EmployeeForm = serde_json::from_value(serde_json::json!({
            "name": "Sara",
            "email": "sara@example.com",
            "department": "IT"
        }))
        .unwrap();
        let messages = field_messages(&form.validate().unwrap_err());
        assert_eq!(
            messages,
            vec![FieldMessage {
                field: "role".into(),
                message: "Role is required".into(),
            }]
        );

        let vendor: VendorForm = serde_json::from_value(serde_json::json!({})).unwrap();
        let fields = field_messages(&vendor.validate().unwrap_err())
            .into_iter()
            .map(|m| m.field)
            .collect::<Vec<_>>();
        assert_eq!(fields, vec!["email", "name", "phone", "service_type"]);
    }

    #[test]
    fn credentials_need_both_parts() {
        let created: WithCredentials<Vendor> = serde_json::from_value(serde_json::json!({
            "id": "v-1",
            "name": "CoolAir",
            "email": "ops@coolair.example",
            "phone": "123",
            "service_type": "HVAC",
            "username": "coolair",
            "temp_password": "Tmp#1234"
        }))
        .unwrap();
        assert_eq!(created.record.name, "CoolAir");
        assert_eq!(
            created.credentials(),
            Some(IssuedCredentials {
                username: "coolair".into(),
                temp_password: "Tmp#1234".into()
            })
        );

        let partial = WithCredentials {
            record: Vendor::default(),
            username: Some("x".into()),
            temp_password: None,
        };
        assert_eq!(partial.credentials(), None);
    }

    #[test]
    fn statistics_tolerate_missing_sections() {
        let stats: AdminStatistics =
            serde_json::from_value(serde_json::json!({"counts": {"employees": 3}})).unwrap();
        assert_eq!(stats.counts.employees, 3);
        assert_eq!(stats.counts.vendors, 0);
        assert!(stats.recent_complaints.is_empty());
    }

    #[test]
    fn keys_humanize_for_labels() {
        assert_eq!(humanize_key("in_progress"), "In Progress");
        assert_eq!(humanize_key("assistant_manager"), "Assistant Manager");
        assert_eq!(humanize_key("open"), "Open");
    }
}
