//! Backend contract consumed by the console, plus HTTP and fixture implementations.

use std::fs;
use std::path::{Path, PathBuf};

use acvt_core::{
    AdminStatistics, Employee, EmployeeForm, RawComplaint, Vendor, VendorForm, WithCredentials,
};
use acvt_http::{FetchError, HttpClient, Method};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "acvt-backend";

pub const COMPLAINTS_PATH: &str = "/complaints/all";
pub const STATISTICS_PATH: &str = "/admin/statistics";
pub const EMPLOYEES_LIST_PATH: &str = "/employees/all";
pub const EMPLOYEES_PATH: &str = "/employees/";
pub const VENDORS_PATH: &str = "/vendor/";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0} not found")]
    NotFound(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Fetch(err) => acvt_http::is_not_found(err),
        }
    }

    pub fn user_message(&self, subject: &str) -> String {
        match self {
            Self::Fetch(err) => err.user_message(subject),
            Self::NotFound(what) => format!("{what} could not be found."),
        }
    }
}

/// Everything the admin console reads from or writes to the backend.
#[async_trait]
pub trait AdminBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_complaints(&self) -> Result<Vec<RawComplaint>, BackendError>;

    async fn statistics(&self) -> Result<AdminStatistics, BackendError>;

    async fn list_employees(&self) -> Result<Vec<Employee>, BackendError>;

    async fn create_employee(
        &self,
        form: &EmployeeForm,
    ) -> Result<WithCredentials<Employee>, BackendError>;

    async fn update_employee(&self, id: &str, form: &EmployeeForm) -> Result<Employee, BackendError>;

    async fn delete_employee(&self, id: &str) -> Result<(), BackendError>;

    async fn list_vendors(&self) -> Result<Vec<Vendor>, BackendError>;

    async fn create_vendor(&self, form: &VendorForm) -> Result<WithCredentials<Vendor>, BackendError>;

    async fn update_vendor(&self, id: &str, form: &VendorForm) -> Result<Vendor, BackendError>;

    async fn delete_vendor(&self, id: &str) -> Result<(), BackendError>;
}

fn record_path(collection: &str, id: &str, kind: &str) -> Result<String, BackendError> {
    acvt_http::item_path(collection, id).ok_or_else(|| BackendError::NotFound(format!("{kind} {id}")))
}

/// Talks to the real REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: HttpClient,
}

impl HttpBackend {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AdminBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list_complaints(&self) -> Result<Vec<RawComplaint>, BackendError> {
        Ok(self.http.get_json(COMPLAINTS_PATH).await?)
    }

    async fn statistics(&self) -> Result<AdminStatistics, BackendError> {
        Ok(self.http.get_json(STATISTICS_PATH).await?)
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, BackendError> {
        Ok(self.http.get_json(EMPLOYEES_LIST_PATH).await?)
    }

    async fn create_employee(
        &self,
        form: &EmployeeForm,
    ) -> Result<WithCredentials<Employee>, BackendError> {
        Ok(self.http.send_json(Method::POST, EMPLOYEES_PATH, form).await?)
    }

    async fn update_employee(&self, id: &str, form: &EmployeeForm) -> Result<Employee, BackendError> {
        let path = record_path(EMPLOYEES_PATH, id, "Employee")?;
        Ok(self.http.send_json(Method::PUT, &path, form).await?)
    }

    async fn delete_employee(&self, id: &str) -> Result<(), BackendError> {
        let path = record_path(EMPLOYEES_PATH, id, "Employee")?;
        Ok(self.http.delete(&path).await?)
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, BackendError> {
        Ok(self.http.get_json(VENDORS_PATH).await?)
    }

    async fn create_vendor(&self, form: &VendorForm) -> Result<WithCredentials<Vendor>, BackendError> {
        Ok(self.http.send_json(Method::POST, VENDORS_PATH, form).await?)
    }

    async fn update_vendor(&self, id: &str, form: &VendorForm) -> Result<Vendor, BackendError> {
        let path = record_path(VENDORS_PATH, id, "Vendor")?;
        Ok(self.http.send_json(Method::PUT, &path, form).await?)
    }

    async fn delete_vendor(&self, id: &str) -> Result<(), BackendError> {
        let path = record_path(VENDORS_PATH, id, "Vendor")?;
        Ok(self.http.delete(&path).await?)
    }
}

#[derive(Debug, Clone, Default)]
struct FixtureState {
    complaints: Vec<RawComplaint>,
    statistics: AdminStatistics,
    employees: Vec<Employee>,
    vendors: Vec<Vendor>,
}

/// Serves canned JSON from a directory. Writes only touch the in-memory copy.
#[derive(Debug)]
pub struct FixtureBackend {
    root: PathBuf,
    state: Mutex<FixtureState>,
}

impl FixtureBackend {
    /// Missing files load as empty collections; malformed files are errors.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let state = FixtureState {
            complaints: read_json_file_or_default(&root.join("complaints.json"))?,
            statistics: read_json_file_or_default(&root.join("statistics.json"))?,
            employees: read_json_file_or_default(&root.join("employees.json"))?,
            vendors: read_json_file_or_default(&root.join("vendors.json"))?,
        };
        info!(
            root = %root.display(),
            complaints = state.complaints.len(),
            employees = state.employees.len(),
            vendors = state.vendors.len(),
            "loaded fixture backend"
        );
        Ok(Self {
            root,
            state: Mutex::new(state),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        debug!(path = %path.display(), "fixture file absent, using empty default");
        return Ok(T::default());
    }
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn issue_credentials(email: &str) -> (String, String) {
    let username = email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("user")
        .to_string();
    let temp_password = Uuid::new_v4().simple().to_string()[..12].to_string();
    (username, temp_password)
}

fn employee_from_form(id: String, form: &EmployeeForm, previous: Option<&Employee>) -> Employee {
    Employee {
        id,
        name: form.name.clone(),
        email: form.email.clone(),
        department: form.department.clone(),
        role: form.role.clone(),
        date_joined: previous
            .and_then(|p| p.date_joined.clone())
            .or_else(|| Some(Utc::now().to_rfc3339())),
        phone_number: previous.and_then(|p| p.phone_number.clone()),
        location: previous.and_then(|p| p.location.clone()),
    }
}

fn vendor_from_form(id: String, form: &VendorForm) -> Vendor {
    let optional = |value: &str| (!value.trim().is_empty()).then(|| value.to_string());
    Vendor {
        id,
        name: form.name.clone(),
        email: form.email.clone(),
        phone: form.phone.clone(),
        service_type: form.service_type.clone(),
        address: optional(&form.address),
        contact_person: optional(&form.contact_person),
    }
}

#[async_trait]
impl AdminBackend for FixtureBackend {
    fn name(&self) -> &'static str {
        "fixtures"
    }

    async fn list_complaints(&self) -> Result<Vec<RawComplaint>, BackendError> {
        Ok(self.state.lock().await.complaints.clone())
    }

    async fn statistics(&self) -> Result<AdminStatistics, BackendError> {
        Ok(self.state.lock().await.statistics.clone())
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, BackendError> {
        Ok(self.state.lock().await.employees.clone())
    }

    async fn create_employee(
        &self,
        form: &EmployeeForm,
    ) -> Result<WithCredentials<Employee>, BackendError> {
        let employee = employee_from_form(Uuid::new_v4().to_string(), form, None);
        let (username, temp_password) = issue_credentials(&employee.email);
        self.state.lock().await.employees.push(employee.clone());
        Ok(WithCredentials {
            record: employee,
            username: Some(username),
            temp_password: Some(temp_password),
        })
    }

    async fn update_employee(&self, id: &str, form: &EmployeeForm) -> Result<Employee, BackendError> {
        let mut state = self.state.lock().await;
        let slot = state
            .employees
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("Employee {id}")))?;
        let updated = employee_from_form(id.to_string(), form, Some(&*slot));
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_employee(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        let before = state.employees.len();
        state.employees.retain(|e| e.id != id);
        if state.employees.len() == before {
            return Err(BackendError::NotFound(format!("Employee {id}")));
        }
        Ok(())
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, BackendError> {
        Ok(self.state.lock().await.vendors.clone())
    }

    async fn create_vendor(&self, form: &VendorForm) -> Result<WithCredentials<Vendor>, BackendError> {
        let vendor = vendor_from_form(Uuid::new_v4().to_string(), form);
        let (username, temp_password) = issue_credentials(&vendor.email);
        self.state.lock().await.vendors.push(vendor.clone());
        Ok(WithCredentials {
            record: vendor,
            username: Some(username),
            temp_password: Some(temp_password),
        })
    }

    async fn update_vendor(&self, id: &str, form: &VendorForm) -> Result<Vendor, BackendError> {
        let mut state = self.state.lock().await;
        let slot = state
            .vendors
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("Vendor {id}")))?;
        let updated = vendor_from_form(id.to_string(), form);
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_vendor(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        let before = state.vendors.len();
        state.vendors.retain(|v| v.id != id);
        if state.vendors.len() == before {
            return Err(BackendError::NotFound(format!("Vendor {id}")));
        }
        Ok(())
    }
}
