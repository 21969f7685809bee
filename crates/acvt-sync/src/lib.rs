//! Console configuration and the complaint refresh cycle.
//!
//! A refresh fetches raw complaints, normalizes them and publishes an
//! immutable snapshot. Overlapping refreshes are sequenced by generation: a
//! response that finishes after a newer one has been published is dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acvt_backend::{AdminBackend, BackendError, FixtureBackend, HttpBackend};
use acvt_core::{
    count_by_stage, count_by_status, normalize_complaints, AdminStatistics, ApprovalStage,
    ComplaintSummary, LifecycleStatus, NormalizedComplaint, RawComplaint, DEFAULT_ROWS_PER_PAGE,
};
use acvt_http::{HttpClient, HttpClientConfig, DEFAULT_BASE_URL};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const CRATE_NAME: &str = "acvt-sync";

pub const CONFIG_FILE_NAME: &str = "acvt.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub backend_url: String,
    pub api_token: Option<String>,
    /// When set, the console serves these JSON files instead of calling the backend.
    pub fixtures_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub web_port: u16,
    pub rows_per_page: usize,
    pub workspace_root: PathBuf,
    pub logging: LoggingConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            fixtures_dir: None,
            http_timeout_secs: 20,
            user_agent: "acvt-console/0.1".to_string(),
            web_port: 8080,
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            workspace_root: PathBuf::from("."),
            logging: LoggingConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// YAML file (`ACVT_CONFIG`, else `./acvt.yaml` when present), then
    /// `ACVT_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var("ACVT_CONFIG") {
            Ok(path) => Self::from_yaml_file(path)?,
            Err(_) if Path::new(CONFIG_FILE_NAME).exists() => Self::from_yaml_file(CONFIG_FILE_NAME)?,
            Err(_) => Self::default(),
        };
        Ok(base.apply_env_with(|key| std::env::var(key).ok()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("ACVT_BACKEND_URL") {
            self.backend_url = v;
        }
        if let Some(v) = lookup("ACVT_API_TOKEN") {
            self.api_token = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = lookup("ACVT_FIXTURES_DIR") {
            self.fixtures_dir = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = lookup("ACVT_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.http_timeout_secs = v;
        }
        if let Some(v) = lookup("ACVT_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = lookup("ACVT_WEB_PORT").and_then(|v| v.parse().ok()) {
            self.web_port = v;
        }
        if let Some(v) = lookup("ACVT_ROWS_PER_PAGE").and_then(|v| v.parse::<usize>().ok()) {
            self.rows_per_page = v.max(1);
        }
        if let Some(v) = lookup("ACVT_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("ACVT_LOG") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("ACVT_LOG_FORMAT") {
            self.logging.format = if v.eq_ignore_ascii_case("json") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            };
        }
        self
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.backend_url.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            user_agent: Some(self.user_agent.clone()),
            bearer_token: self.api_token.clone(),
        }
    }

    pub fn build_backend(&self) -> Result<Arc<dyn AdminBackend>> {
        if let Some(dir) = &self.fixtures_dir {
            let root = if dir.is_absolute() {
                dir.clone()
            } else {
                self.workspace_root.join(dir)
            };
            return Ok(Arc::new(FixtureBackend::load(root)?));
        }
        let http = HttpClient::new(self.http_client_config())?;
        Ok(Arc::new(HttpBackend::new(http)))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_current_span(true).with_target(true))
                .init();
        }
        LogFormat::Pretty => {
            subscriber.with(fmt::layer().with_target(true)).init();
        }
    }
}

/// One fetch cycle's worth of normalized complaints.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintSnapshot {
    pub generation: u64,
    pub fetched_at: DateTime<Utc>,
    pub complaints: Vec<NormalizedComplaint>,
}

impl ComplaintSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
            complaints: Vec::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.generation > 0
    }

    pub fn summary(&self) -> ComplaintSummary {
        ComplaintSummary::from_complaints(&self.complaints)
    }

    pub fn find(&self, id: &str) -> Option<&NormalizedComplaint> {
        self.complaints.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Published(Arc<ComplaintSnapshot>),
    /// A newer refresh already published; `current` is what stays visible.
    Stale {
        generation: u64,
        current: Arc<ComplaintSnapshot>,
    },
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> &Arc<ComplaintSnapshot> {
        match self {
            Self::Published(snapshot) => snapshot,
            Self::Stale { current, .. } => current,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

pub struct ComplaintFeed {
    backend: Arc<dyn AdminBackend>,
    next_generation: AtomicU64,
    current: RwLock<Arc<ComplaintSnapshot>>,
}

impl ComplaintFeed {
    pub fn new(backend: Arc<dyn AdminBackend>) -> Self {
        Self {
            backend,
            next_generation: AtomicU64::new(0),
            current: RwLock::new(Arc::new(ComplaintSnapshot::empty())),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AdminBackend> {
        &self.backend
    }

    pub async fn current(&self) -> Arc<ComplaintSnapshot> {
        self.current.read().await.clone()
    }

    pub fn begin(&self) -> RefreshTicket {
        RefreshTicket {
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Normalize and publish unless a newer ticket already published.
    pub async fn complete(&self, ticket: RefreshTicket, raw: &[RawComplaint]) -> RefreshOutcome {
        let snapshot = Arc::new(ComplaintSnapshot {
            generation: ticket.generation,
            fetched_at: Utc::now(),
            complaints: normalize_complaints(raw),
        });

        let mut current = self.current.write().await;
        if snapshot.generation <= current.generation {
            debug!(
                generation = ticket.generation,
                published = current.generation,
                "discarding stale complaint response"
            );
            return RefreshOutcome::Stale {
                generation: ticket.generation,
                current: current.clone(),
            };
        }
        *current = snapshot.clone();
        info!(
            generation = snapshot.generation,
            complaints = snapshot.complaints.len(),
            "published complaint snapshot"
        );
        RefreshOutcome::Published(snapshot)
    }

    /// Fetch, normalize, publish. On failure the previous snapshot stays.
    pub async fn refresh(&self) -> Result<RefreshOutcome, BackendError> {
        let ticket = self.begin();
        match self.backend.list_complaints().await {
            Ok(raw) => Ok(self.complete(ticket, &raw).await),
            Err(err) => {
                warn!(generation = ticket.generation, error = %err, "complaint refresh failed");
                Err(err)
            }
        }
    }
}

/// Build the configured backend and run a single refresh.
pub async fn refresh_once(config: &ConsoleConfig) -> Result<(ComplaintFeed, Arc<ComplaintSnapshot>)> {
    let feed = ComplaintFeed::new(config.build_backend()?);
    let outcome = feed
        .refresh()
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message("complaints")))
        .context("refreshing complaints")?;
    let snapshot = outcome.snapshot().clone();
    Ok((feed, snapshot))
}

fn counts_section<K: Ord + Copy>(
    lines: &mut Vec<String>,
    title: &str,
    keys: &[K],
    counts: &BTreeMap<K, usize>,
    label: impl Fn(K) -> &'static str,
) {
    lines.push(format!("## {title}"));
    for key in keys {
        lines.push(format!("- {}: {}", label(*key), counts.get(key).copied().unwrap_or(0)));
    }
    lines.push(String::new());
}

/// Markdown brief of the snapshot and, when available, backend statistics.
pub fn report_markdown(snapshot: &ComplaintSnapshot, statistics: Option<&AdminStatistics>) -> String {
    let summary = snapshot.summary();
    let mut lines = vec![
        "# ACVT Complaint Brief".to_string(),
        String::new(),
        format!("- Generation: `{}`", snapshot.generation),
        format!("- Fetched: {}", snapshot.fetched_at.to_rfc3339()),
        format!("- Complaints: {}", summary.total),
        format!("- Pending approval: {}", summary.pending_approval),
        format!("- In progress: {}", summary.in_progress),
        format!("- Resolved: {}", summary.resolved),
        String::new(),
    ];

    counts_section(
        &mut lines,
        "Approval Stages",
        &ApprovalStage::ALL,
        &count_by_stage(&snapshot.complaints),
        ApprovalStage::label,
    );
    counts_section(
        &mut lines,
        "Lifecycle",
        &LifecycleStatus::ALL,
        &count_by_status(&snapshot.complaints),
        LifecycleStatus::label,
    );

    if let Some(stats) = statistics {
        lines.push("## Backend Statistics".to_string());
        lines.push(format!("- Employees: {}", stats.counts.employees));
        lines.push(format!("- Assets: {}", stats.counts.assets));
        lines.push(format!("- Vendors: {}", stats.counts.vendors));
        lines.push(format!("- Active complaints: {}", stats.active_complaints));
        lines.push(format!(
            "- Awaiting ATS / assistant manager / manager: {} / {} / {}",
            stats.ats_complaints, stats.assistant_manager_complaints, stats.manager_complaints
        ));
        lines.push(String::new());
    }

    lines.join("\n")
}
