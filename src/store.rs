//! Dictionary and replacement-table stores
//!
//! Provides pluggable read access to the two tables the protection stages
//! depend on. Persistence of these tables is owned elsewhere; this crate
//! only queries them.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// A pseudonymization dictionary row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub original_value: String,
    pub pseudonym: String,
    pub data_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub organization_slug: Option<String>,
    #[serde(default)]
    pub agent_slug: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl DictionaryEntry {
    /// Active global entry
    pub fn new(
        original_value: impl Into<String>,
        pseudonym: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            original_value: original_value.into(),
            pseudonym: pseudonym.into(),
            data_type: data_type.into(),
            category: String::new(),
            organization_slug: None,
            agent_slug: None,
            is_active: true,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Scope the entry to an organization
    pub fn for_organization(mut self, organization_slug: impl Into<String>) -> Self {
        self.organization_slug = Some(organization_slug.into());
        self
    }

    /// Scope the entry to an agent within an organization
    pub fn for_agent(
        mut self,
        organization_slug: impl Into<String>,
        agent_slug: impl Into<String>,
    ) -> Self {
        self.organization_slug = Some(organization_slug.into());
        self.agent_slug = Some(agent_slug.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// One of the three scoped dictionary queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionaryQuery {
    /// Rows bound to both the organization and the agent
    Agent {
        organization_slug: String,
        agent_slug: String,
    },
    /// Rows bound to the organization but no agent
    Organization { organization_slug: String },
    /// Rows bound to neither
    Global,
}

impl DictionaryQuery {
    /// Whether `entry` belongs to the rows this query selects
    pub fn matches(&self, entry: &DictionaryEntry) -> bool {
        match self {
            Self::Agent {
                organization_slug,
                agent_slug,
            } => {
                entry.organization_slug.as_deref() == Some(organization_slug.as_str())
                    && entry.agent_slug.as_deref() == Some(agent_slug.as_str())
            }
            Self::Organization { organization_slug } => {
                entry.organization_slug.as_deref() == Some(organization_slug.as_str())
                    && entry.agent_slug.is_none()
            }
            Self::Global => entry.organization_slug.is_none() && entry.agent_slug.is_none(),
        }
    }
}

/// A placeholder override row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementEntry {
    pub data_type: String,
    pub replacement: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ReplacementEntry {
    pub fn new(data_type: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            replacement: replacement.into(),
            is_active: true,
        }
    }
}

/// Read access to the pseudonymization dictionary
#[async_trait]
pub trait DictionaryStore: Send + Sync {
    /// Fetch active rows selected by `query`
    async fn fetch_entries(&self, query: &DictionaryQuery) -> Result<Vec<DictionaryEntry>>;
}

/// Read access to the redaction replacement table
#[async_trait]
pub trait ReplacementStore: Send + Sync {
    /// Fetch all active replacement rows
    async fn fetch_replacements(&self) -> Result<Vec<ReplacementEntry>>;
}

/// In-memory store for testing and single-process use
///
/// Implements both store traits. Can be switched into an unavailable state
/// to exercise failure handling.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<DictionaryEntry>>,
    replacements: RwLock<Vec<ReplacementEntry>>,
    unavailable: AtomicBool,
    dictionary_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new(entries: Vec<DictionaryEntry>, replacements: Vec<ReplacementEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            replacements: RwLock::new(replacements),
            ..Default::default()
        }
    }

    /// Add a dictionary row
    pub fn insert_entry(&self, entry: DictionaryEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| {
            PipelineError::Dictionary(format!("Failed to acquire store lock: {}", e))
        })?;
        entries.push(entry);
        Ok(())
    }

    /// Simulate an outage: every fetch fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of dictionary queries served (including failed ones)
    pub fn dictionary_fetches(&self) -> usize {
        self.dictionary_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DictionaryStore for MemoryStore {
    async fn fetch_entries(&self, query: &DictionaryQuery) -> Result<Vec<DictionaryEntry>> {
        self.dictionary_fetches.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::Dictionary("memory store unavailable".to_string()));
        }

        let entries = self.entries.read().map_err(|e| {
            PipelineError::Dictionary(format!("Failed to acquire store lock: {}", e))
        })?;
        Ok(entries
            .iter()
            .filter(|e| e.is_active && query.matches(e))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReplacementStore for MemoryStore {
    async fn fetch_replacements(&self) -> Result<Vec<ReplacementEntry>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::ReplacementTable(
                "memory store unavailable".to_string(),
            ));
        }

        let replacements = self.replacements.read().map_err(|e| {
            PipelineError::ReplacementTable(format!("Failed to acquire store lock: {}", e))
        })?;
        Ok(replacements.iter().filter(|r| r.is_active).cloned().collect())
    }
}

/// On-disk layout read by [`JsonFileStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub dictionary: Vec<DictionaryEntry>,
    #[serde(default)]
    pub replacements: Vec<ReplacementEntry>,
}

/// JSON file-backed store
///
/// Re-reads the file on every fetch; the pseudonymizer's cache bounds how
/// often that happens. A missing file is a dictionary load error but an
/// empty replacement table.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file; a missing file yields an empty snapshot
    /// only when `missing_ok` is set
    async fn read_snapshot(&self, missing_ok: bool) -> std::result::Result<StoreSnapshot, String> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if missing_ok && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %self.path.display(),
                    "Table file not found, using empty table"
                );
                return Ok(StoreSnapshot::default());
            }
            Err(e) => return Err(format!("Failed to read {}: {}", self.path.display(), e)),
        };

        serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse {}: {}", self.path.display(), e))
    }
}

#[async_trait]
impl DictionaryStore for JsonFileStore {
    async fn fetch_entries(&self, query: &DictionaryQuery) -> Result<Vec<DictionaryEntry>> {
        let snapshot = self.read_snapshot(false).await.map_err(PipelineError::Dictionary)?;
        Ok(snapshot
            .dictionary
            .into_iter()
            .filter(|e| e.is_active && query.matches(e))
            .collect())
    }
}

#[async_trait]
impl ReplacementStore for JsonFileStore {
    async fn fetch_replacements(&self) -> Result<Vec<ReplacementEntry>> {
        let snapshot = self
            .read_snapshot(true)
            .await
            .map_err(PipelineError::ReplacementTable)?;
        Ok(snapshot
            .replacements
            .into_iter()
            .filter(|r| r.is_active)
            .collect())
    }
}
