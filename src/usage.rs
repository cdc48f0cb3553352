//! Advisory daily usage gate.
//!
//! The counter lives in local storage owned by the caller, so it is a UX
//! nudge, not a quota: deleting the store resets it. Real enforcement would
//! need a server-held counter keyed by caller identity.

use crate::error::Result;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fusions allowed per calendar day.
pub const DAILY_LIMIT: u32 = 3;

/// Persisted counter state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageRecord {
    /// Day the count belongs to. `None` if never used or unreadable.
    pub last_usage_date: Option<NaiveDate>,
    /// Fusions performed on `last_usage_date`.
    pub usage_count: u32,
}

impl UsageRecord {
    /// A fresh record for `today`.
    pub fn fresh(today: NaiveDate) -> Self {
        Self {
            last_usage_date: Some(today),
            usage_count: 0,
        }
    }
}

/// On-disk layout: two string entries, like browser local storage.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredUsage {
    #[serde(rename = "lastUsageDate", default, skip_serializing_if = "Option::is_none")]
    last_usage_date: Option<String>,
    #[serde(rename = "usageCount", default, skip_serializing_if = "Option::is_none")]
    usage_count: Option<String>,
}

impl From<StoredUsage> for UsageRecord {
    fn from(stored: StoredUsage) -> Self {
        Self {
            last_usage_date: stored
                .last_usage_date
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
            usage_count: stored
                .usage_count
                .and_then(|c| c.trim().parse().ok())
                .unwrap_or(0),
        }
    }
}

impl From<&UsageRecord> for StoredUsage {
    fn from(record: &UsageRecord) -> Self {
        Self {
            last_usage_date: record
                .last_usage_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            usage_count: Some(record.usage_count.to_string()),
        }
    }
}

/// Persistence for the usage counter.
pub trait UsageStore: Send + Sync {
    /// Loads the current record. Missing state is the default record.
    fn load(&self) -> Result<UsageRecord>;

    /// Replaces the stored record.
    fn save(&self, record: &UsageRecord) -> Result<()>;
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    record: Mutex<UsageRecord>,
}

impl MemoryUsageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with `record`.
    pub fn with_record(record: UsageRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }
}

impl UsageStore for MemoryUsageStore {
    fn load(&self) -> Result<UsageRecord> {
        Ok(*self.record.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, record: &UsageRecord) -> Result<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = *record;
        Ok(())
    }
}

/// JSON file store: `{"lastUsageDate": "2024-05-01", "usageCount": "2"}`.
#[derive(Debug, Clone)]
pub struct FileUsageStore {
    path: PathBuf,
}

impl FileUsageStore {
    /// Creates a store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageStore for FileUsageStore {
    fn load(&self) -> Result<UsageRecord> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UsageRecord::default())
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<StoredUsage>(&text) {
            Ok(stored) => Ok(stored.into()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring unreadable usage file: {e}");
                Ok(UsageRecord::default())
            }
        }
    }

    fn save(&self, record: &UsageRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&StoredUsage::from(record))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// The caller may fuse.
    Allowed {
        /// Fusions left today, including the one about to run.
        remaining: u32,
    },
    /// Daily limit reached; the caller must not fuse.
    LimitReached {
        /// The limit that was hit.
        limit: u32,
    },
}

impl GateDecision {
    /// True if the caller may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Today's counter as seen by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Calendar day.
    pub date: NaiveDate,
    /// Fusions performed today.
    pub count: u32,
    /// Daily limit.
    pub limit: u32,
}

impl UsageSnapshot {
    /// Fusions left today.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

/// Advisory per-day usage limiter.
#[derive(Debug)]
pub struct UsageGate<S> {
    store: S,
    limit: u32,
}

impl<S: UsageStore> UsageGate<S> {
    /// Creates a gate with the standard [`DAILY_LIMIT`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            limit: DAILY_LIMIT,
        }
    }

    /// Overrides the daily limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Returns the daily limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads today's record, rolling it over (and persisting) on a new day.
    fn load_for(&self, today: NaiveDate) -> Result<UsageRecord> {
        let record = self.store.load()?;
        if record.last_usage_date == Some(today) {
            return Ok(record);
        }
        let fresh = UsageRecord::fresh(today);
        self.store.save(&fresh)?;
        Ok(fresh)
    }

    /// Checks whether another fusion is allowed on `today`.
    ///
    /// Never changes the count. On a new day the stored count is reset to 0.
    pub fn check_and_maybe_reject(&self, today: NaiveDate) -> Result<GateDecision> {
        let record = self.load_for(today)?;
        if record.usage_count >= self.limit {
            tracing::warn!(count = record.usage_count, limit = self.limit, "daily fusion limit reached");
            return Ok(GateDecision::LimitReached { limit: self.limit });
        }
        Ok(GateDecision::Allowed {
            remaining: self.limit - record.usage_count,
        })
    }

    /// [`check_and_maybe_reject`](Self::check_and_maybe_reject) for the local calendar day.
    pub fn check(&self) -> Result<GateDecision> {
        self.check_and_maybe_reject(local_today())
    }

    /// Counts one successful fusion on `today`. Returns the new count.
    pub fn record_success(&self, today: NaiveDate) -> Result<u32> {
        let mut record = self.load_for(today)?;
        record.usage_count = record.usage_count.saturating_add(1);
        self.store.save(&record)?;
        tracing::debug!(count = record.usage_count, limit = self.limit, "recorded fusion");
        Ok(record.usage_count)
    }

    /// Returns today's counter.
    pub fn snapshot(&self, today: NaiveDate) -> Result<UsageSnapshot> {
        let record = self.load_for(today)?;
        Ok(UsageSnapshot {
            date: today,
            count: record.usage_count,
            limit: self.limit,
        })
    }

    /// Clears today's count, granting a fresh allowance.
    pub fn reset(&self, today: NaiveDate) -> Result<()> {
        tracing::info!("usage counter reset");
        self.store.save(&UsageRecord::fresh(today))
    }
}

/// Today's date in the local time zone.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
