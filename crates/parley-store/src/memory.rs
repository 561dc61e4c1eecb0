//! Importance and recency ranked memory store.
//!
//! Entries are persisted as one JSON document. Retrieval purges expired
//! entries, ranks by importance then last access, and refreshes the access
//! time of everything it returns.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::storage::{load_json, save_json, Result, Storage};

/// Storage key for the memory document.
pub const MEMORY_KEY: &str = "parley.memories";

/// What a memory is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    User,
    Task,
    Fact,
    System,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryType::User => "user",
            MemoryType::Task => "task",
            MemoryType::Fact => "fact",
            MemoryType::System => "system",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(MemoryType::User),
            "task" => Ok(MemoryType::Task),
            "fact" => Ok(MemoryType::Fact),
            "system" => Ok(MemoryType::System),
            other => Err(format!("unknown memory type: {}", other)),
        }
    }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub content: String,
    /// In `[0, 1]`
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Lifetime in seconds, measured from creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

impl MemoryEntry {
    /// Whether the entry has outlived its ttl at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            Some(ttl) => now - self.created_at > Duration::seconds(ttl),
            None => false,
        }
    }
}

/// Input to [`MemoryStore::add`].
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub kind: MemoryType,
    pub content: String,
    pub importance: f32,
    pub ttl_seconds: Option<i64>,
}

impl NewMemory {
    pub fn new(kind: MemoryType, content: impl Into<String>, importance: f32) -> Self {
        Self {
            kind,
            content: content.into(),
            importance,
            ttl_seconds: None,
        }
    }

    pub fn with_ttl(mut self, seconds: i64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }
}

/// Retrieval parameters.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    pub limit: usize,
    pub min_importance: f32,
    /// Restrict to these types; `None` means all
    pub types: Option<Vec<MemoryType>>,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            limit: 5,
            min_importance: 0.0,
            types: None,
        }
    }
}

impl MemoryQuery {
    pub fn new(limit: usize, min_importance: f32) -> Self {
        Self {
            limit,
            min_importance,
            types: None,
        }
    }

    pub fn with_types(mut self, types: Vec<MemoryType>) -> Self {
        self.types = Some(types);
        self
    }
}

/// Persistent memory store.
pub struct MemoryStore {
    storage: Arc<dyn Storage>,
    entries: Mutex<Vec<MemoryEntry>>,
}

impl MemoryStore {
    /// Load the store from `storage`.
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let entries: Vec<MemoryEntry> = load_json(storage.as_ref(), MEMORY_KEY)
            .await?
            .unwrap_or_default();
        debug!(count = entries.len(), "Loaded memories");
        Ok(Self {
            storage,
            entries: Mutex::new(entries),
        })
    }

    async fn persist(&self, entries: &[MemoryEntry]) -> Result<()> {
        save_json(self.storage.as_ref(), MEMORY_KEY, entries).await
    }

    /// Store a new memory. Importance is clamped to `[0, 1]`.
    pub async fn add(&self, memory: NewMemory) -> Result<MemoryEntry> {
        let now = Utc::now();
        let entry = MemoryEntry {
            id: Uuid::new_v4().to_string(),
            kind: memory.kind,
            content: memory.content,
            importance: memory.importance.clamp(0.0, 1.0),
            created_at: now,
            last_accessed_at: now,
            ttl_seconds: memory.ttl_seconds,
        };

        let mut entries = self.entries.lock().await;
        entries.push(entry.clone());
        self.persist(&entries).await?;

        debug!(id = %entry.id, kind = %entry.kind, "Memory added");
        Ok(entry)
    }

    /// Most relevant memories right now.
    pub async fn relevant(&self, query: &MemoryQuery) -> Result<Vec<MemoryEntry>> {
        self.relevant_at(query, Utc::now()).await
    }

    /// Most relevant memories as of `now`.
    ///
    /// Expired entries are purged first. Ties in importance go to the most
    /// recently accessed. Returned entries get `last_accessed_at = now`.
    pub async fn relevant_at(
        &self,
        query: &MemoryQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| !e.is_expired(now));
        let purged = before - entries.len();

        let mut ranked: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.importance >= query.min_importance)
            .filter(|(_, e)| {
                query
                    .types
                    .as_ref()
                    .map_or(true, |types| types.contains(&e.kind))
            })
            .map(|(i, _)| i)
            .collect();

        ranked.sort_by(|&a, &b| {
            let (a, b) = (&entries[a], &entries[b]);
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.last_accessed_at.cmp(&a.last_accessed_at))
        });
        ranked.truncate(query.limit);

        let mut selected = Vec::with_capacity(ranked.len());
        for index in ranked {
            let entry = &mut entries[index];
            entry.last_accessed_at = now;
            selected.push(entry.clone());
        }

        if purged > 0 || !selected.is_empty() {
            self.persist(&entries).await?;
        }
        if purged > 0 {
            debug!(purged, "Expired memories dropped");
        }
        Ok(selected)
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| !e.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            self.persist(&entries).await?;
        }
        Ok(purged)
    }

    /// Remove one entry by id.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() < before;
        if removed {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.persist(&entries).await
    }

    /// Every stored entry, in insertion order.
    pub async fn all(&self) -> Vec<MemoryEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Render entries as the text of a memory-context system message.
///
/// Returns `None` when there is nothing to say.
pub fn format_context(entries: &[MemoryEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut text = String::from("Relevant memories about this conversation:");
    for entry in entries {
        text.push_str(&format!("\n- [{}] {}", entry.kind, entry.content.trim()));
    }
    Some(text)
}
