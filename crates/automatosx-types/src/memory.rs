//! Memory Store data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryEntryType {
    Conversation,
    Code,
    Document,
    Task,
    Other,
}

impl MemoryEntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryEntryType::Conversation => "conversation",
            MemoryEntryType::Code => "code",
            MemoryEntryType::Document => "document",
            MemoryEntryType::Task => "task",
            MemoryEntryType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    #[serde(default)]
    pub r#type: Option<MemoryEntryType>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: MemoryMetadata,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Created,
    Accessed,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct GetAllFilter {
    pub r#type: Option<MemoryEntryType>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order_by: Option<OrderBy>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub r#type: Option<MemoryEntryType>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: u64,
    pub db_size_bytes: u64,
    pub index_size_bytes: u64,
    pub memory_usage_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExport {
    pub entries: Vec<MemoryEntry>,
    pub version: u32,
    pub exported_at: DateTime<Utc>,
}
