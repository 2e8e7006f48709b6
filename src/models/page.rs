// file: src/models/page.rs
// description: generated wiki page entity with derived classification
// reference: page ids derived from a truncated sha-256 of the source path

use crate::database::{Changes, Key};
use crate::error::{Result, WikiError};
use crate::models::classifier::PageClassifier;
use crate::models::{StoredEntity, now, timestamp, timestamp_value};
use crate::utils::ids::{derive_page_id, sha256_hex};
use crate::utils::validation::Validator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageType {
    Readme,
    Code,
    Directory,
    Api,
    Guide,
}

impl FromStr for PageType {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "README" => Ok(PageType::Readme),
            "CODE" => Ok(PageType::Code),
            "DIRECTORY" => Ok(PageType::Directory),
            "API" => Ok(PageType::Api),
            "GUIDE" => Ok(PageType::Guide),
            other => Err(WikiError::Validation(format!("Unknown page type: {}", other))),
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageType::Readme => "README",
            PageType::Code => "CODE",
            PageType::Directory => "DIRECTORY",
            PageType::Api => "API",
            PageType::Guide => "GUIDE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageStatus {
    #[default]
    Active,
    Draft,
    Archived,
}

impl FromStr for PageStatus {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(PageStatus::Active),
            "DRAFT" => Ok(PageStatus::Draft),
            "ARCHIVED" => Ok(PageStatus::Archived),
            other => Err(WikiError::Validation(format!("Unknown page status: {}", other))),
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageStatus::Active => "ACTIVE",
            PageStatus::Draft => "DRAFT",
            PageStatus::Archived => "ARCHIVED",
        };
        f.write_str(label)
    }
}

/// Declared most important first, so the derived order sorts high before low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl FromStr for Importance {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Importance::High),
            "medium" => Ok(Importance::Medium),
            "low" => Ok(Importance::Low),
            other => Err(WikiError::Validation(format!("Unknown importance: {}", other))),
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        };
        f.write_str(label)
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(rename = "repo_id")]
    pub repository_id: String,
    pub page_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub page_type: PageType,
    #[serde(default)]
    pub status: PageStatus,
    pub source_path: String,
    #[serde(default)]
    pub content: String,
    /// SHA-256 of `content`, recomputed whenever the content changes.
    #[serde(default)]
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub importance: Importance,
    #[serde(default)]
    pub related_pages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_page: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_blob_key: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        rename = "last_parsed_at",
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_analyzed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Page {
    pub fn is_visible(&self) -> bool {
        self.status != PageStatus::Archived
    }
}

impl StoredEntity for Page {
    const KIND: &'static str = "page";

    fn key(&self) -> Key {
        Key::composite(&self.repository_id, &self.page_id)
    }
}

/// Page creation request. Type and importance are inferred when absent.
#[derive(Debug, Clone, Default)]
pub struct NewPage {
    pub repository_id: String,
    pub source_path: String,
    pub title: String,
    pub content: String,
    pub page_type: Option<PageType>,
    pub importance: Option<Importance>,
    pub status: Option<PageStatus>,
    pub summary: Option<String>,
    pub related_pages: Vec<String>,
    pub parent_page: Option<String>,
    pub tags: Vec<String>,
    pub content_blob_key: Option<String>,
    pub metadata: Map<String, Value>,
}

impl NewPage {
    pub fn new(repository_id: &str, source_path: &str, title: &str, content: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            source_path: source_path.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_page: &str) -> Self {
        self.parent_page = Some(parent_page.to_string());
        self
    }

    pub fn into_page(self) -> Result<Page> {
        Validator::validate_source_path(&self.source_path)?;
        let title = Validator::validate_title(&self.title)?;
        let page_id = derive_page_id(&self.repository_id, &self.source_path);

        let page_type = self
            .page_type
            .unwrap_or_else(|| PageClassifier::infer_type(&self.source_path));
        let importance = self
            .importance
            .unwrap_or_else(|| PageClassifier::infer_importance(&self.source_path, &self.content));

        let created = now();
        Ok(Page {
            repository_id: self.repository_id,
            page_id,
            title,
            page_type,
            status: self.status.unwrap_or_default(),
            content_hash: sha256_hex(&self.content),
            source_path: self.source_path,
            content: self.content,
            summary: self.summary,
            importance,
            related_pages: self.related_pages,
            parent_page: self.parent_page,
            tags: self.tags,
            content_blob_key: self.content_blob_key,
            created_at: created,
            updated_at: created,
            last_analyzed_at: None,
            metadata: self.metadata,
        })
    }
}

/// Partial page update. `parent_page: Some(None)` detaches the page.
#[derive(Debug, Clone, Default)]
pub struct PageUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub page_type: Option<PageType>,
    pub status: Option<PageStatus>,
    pub importance: Option<Importance>,
    pub related_pages: Option<Vec<String>>,
    pub parent_page: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub content_blob_key: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub mark_analyzed: bool,
}

impl PageUpdate {
    pub fn into_changes(self, at: DateTime<Utc>) -> Result<Changes> {
        let mut changes = Changes::new();

        if let Some(title) = self.title {
            changes.insert("title", Validator::validate_title(&title)?);
        }
        if let Some(content) = self.content {
            changes.insert("content_hash", sha256_hex(&content));
            changes.insert("content", content);
        }
        if let Some(summary) = self.summary {
            changes.insert("summary", summary);
        }
        if let Some(page_type) = self.page_type {
            changes.insert("type", to_value(page_type)?);
        }
        if let Some(status) = self.status {
            changes.insert("status", to_value(status)?);
        }
        if let Some(importance) = self.importance {
            changes.insert("importance", to_value(importance)?);
        }
        if let Some(related) = self.related_pages {
            changes.insert("related_pages", related);
        }
        if let Some(parent) = self.parent_page {
            changes = changes.set_optional("parent_page", parent.map(Value::String));
        }
        if let Some(tags) = self.tags {
            changes.insert("tags", tags);
        }
        if let Some(key) = self.content_blob_key {
            changes.insert("content_blob_key", key);
        }
        if let Some(metadata) = self.metadata {
            changes.insert("metadata", Value::Object(metadata));
        }
        if self.mark_analyzed {
            changes.insert("last_parsed_at", timestamp_value(at));
        }

        if changes.is_empty() {
            return Err(WikiError::Validation("Page update has no changes".to_string()));
        }
        changes.insert("updated_at", timestamp_value(at));
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_readme_inference() {
        let page = NewPage::new("repo-1", "README.md", "Overview", "short").into_page().unwrap();
        assert_eq!(page.page_type, PageType::Readme);
        assert_eq!(page.importance, Importance::High);
        assert_eq!(page.status, PageStatus::Active);
        assert_eq!(page.page_id, derive_page_id("repo-1", "README.md"));
        assert_eq!(page.content_hash, sha256_hex("short"));
    }

    #[test]
    fn test_explicit_classification_wins() {
        let mut draft = NewPage::new("repo-1", "README.md", "Overview", "");
        draft.page_type = Some(PageType::Guide);
        draft.importance = Some(Importance::Low);
        let page = draft.into_page().unwrap();
        assert_eq!(page.page_type, PageType::Guide);
        assert_eq!(page.importance, Importance::Low);
    }

    #[test]
    fn test_title_bounds() {
        assert!(NewPage::new("repo-1", "a.rs", "  ", "").into_page().is_err());
        assert!(NewPage::new("repo-1", "a.rs", &"t".repeat(201), "").into_page().is_err());
        assert!(NewPage::new("repo-1", "a.rs", &"t".repeat(200), "").into_page().is_ok());
    }

    #[test]
    fn test_update_recomputes_hash_and_detaches_parent() {
        let update = PageUpdate {
            content: Some("new body".to_string()),
            parent_page: Some(None),
            ..PageUpdate::default()
        };
        let changes = update.into_changes(now()).unwrap();
        assert!(changes.touches("content_hash"));
        assert_eq!(changes.removals(), ["parent_page".to_string()]);
    }

    #[test]
    fn test_record_round_trip_uses_store_names() {
        let page = NewPage::new("repo-1", "src/lib.rs", "Library", "fn main() {}")
            .with_parent("page-repo-1-00000000")
            .into_page()
            .unwrap();
        let record = page.to_record().unwrap();
        assert_eq!(record.get("type"), Some(&Value::from("CODE")));
        assert_eq!(record.get("importance"), Some(&Value::from("low")));
        assert_eq!(Page::from_record(record).unwrap(), page);
    }
}
