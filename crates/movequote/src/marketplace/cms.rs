use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::audit::{AuditLogger, AuditRecord};
use super::domain::{CmsContentId, UserId};
use super::repository::{CmsRepository, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmsKind {
    Page,
    Faq,
    Blog,
}

impl CmsKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "page" => Some(CmsKind::Page),
            "faq" => Some(CmsKind::Faq),
            "blog" => Some(CmsKind::Blog),
            _ => None,
        }
    }
}

/// Fields only blog posts carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogFields {
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub cover_image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmsContent {
    pub id: CmsContentId,
    pub slug: String,
    pub kind: CmsKind,
    pub title: String,
    pub body: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub published: bool,
    pub sort_order: i32,
    pub blog: Option<BlogFields>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmsDraft {
    pub slug: String,
    pub kind: CmsKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub blog: Option<BlogFields>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CmsError {
    #[error("slug must be lowercase letters, digits and single hyphens")]
    InvalidSlug,
    #[error("title is required")]
    MissingTitle,
    #[error("blog fields are only allowed on blog posts")]
    BlogFieldsOnNonBlog,
    #[error("a content item with this slug already exists")]
    DuplicateSlug,
    #[error("content not found")]
    NotFound,
    #[error(transparent)]
    Storage(RepositoryError),
}

impl From<RepositoryError> for CmsError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => CmsError::DuplicateSlug,
            RepositoryError::NotFound => CmsError::NotFound,
            other => CmsError::Storage(other),
        }
    }
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl CmsDraft {
    fn validate(&self) -> Result<(), CmsError> {
        if !is_valid_slug(&self.slug) {
            return Err(CmsError::InvalidSlug);
        }
        if self.title.trim().is_empty() {
            return Err(CmsError::MissingTitle);
        }
        if self.blog.is_some() && self.kind != CmsKind::Blog {
            return Err(CmsError::BlogFieldsOnNonBlog);
        }
        Ok(())
    }
}

pub struct CmsService {
    repository: Arc<dyn CmsRepository>,
    audit: AuditLogger,
}

impl CmsService {
    pub fn new(repository: Arc<dyn CmsRepository>, audit: AuditLogger) -> Self {
        Self { repository, audit }
    }

    pub fn create(
        &self,
        actor: &UserId,
        draft: CmsDraft,
        now: DateTime<Utc>,
    ) -> Result<CmsContent, CmsError> {
        draft.validate()?;
        if self.repository.by_slug(&draft.slug)?.is_some() {
            return Err(CmsError::DuplicateSlug);
        }
        let content = CmsContent {
            id: CmsContentId::generate(),
            slug: draft.slug,
            kind: draft.kind,
            title: draft.title.trim().to_string(),
            body: draft.body,
            meta_title: draft.meta_title,
            meta_description: draft.meta_description,
            published: draft.published,
            sort_order: draft.sort_order,
            blog: draft.blog,
            created_at: now,
            updated_at: now,
        };
        let stored = self.repository.insert(content)?;
        self.audit.record(
            AuditRecord::new(actor, "cms.created", "cms_content", stored.id.as_str())
                .after(json!(stored)),
            now,
        );
        Ok(stored)
    }

    pub fn update(
        &self,
        actor: &UserId,
        id: &CmsContentId,
        draft: CmsDraft,
        now: DateTime<Utc>,
    ) -> Result<CmsContent, CmsError> {
        draft.validate()?;
        let before = self.repository.fetch(id)?.ok_or(CmsError::NotFound)?;
        if draft.slug != before.slug {
            if let Some(existing) = self.repository.by_slug(&draft.slug)? {
                if existing.id != before.id {
                    return Err(CmsError::DuplicateSlug);
                }
            }
        }
        let content = CmsContent {
            id: before.id.clone(),
            slug: draft.slug,
            kind: draft.kind,
            title: draft.title.trim().to_string(),
            body: draft.body,
            meta_title: draft.meta_title,
            meta_description: draft.meta_description,
            published: draft.published,
            sort_order: draft.sort_order,
            blog: draft.blog,
            created_at: before.created_at,
            updated_at: now,
        };
        let stored = self.repository.update(content)?;
        self.audit.record(
            AuditRecord::new(actor, "cms.updated", "cms_content", id.as_str())
                .before(json!(before))
                .after(json!(stored)),
            now,
        );
        Ok(stored)
    }

    /// Published items of one kind, by `sort_order` then title.
    pub fn published(&self, kind: CmsKind) -> Result<Vec<CmsContent>, CmsError> {
        let mut items: Vec<CmsContent> = self
            .repository
            .list()?
            .into_iter()
            .filter(|item| item.kind == kind && item.published)
            .collect();
        items.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(items)
    }

    pub fn published_by_slug(&self, slug: &str) -> Result<CmsContent, CmsError> {
        match self.repository.by_slug(slug)? {
            Some(item) if item.published => Ok(item),
            _ => Err(CmsError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::is_valid_slug;

    #[test]
    fn slug_rules() {
        assert!(is_valid_slug("moving-checklist"));
        assert!(is_valid_slug("faq-2"));
        assert!(!is_valid_slug("Moving"));
        assert!(!is_valid_slug("-lead"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug(""));
    }
}
