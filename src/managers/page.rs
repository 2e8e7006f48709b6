// file: src/managers/page.rs
// description: wiki page storage, collision-checked creation and table of contents
// reference: existence-or-same-path guard on page writes

use crate::database::{BatchOutcome, Condition, ConditionalStore, Key, QueryRequest, RequestContext};
use crate::error::{Result, StoreError, WikiError};
use crate::managers::decode_all;
use crate::models::{NewPage, Page, PageUpdate, StoredEntity, TableOfContents, now};
use crate::utils::validation::Validator;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PageManager {
    store: Arc<dyn ConditionalStore>,
    max_limit: usize,
}

impl PageManager {
    pub fn new(store: Arc<dyn ConditionalStore>, max_limit: usize) -> Self {
        Self { store, max_limit }
    }

    fn store_error(err: StoreError, key: &str, operation: &str) -> WikiError {
        WikiError::from_store(err, Page::KIND, key, operation)
    }

    /// Create or replace the page for a source path. Page ids are derived from
    /// a truncated hash of the path, so an existing page under the same id but
    /// a different path is a collision and is refused.
    pub async fn create(&self, ctx: &RequestContext, request: NewPage) -> Result<Page> {
        let mut page = request.into_page()?;
        let key = page.key();

        let existing = self
            .store
            .get(ctx, &key)
            .await
            .map_err(|err| Self::store_error(err, &page.page_id, "create"))?;

        if let Some(record) = existing {
            let existing = Page::from_record(record)?;
            if existing.source_path != page.source_path {
                warn!(
                    page = %page.page_id,
                    existing = %existing.source_path,
                    incoming = %page.source_path,
                    "Page id collision"
                );
                return Err(WikiError::Duplicate(format!(
                    "Page id {} already belongs to {}",
                    page.page_id, existing.source_path
                )));
            }
            page.created_at = existing.created_at;
        }

        let guard = Condition::NotExists.or(Condition::equals("source_path", page.source_path.as_str()));
        self.store
            .put(ctx, page.to_record()?, Some(&guard))
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed => WikiError::Duplicate(format!(
                    "Page id {} was claimed by another source path",
                    page.page_id
                )),
                other => Self::store_error(other, &page.page_id, "create"),
            })?;

        info!(
            repository = %page.repository_id,
            page = %page.page_id,
            path = %page.source_path,
            "Stored page"
        );
        Ok(page)
    }

    pub async fn get(&self, ctx: &RequestContext, repository_id: &str, page_id: &str) -> Result<Page> {
        let record = self
            .store
            .get(ctx, &Key::composite(repository_id, page_id))
            .await
            .map_err(|err| Self::store_error(err, page_id, "get"))?;

        match record {
            Some(record) => Page::from_record(record),
            None => Err(WikiError::NotFound(format!(
                "page {} in repository {}",
                page_id, repository_id
            ))),
        }
    }

    /// Pages of a repository in page id order.
    pub async fn list(&self, ctx: &RequestContext, repository_id: &str, limit: usize) -> Result<Vec<Page>> {
        let limit = Validator::validate_limit(limit, self.max_limit)?;
        let request = QueryRequest::new(repository_id).limit(limit);
        let records = self
            .store
            .query(ctx, &request)
            .await
            .map_err(|err| Self::store_error(err, repository_id, "list"))?;
        decode_all(records)
    }

    pub async fn list_all(&self, ctx: &RequestContext, repository_id: &str) -> Result<Vec<Page>> {
        let records = self
            .store
            .query(ctx, &QueryRequest::new(repository_id))
            .await
            .map_err(|err| Self::store_error(err, repository_id, "list_all"))?;
        decode_all(records)
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
        page_id: &str,
        update: PageUpdate,
    ) -> Result<Page> {
        if let Some(Some(parent)) = &update.parent_page
            && parent == page_id
        {
            return Err(WikiError::Validation(format!(
                "Page {} cannot be its own parent",
                page_id
            )));
        }

        let changes = update.into_changes(now())?;
        let record = self
            .store
            .update(
                ctx,
                &Key::composite(repository_id, page_id),
                &changes,
                Some(&Condition::Exists),
            )
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed | StoreError::NotFound(_) => WikiError::NotFound(
                    format!("page {} in repository {}", page_id, repository_id),
                ),
                other => Self::store_error(other, page_id, "update"),
            })?;

        debug!(repository = repository_id, page = page_id, "Updated page");
        Page::from_record(record)
    }

    /// Returns whether a page was removed.
    pub async fn delete(&self, ctx: &RequestContext, repository_id: &str, page_id: &str) -> Result<bool> {
        let result = self
            .store
            .delete(
                ctx,
                &Key::composite(repository_id, page_id),
                Some(&Condition::Exists),
            )
            .await;

        match result {
            Ok(()) => {
                info!(repository = repository_id, page = page_id, "Deleted page");
                Ok(true)
            }
            Err(StoreError::ConditionFailed) | Err(StoreError::NotFound(_)) => Ok(false),
            Err(err) => Err(Self::store_error(err, page_id, "delete")),
        }
    }

    pub async fn table_of_contents(&self, ctx: &RequestContext, repository_id: &str) -> Result<TableOfContents> {
        let pages = self.list_all(ctx, repository_id).await?;
        let toc = TableOfContents::build(&pages);
        if !toc.cycles.is_empty() {
            warn!(
                repository = repository_id,
                pages = ?toc.cycles,
                "Parent links form a cycle"
            );
        }
        Ok(toc)
    }

    /// Batch-remove every page of a repository. Entries fail independently.
    pub async fn delete_all_for_repository(
        &self,
        ctx: &RequestContext,
        repository_id: &str,
    ) -> Result<BatchOutcome> {
        let keys = self
            .list_all(ctx, repository_id)
            .await?
            .iter()
            .map(StoredEntity::key)
            .collect();

        self.store
            .batch_write(ctx, Vec::new(), keys)
            .await
            .map_err(|err| Self::store_error(err, repository_id, "delete_all_for_repository"))
    }
}
