//! Preview → Commit lifecycle
//!
//! `Rendered` (artifact on disk, not billed) → `Committed` (billed and
//! recorded). A post row is written only after the debit unambiguously
//! succeeded; any commit failure leaves the store untouched.

use std::sync::Arc;

use chrono::Utc;

use crate::credits::CreditDebit;
use crate::error::{EngineError, EngineResult};
use crate::preview::PreviewStore;
use crate::store::{clamp_page, CommittedPage, CommittedPost, PostStore};

pub struct CommitService {
    previews: PreviewStore,
    debit: Arc<dyn CreditDebit>,
    posts: Arc<dyn PostStore>,
    debit_disabled: bool,
}

impl CommitService {
    pub fn new(
        previews: PreviewStore,
        debit: Arc<dyn CreditDebit>,
        posts: Arc<dyn PostStore>,
        debit_disabled: bool,
    ) -> Self {
        Self {
            previews,
            debit,
            posts,
            debit_disabled,
        }
    }

    pub fn posts(&self) -> &Arc<dyn PostStore> {
        &self.posts
    }

    #[tracing::instrument(skip(self, urls, authorization), fields(urls = urls.len()))]
    pub async fn commit(
        &self,
        preview_id: &str,
        urls: &[String],
        authorization: Option<&str>,
    ) -> EngineResult<CommittedPost> {
        if self.previews.find(preview_id).is_none() {
            return Err(EngineError::PreviewNotFound(preview_id.to_string()));
        }

        if self.debit_disabled {
            tracing::warn!("credit debit disabled, committing without billing");
        } else {
            self.debit.debit_one(authorization).await?;
        }

        let posts = Arc::clone(&self.posts);
        let (preview_id, urls) = (preview_id.to_string(), urls.to_vec());
        let post = tokio::task::spawn_blocking(move || posts.insert(&preview_id, &urls, Utc::now()))
            .await
            .map_err(|e| EngineError::Storage(format!("post insert task: {e}")))??;
        tracing::info!(post_id = post.id, "preview committed");
        Ok(post)
    }

    pub fn list(&self, limit: Option<i64>, offset: Option<i64>) -> EngineResult<CommittedPage> {
        let (limit, offset) = clamp_page(limit, offset);
        let items = self.posts.list(limit, offset)?;
        Ok(CommittedPage {
            count: items.len(),
            items,
            limit,
            offset,
        })
    }
}
