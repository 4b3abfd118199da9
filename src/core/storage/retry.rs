use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::model::{EntryQuery, FileRef, FolderRef, RemoteEntry};
use super::StorageClient;
use crate::core::error::{SyncError, SyncResult};

/// Bounded exponential backoff for transient remote failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// 250ms, 500ms, 1s, ... for the default policy.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }

    fn should_retry(&self, attempt: u32, err: &SyncError) -> bool {
        attempt < self.max_retries && err.is_transient()
    }
}

/// Runs an idempotent operation until it succeeds, fails permanently, or the
/// retry budget is spent.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, f: F) -> SyncResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!("{} succeeded after {} retries", operation, attempt);
                }
                return Ok(value);
            }
            Err(err) if policy.should_retry(attempt, &err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}): {}; retrying in {:?}",
                    operation,
                    attempt + 1,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Decorator adding retries to any store.
///
/// Reads are retried as-is. Uploads, deletes and folder creation are not
/// idempotent against a request that failed after landing, so each of them
/// re-checks remote state before trying again.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: StorageClient> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn same_title_ids(
        &self,
        parent: &FolderRef,
        title: &str,
    ) -> SyncResult<HashSet<String>> {
        let query = EntryQuery::file_named(title, parent);
        let existing =
            with_retry(self.policy, "list before upload", || self.inner.query(&query)).await?;
        Ok(existing.into_iter().map(|entry| entry.id).collect())
    }
}

#[async_trait]
impl<S: StorageClient> StorageClient for RetryingStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn query(&self, query: &EntryQuery) -> SyncResult<Vec<RemoteEntry>> {
        with_retry(self.policy, "list", || self.inner.query(query)).await
    }

    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&FolderRef>,
    ) -> SyncResult<FolderRef> {
        let mut attempt = 0;
        loop {
            match self.inner.create_folder(name, parent).await {
                Ok(folder) => return Ok(folder),
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    warn!("Creating folder '{}' failed: {}; re-checking", name, err);
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                    if let Some(existing) = self.inner.find_folder(name, parent).await? {
                        info!("Folder '{}' exists after failed create, reusing it", name);
                        return Ok(existing);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn upload_content(
        &self,
        parent: &FolderRef,
        title: &str,
        bytes: Vec<u8>,
    ) -> SyncResult<FileRef> {
        // Files already carrying this title are older copies; only a new id
        // can be the product of a failed-but-landed attempt.
        let before = self.same_title_ids(parent, title).await?;

        let mut attempt = 0;
        loop {
            match self.inner.upload_content(parent, title, bytes.clone()).await {
                Ok(file) => return Ok(file),
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    warn!("Uploading '{}' failed: {}; re-checking", title, err);
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;

                    let landed = self
                        .inner
                        .query(&EntryQuery::file_named(title, parent))
                        .await?
                        .into_iter()
                        .find(|entry| !before.contains(&entry.id));
                    if let Some(file) = landed.and_then(|entry| entry.as_file()) {
                        info!("Upload of '{}' landed despite the error", title);
                        return Ok(file);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn delete_entry(&self, id: &str) -> SyncResult<()> {
        let mut attempt = 0;
        loop {
            match self.inner.delete_entry(id).await {
                Ok(()) => return Ok(()),
                // Gone after a failed attempt: the earlier request went through.
                Err(SyncError::NotFound(_)) if attempt > 0 => return Ok(()),
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    warn!("Deleting {} failed: {}; retrying", id, err);
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn download_content(&self, file: &FileRef) -> SyncResult<Vec<u8>> {
        with_retry(self.policy, "download", || self.inner.download_content(file)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::core::storage::MemoryStore;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn unavailable() -> SyncError {
        SyncError::RemoteStatus {
            operation: "test".into(),
            status: 503,
            body: String::new(),
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast_policy(), "flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = with_retry(fast_policy(), "missing", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::NotFound("x".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = with_retry(fast_policy(), "down", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn persistent_upload_failure_surfaces_after_retries() {
        let store = RetryingStore::new(MemoryStore::new(), fast_policy());
        let root = store.create_folder("root", None).await.unwrap();
        store.inner().fail_uploads_titled("world.zip").await;

        let err = store
            .upload_content(&root, "world.zip", vec![1])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(store.inner().titles_in(&root).await.is_empty());
    }

    #[tokio::test]
    async fn older_copy_is_not_mistaken_for_a_landed_upload() {
        let store = RetryingStore::new(MemoryStore::new(), fast_policy());
        let root = store.create_folder("root", None).await.unwrap();
        store
            .upload_content(&root, "world.zip", vec![1])
            .await
            .unwrap();
        store.inner().fail_uploads_titled("world.zip").await;

        assert!(store
            .upload_content(&root, "world.zip", vec![2])
            .await
            .is_err());
        assert_eq!(store.inner().titles_in(&root).await, vec!["world.zip"]);
    }

    #[tokio::test]
    async fn landed_upload_is_returned_without_a_second_copy() {
        let store = RetryingStore::new(MemoryStore::new(), fast_policy());
        let root = store.create_folder("root", None).await.unwrap();
        store
            .upload_content(&root, "world.zip", vec![1])
            .await
            .unwrap();
        store.inner().fail_once_after_applying("world.zip").await;

        let file = store
            .upload_content(&root, "world.zip", vec![2])
            .await
            .unwrap();

        assert_eq!(store.inner().content_of(&file.id).await, Some(vec![2]));
        assert_eq!(
            store.inner().titles_in(&root).await,
            vec!["world.zip", "world.zip"]
        );
    }

    #[tokio::test]
    async fn delete_that_landed_counts_as_done() {
        let store = RetryingStore::new(MemoryStore::new(), fast_policy());
        let root = store.create_folder("root", None).await.unwrap();
        let file = store
            .upload_content(&root, "old.zip", vec![1])
            .await
            .unwrap();
        store.inner().fail_once_after_applying("old.zip").await;

        store.delete_entry(&file.id).await.unwrap();
        assert!(store.inner().titles_in(&root).await.is_empty());
    }

    #[tokio::test]
    async fn folder_created_by_a_failed_attempt_is_reused() {
        let store = RetryingStore::new(MemoryStore::new(), fast_policy());
        let root = store.create_folder("root", None).await.unwrap();
        store.inner().fail_once_after_applying("Vanilla").await;

        let folder = store.create_folder("Vanilla", Some(&root)).await.unwrap();

        assert_eq!(folder.name, "Vanilla");
        assert_eq!(store.inner().folders_created().await, 2);
        assert_eq!(store.inner().titles_in(&root).await, vec!["Vanilla"]);
    }
}
