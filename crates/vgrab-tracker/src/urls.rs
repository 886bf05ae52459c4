//! Scrape request tracker.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use vgrab_models::{ScrapeSummary, UrlQuery, UrlRecord, UrlSortKey, UrlStatus};
use vgrab_store::StateStore;

use crate::error::{TrackerError, TrackerResult};

/// Hash holding URL records, field = record ID.
const URLS_HASH: &str = "urls";

/// Extract the `<title>` text from an HTML document head.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let open_end = lower[start..].find('>')? + start + 1;
    let close = lower[open_end..].find("</title")? + open_end;
    let title = html[open_end..close].trim();
    if title.is_empty() {
        None
    } else {
        Some(decode_entities(title))
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// State machine per scrape request.
///
/// Transitions are monotonic: `waiting → processing → done|error|cancelled`.
/// A terminal record can only be replaced by deleting it and creating a
/// fresh one (re-scrape).
pub struct UrlTracker {
    store: Arc<StateStore>,
}

impl UrlTracker {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    async fn persist(&self, record: &UrlRecord) -> TrackerResult<()> {
        let raw = serde_json::to_string(record)?;
        self.store.hset(URLS_HASH, &record.id, &raw).await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> TrackerResult<UrlRecord> {
        let raw = self
            .store
            .hget(URLS_HASH, id)
            .await
            .ok_or_else(|| TrackerError::not_found(id))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Create a waiting record for a new scrape request.
    pub async fn create(&self, url: &str) -> TrackerResult<UrlRecord> {
        let record = UrlRecord::new(url);
        self.persist(&record).await?;
        debug!(id = %record.id, url, "created url record");
        Ok(record)
    }

    /// Fetch one record.
    pub async fn get(&self, id: &str) -> TrackerResult<UrlRecord> {
        self.load(id).await
    }

    /// Move a waiting record to `processing`.
    pub async fn mark_processing(&self, id: &str) -> TrackerResult<UrlRecord> {
        let mut record = self.load(id).await?;
        if record.status != UrlStatus::Waiting {
            return Err(TrackerError::invalid_state(format!(
                "cannot start {} record {}",
                record.status, id
            )));
        }
        record.status = UrlStatus::Processing;
        record.started_at = Some(Utc::now());
        self.persist(&record).await?;
        Ok(record)
    }

    /// Complete a record with its render summary.
    pub async fn complete(
        &self,
        id: &str,
        summary: ScrapeSummary,
        cache_key: Option<String>,
    ) -> TrackerResult<UrlRecord> {
        let mut record = self.load(id).await?;
        if record.status.is_terminal() {
            return Err(TrackerError::invalid_state(format!(
                "record {} is already {}",
                id, record.status
            )));
        }
        record.status = UrlStatus::Done;
        record.completed_at = Some(Utc::now());
        record.result = Some(summary);
        record.cache_key = cache_key;
        record.error = None;
        self.persist(&record).await?;
        Ok(record)
    }

    /// Fail a record with an error message.
    pub async fn fail(&self, id: &str, error: impl Into<String>) -> TrackerResult<UrlRecord> {
        let mut record = self.load(id).await?;
        if record.status.is_terminal() {
            return Err(TrackerError::invalid_state(format!(
                "record {} is already {}",
                id, record.status
            )));
        }
        record.status = UrlStatus::Error;
        record.completed_at = Some(Utc::now());
        record.error = Some(error.into());
        self.persist(&record).await?;
        Ok(record)
    }

    /// Cancel a record. Succeeds only from `waiting` or `processing`.
    pub async fn cancel(&self, id: &str) -> TrackerResult<bool> {
        let mut record = self.load(id).await?;
        if record.status.is_terminal() {
            return Ok(false);
        }
        record.status = UrlStatus::Cancelled;
        record.completed_at = Some(Utc::now());
        self.persist(&record).await?;
        Ok(true)
    }

    /// Delete a record. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> TrackerResult<bool> {
        Ok(self.store.hdel(URLS_HASH, id).await)
    }

    /// Delete several records, returning the number removed.
    pub async fn delete_many(&self, ids: &[String]) -> TrackerResult<usize> {
        let mut removed = 0;
        for id in ids {
            if self.store.hdel(URLS_HASH, id).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Every record, unfiltered.
    pub async fn all(&self) -> TrackerResult<Vec<UrlRecord>> {
        let map = self.store.hgetall(URLS_HASH).await;
        let mut records = Vec::with_capacity(map.len());
        for raw in map.values() {
            match serde_json::from_str::<UrlRecord>(raw) {
                Ok(record) => records.push(record),
                Err(e) => debug!("skipping undecodable url record: {}", e),
            }
        }
        Ok(records)
    }

    /// Filtered, sorted, paginated listing with the pre-pagination total.
    pub async fn list(&self, query: &UrlQuery) -> TrackerResult<(Vec<UrlRecord>, usize)> {
        let mut records = self.all().await?;

        if let Some(status) = query.status {
            records.retain(|r| r.status == status);
        }
        if let Some(search) = &query.search {
            let needle = search.to_ascii_lowercase();
            records.retain(|r| r.url.to_ascii_lowercase().contains(&needle));
        }
        if let Some(from) = query.from {
            records.retain(|r| r.created_at >= from);
        }
        if let Some(to) = query.to {
            records.retain(|r| r.created_at <= to);
        }

        records.sort_by(|a, b| {
            let ordering = match query.sort {
                UrlSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                UrlSortKey::CompletedAt => a.completed_at.cmp(&b.completed_at),
                UrlSortKey::Url => a.url.cmp(&b.url),
                UrlSortKey::Status => a.status.as_str().cmp(b.status.as_str()),
            };
            if query.desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let total = records.len();
        let page = if query.limit == 0 {
            records.into_iter().skip(query.offset).collect()
        } else {
            records
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .collect()
        };
        Ok((page, total))
    }

    /// Counts per status for the dashboard.
    pub async fn counts(&self) -> TrackerResult<std::collections::HashMap<String, usize>> {
        let records = self.all().await?;
        let mut counts = std::collections::HashMap::new();
        counts.insert("total".to_string(), records.len());
        for record in records {
            *counts.entry(record.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> UrlTracker {
        UrlTracker::new(Arc::new(StateStore::in_memory()))
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><head><title>My Page</title></head></html>"),
            Some("My Page".to_string())
        );
        assert_eq!(
            extract_title("<TITLE lang=\"en\"> Spaced &amp; Encoded </TITLE>"),
            Some("Spaced & Encoded".to_string())
        );
        assert_eq!(extract_title("<html><body>no title</body></html>"), None);
        assert_eq!(extract_title("<title></title>"), None);
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let tracker = tracker();
        let record = tracker.create("https://example.com").await.unwrap();
        assert_eq!(record.status, UrlStatus::Waiting);

        let record = tracker.mark_processing(&record.id).await.unwrap();
        assert_eq!(record.status, UrlStatus::Processing);
        assert!(record.started_at.is_some());
        assert!(record.completed_at.is_none());

        let record = tracker
            .complete(&record.id, ScrapeSummary::default(), None)
            .await
            .unwrap();
        assert_eq!(record.status, UrlStatus::Done);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_no_reverse_transitions() {
        let tracker = tracker();
        let record = tracker.create("https://example.com").await.unwrap();
        tracker.mark_processing(&record.id).await.unwrap();
        tracker.fail(&record.id, "boom").await.unwrap();

        assert!(tracker.mark_processing(&record.id).await.is_err());
        assert!(tracker
            .complete(&record.id, ScrapeSummary::default(), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancel_only_from_live_states() {
        let tracker = tracker();
        let record = tracker.create("https://example.com").await.unwrap();
        assert!(tracker.cancel(&record.id).await.unwrap());

        // Terminal now: a second cancel reports failure.
        assert!(!tracker.cancel(&record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let tracker = tracker();
        for i in 0..5 {
            tracker
                .create(&format!("https://site-{}.example.com", i))
                .await
                .unwrap();
        }
        let done = tracker.create("https://done.example.com").await.unwrap();
        tracker.mark_processing(&done.id).await.unwrap();
        tracker
            .complete(&done.id, ScrapeSummary::default(), None)
            .await
            .unwrap();

        let (page, total) = tracker
            .list(&UrlQuery {
                status: Some(UrlStatus::Waiting),
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);

        let (found, total) = tracker
            .list(&UrlQuery {
                search: Some("site-3".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(found[0].url.contains("site-3"));
    }

    #[tokio::test]
    async fn test_delete_and_counts() {
        let tracker = tracker();
        let a = tracker.create("https://a.example.com").await.unwrap();
        tracker.create("https://b.example.com").await.unwrap();

        assert!(tracker.delete(&a.id).await.unwrap());
        assert!(!tracker.delete(&a.id).await.unwrap());

        let counts = tracker.counts().await.unwrap();
        assert_eq!(counts.get("total"), Some(&1));
        assert_eq!(counts.get("waiting"), Some(&1));
    }
}
