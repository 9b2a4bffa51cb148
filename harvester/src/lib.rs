use async_trait::async_trait;
use chrono::Utc;
use moltbook_client::{normalize, MoltbookClient};
use moltscrape_core::{CoreError, HarvestConfig, PostRecord, RunSummary};
use serde_json::Value;
use storage::{HarvestState, PostSink, StateStore};
use tracing::{debug, info, warn};

/// Seam over the page-fetch boundary so the harvest loop can be driven by a
/// scripted feed in tests.
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch_page(
        &self,
        submolt: &str,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<Value>, CoreError>;
}

#[async_trait]
impl PageFetch for MoltbookClient {
    async fn fetch_page(
        &self,
        submolt: &str,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<Value>, CoreError> {
        self.get_posts(Some(submolt), sort, limit).await
    }
}

/// Drives repeated fetch-normalize-dedup cycles per submolt and keeps the
/// cumulative state durable.
///
/// Each submolt is scraped to its own stopping condition, in caller order:
/// the loop ends when the requested count of new posts is reached, when a
/// page comes back empty (feed exhausted; failed fetches count as empty), or
/// after three consecutive non-empty pages containing only already-seen
/// posts (feed front saturated). State is flushed after each submolt, so an
/// interrupted run loses at most the in-flight submolt's progress and dedup
/// makes re-fetching it idempotent.
pub struct Harvester<F: PageFetch> {
    fetcher: F,
    state: HarvestState,
    store: StateStore,
    sink: PostSink,
    config: HarvestConfig,
}

impl<F: PageFetch> Harvester<F> {
    pub fn new(
        fetcher: F,
        store: StateStore,
        sink: PostSink,
        config: HarvestConfig,
    ) -> Result<Self, CoreError> {
        let state = store.load()?;
        Ok(Self {
            fetcher,
            state,
            store,
            sink,
            config,
        })
    }

    /// Collect up to `target_count` not-yet-seen posts from one submolt.
    pub async fn scrape_submolt(
        &mut self,
        submolt: &str,
        target_count: usize,
    ) -> Vec<PostRecord> {
        info!(submolt, target_count, "Scraping submolt");

        let mut collected: Vec<PostRecord> = Vec::new();
        let mut page = 0u32;
        let mut stale_pages = 0u32;

        while collected.len() < target_count && stale_pages < self.config.max_stale_pages {
            let raw_items = match self
                .fetcher
                .fetch_page(submolt, &self.config.sort, self.config.page_size)
                .await
            {
                Ok(items) => items,
                Err(e) => {
                    warn!(submolt, error = %e, "Page fetch failed, treating as empty");
                    Vec::new()
                }
            };

            if raw_items.is_empty() {
                debug!(submolt, "No more posts returned");
                break;
            }

            // One ingestion timestamp per page: every record from the same
            // fetch shares it.
            let scraped_at = Utc::now().to_rfc3339();
            let mut new_in_page = 0usize;

            for raw in &raw_items {
                let Some(post_id) = raw
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                else {
                    continue;
                };
                if !self.state.is_new(post_id) {
                    continue;
                }

                let record = normalize(raw, &scraped_at);
                self.state.record_author(&record);
                self.state.mark_seen(post_id);
                collected.push(record);
                new_in_page += 1;

                if collected.len() >= target_count {
                    break;
                }
            }

            if new_in_page == 0 {
                stale_pages += 1;
            } else {
                stale_pages = 0;
            }

            page += 1;
            info!(
                submolt,
                page,
                new_in_page,
                total = collected.len(),
                "Page processed"
            );
        }

        info!(submolt, collected = collected.len(), "Submolt done");
        collected
    }

    /// Scrape every requested submolt in order, appending records to the
    /// per-submolt sinks and flushing state after each one.
    pub async fn run(
        &mut self,
        submolts: &[String],
        posts_per_submolt: usize,
    ) -> Result<RunSummary, CoreError> {
        info!(
            ?submolts,
            posts_per_submolt,
            already_seen = self.state.seen_count(),
            "Harvest starting"
        );

        let mut new_posts = 0usize;
        for submolt in submolts {
            let records = self.scrape_submolt(submolt, posts_per_submolt).await;
            self.sink.append(submolt, &records)?;
            new_posts += records.len();
            self.store.flush(&self.state)?;
        }

        let summary = RunSummary {
            new_posts,
            total_seen: self.state.seen_count(),
            total_authors: self.state.author_count(),
        };
        info!(
            new_posts = summary.new_posts,
            total_seen = summary.total_seen,
            total_authors = summary.total_authors,
            "Harvest complete"
        );
        Ok(summary)
    }

    pub fn state(&self) -> &HarvestState {
        &self.state
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moltscrape_core::UNKNOWN_AUTHOR;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Feed that returns a scripted sequence of pages, then empty pages.
    struct ScriptedFeed {
        pages: Mutex<Vec<Vec<Value>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(pages: Vec<Vec<Value>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetch for ScriptedFeed {
        async fn fetch_page(
            &self,
            _submolt: &str,
            _sort: &str,
            _limit: u32,
        ) -> Result<Vec<Value>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(pages.remove(0))
            }
        }
    }

    /// Feed that always returns the same page.
    struct RepeatingFeed {
        page: Vec<Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageFetch for RepeatingFeed {
        async fn fetch_page(
            &self,
            _submolt: &str,
            _sort: &str,
            _limit: u32,
        ) -> Result<Vec<Value>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.page.clone())
        }
    }

    /// Feed of endless fresh posts with globally unique ids.
    struct InfiniteFeed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageFetch for InfiniteFeed {
        async fn fetch_page(
            &self,
            _submolt: &str,
            _sort: &str,
            limit: u32,
        ) -> Result<Vec<Value>, CoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..limit)
                .map(|i| post(&format!("p{}-{}", call, i), "alice", "general"))
                .collect())
        }
    }

    fn post(id: &str, author: &str, submolt: &str) -> Value {
        json!({
            "id": id,
            "title": format!("post {id}"),
            "author": {"name": author},
            "submolt": {"name": submolt},
            "upvotes": 1,
            "downvotes": 0
        })
    }

    fn page_of(ids: &[&str]) -> Vec<Value> {
        ids.iter().map(|id| post(id, "alice", "general")).collect()
    }

    fn harvester<F: PageFetch>(dir: &TempDir, fetcher: F) -> Harvester<F> {
        let store = StateStore::new(dir.path()).unwrap();
        let sink = PostSink::new(dir.path()).unwrap();
        Harvester::new(fetcher, store, sink, HarvestConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_target_reached_stops_mid_page() {
        let dir = TempDir::new().unwrap();
        let mut h = harvester(&dir, InfiniteFeed { calls: AtomicUsize::new(0) });

        let collected = h.scrape_submolt("general", 40).await;

        assert_eq!(collected.len(), 40);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);
        // Only the retained 40 of the 50 fetched are marked seen
        assert_eq!(h.state().seen_count(), 40);
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_partial_collection() {
        let dir = TempDir::new().unwrap();
        let feed = ScriptedFeed::new(vec![page_of(&[
            "a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8", "a9", "a10",
        ])]);
        let mut h = harvester(&dir, feed);

        let collected = h.scrape_submolt("general", 100).await;

        assert_eq!(collected.len(), 10);
        assert_eq!(h.fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_saturation_stops_after_three_stale_pages() {
        let dir = TempDir::new().unwrap();
        let ids: Vec<String> = (0..25).map(|i| format!("dup{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let feed = RepeatingFeed {
            page: page_of(&id_refs),
            calls: AtomicUsize::new(0),
        };
        let mut h = harvester(&dir, feed);
        for id in &ids {
            h.state.mark_seen(id);
        }

        let collected = h.scrape_submolt("general", 100).await;

        assert!(collected.is_empty());
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stale_counter_resets_on_new_posts() {
        let dir = TempDir::new().unwrap();
        // Two all-duplicate pages, one fresh page, then two more duplicate
        // pages would still leave the counter below the threshold; the feed
        // ends by repeating duplicates until saturation.
        let feed = ScriptedFeed::new(vec![
            page_of(&["dup"]),
            page_of(&["dup"]),
            page_of(&["fresh"]),
            page_of(&["dup"]),
            page_of(&["dup"]),
            page_of(&["dup"]),
        ]);
        let mut h = harvester(&dir, feed);
        h.state.mark_seen("dup");

        let collected = h.scrape_submolt("general", 100).await;

        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].post_id, "fresh");
        // 2 stale + 1 fresh (reset) + 3 stale = saturation after 6 pages
        assert_eq!(h.fetcher.call_count(), 6);
    }

    #[tokio::test]
    async fn test_fetch_error_ends_collection() {
        struct FailingFeed;

        #[async_trait]
        impl PageFetch for FailingFeed {
            async fn fetch_page(
                &self,
                _submolt: &str,
                _sort: &str,
                _limit: u32,
            ) -> Result<Vec<Value>, CoreError> {
                Err(moltscrape_core::ApiError::RequestTimeout.into())
            }
        }

        let dir = TempDir::new().unwrap();
        let mut h = harvester(&dir, FailingFeed);

        let collected = h.scrape_submolt("general", 100).await;
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn test_items_without_id_are_skipped() {
        let dir = TempDir::new().unwrap();
        let feed = ScriptedFeed::new(vec![vec![
            json!({"title": "no id"}),
            json!({"id": "", "title": "empty id"}),
            post("real", "alice", "general"),
        ]]);
        let mut h = harvester(&dir, feed);

        let collected = h.scrape_submolt("general", 100).await;

        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].post_id, "real");
        assert_eq!(h.state().seen_count(), 1);
    }

    #[tokio::test]
    async fn test_idempotence_across_runs() {
        let dir = TempDir::new().unwrap();
        let submolts = vec!["general".to_string()];

        let feed = ScriptedFeed::new(vec![page_of(&["p1", "p2", "p3"])]);
        let mut h = harvester(&dir, feed);
        let summary = h.run(&submolts, 100).await.unwrap();
        assert_eq!(summary.new_posts, 3);
        drop(h);

        // Second run over the same feed, fresh process: state reloads from
        // disk and every post is a duplicate.
        let feed = ScriptedFeed::new(vec![page_of(&["p1", "p2", "p3"])]);
        let mut h = harvester(&dir, feed);
        let summary = h.run(&submolts, 100).await.unwrap();
        assert_eq!(summary.new_posts, 0);
        assert_eq!(summary.total_seen, 3);

        // The CSV holds exactly one row per post across both runs
        let csv = std::fs::read_to_string(dir.path().join("posts/general.csv")).unwrap();
        assert_eq!(csv.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_registry_accumulates_across_submolts() {
        let dir = TempDir::new().unwrap();
        let feed = ScriptedFeed::new(vec![
            vec![
                post("p1", "alice", "general"),
                post("p2", "alice", "general"),
            ],
            vec![post("p3", "alice", "crabs")],
        ]);
        let mut h = harvester(&dir, feed);

        h.scrape_submolt("general", 2).await;
        h.scrape_submolt("crabs", 1).await;

        let alice = h.state().author("alice").unwrap();
        assert_eq!(alice.post_count, 3);
        assert_eq!(alice.submolts, vec!["general", "crabs"]);
    }

    #[tokio::test]
    async fn test_unknown_author_not_registered() {
        let dir = TempDir::new().unwrap();
        let feed = ScriptedFeed::new(vec![vec![
            json!({"id": "p1", "title": "orphan"}),
            json!({"id": "p2", "author": ""}),
        ]]);
        let mut h = harvester(&dir, feed);

        let collected = h.scrape_submolt("general", 100).await;

        assert_eq!(collected.len(), 2);
        assert_eq!(h.state().author_count(), 0);
        assert!(h.state().author(UNKNOWN_AUTHOR).is_none());
    }

    #[tokio::test]
    async fn test_page_shares_one_scraped_at() {
        let dir = TempDir::new().unwrap();
        let feed = ScriptedFeed::new(vec![page_of(&["p1", "p2", "p3"])]);
        let mut h = harvester(&dir, feed);

        let collected = h.scrape_submolt("general", 100).await;

        assert_eq!(collected.len(), 3);
        assert_eq!(collected[0].scraped_at, collected[1].scraped_at);
        assert_eq!(collected[1].scraped_at, collected[2].scraped_at);
    }

    #[tokio::test]
    async fn test_run_flushes_state_per_submolt() {
        let dir = TempDir::new().unwrap();
        let feed = ScriptedFeed::new(vec![page_of(&["p1", "p2"])]);
        let mut h = harvester(&dir, feed);

        h.run(&["general".to_string()], 100).await.unwrap();

        let store = StateStore::new(dir.path()).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(&reloaded, h.state());
        assert!(!reloaded.is_new("p1"));
        assert_eq!(reloaded.author("alice").unwrap().post_count, 2);
    }
}
