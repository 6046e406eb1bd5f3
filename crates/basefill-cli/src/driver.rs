use std::sync::Arc;
use std::time::Instant;

use basefill_core::index::{BACKFILL_QUERY, BulkWriter, IndexClient, SampledSelector, ScrollCursor};
use basefill_core::{AppConfig, LicenseNormalizer, Result, build_backfill_action};
use basefill_scrape::{PageScraper, Record, ScrapeCoordinator, ScrapeSummary};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Totals over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: usize,
    pub scraped: usize,
    pub scrape_failures: usize,
    pub saved: usize,
    pub write_failures: usize,
    pub cancelled: bool,
}

/// Ties selection, scraping and writing together for one run.
pub struct Pipeline {
    client: IndexClient,
    scraper: Arc<dyn PageScraper>,
    normalizer: Arc<dyn LicenseNormalizer>,
    config: AppConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        client: IndexClient,
        scraper: Arc<dyn PageScraper>,
        normalizer: Arc<dyn LicenseNormalizer>,
        config: AppConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            scraper,
            normalizer,
            config,
            cancel,
        }
    }

    /// Scrape random pages of unenriched records until a page comes back
    /// empty or shutdown is requested.
    ///
    /// Records whose scrape was cancelled get no action, so they stay
    /// eligible for the next run.
    pub async fn run_sampled(&self) -> Result<RunSummary> {
        let selector = SampledSelector::new(self.client.clone(), self.config.index.search_timeout());
        let coordinator = ScrapeCoordinator::new(Arc::clone(&self.scraper), self.cancel.clone())
            .with_workers(self.config.scrape.workers)
            .with_record_timeout(self.config.scrape.record_timeout());
        let writer = BulkWriter::new(self.client.clone());
        let (index_name, type_name) = (self.client.index_name(), self.client.type_name());
        let mut summary = RunSummary::default();

        info!(workers = coordinator.workers(), "starting sampled enrichment");
        loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                info!("shutdown requested, not starting another cycle");
                break;
            }

            let page = selector.next_page().await?;
            if page.is_empty() {
                info!("no unenriched records left");
                break;
            }

            let cycle_start = Instant::now();
            let records: Vec<Record> = page.into_iter().map(Record::new).collect();
            let mut records = coordinator.run(records).await;
            let scrape = ScrapeSummary::of(&records);

            let mut actions = Vec::with_capacity(records.len());
            for record in records.iter_mut().filter(|r| !r.is_cancelled()) {
                record.reduce(self.normalizer.as_ref())?;
                actions.push(record.to_action().with_target(index_name, type_name));
            }

            let report = writer
                .save(&actions, self.config.bulk.threads, self.config.bulk.chunk_size)
                .await?;

            summary.cycles += 1;
            summary.scraped += scrape.records - scrape.cancelled;
            summary.scrape_failures += scrape.failed;
            summary.saved += report.written();
            summary.write_failures += report.failed;

            info!(
                cycle = summary.cycles,
                found = scrape.found,
                scrape_failures = scrape.failed,
                write_failures = report.failed,
                "scraped {} records, saved {} in {:.2}s",
                scrape.records - scrape.cancelled,
                report.written(),
                cycle_start.elapsed().as_secs_f64()
            );
        }

        Ok(summary)
    }

    /// Stamp every `oa=1` record that was never backfilled, using only what
    /// the record already carries. Actions are flushed every
    /// `backfill_flush_every` hits, then once more for the remainder.
    pub async fn run_backfill(&self) -> Result<RunSummary> {
        let index = &self.config.index;
        let bulk = &self.config.bulk;
        let mut cursor = ScrollCursor::new(
            self.client.clone(),
            &BACKFILL_QUERY,
            &index.scroll_keep_alive,
            index.scroll_size,
        );
        let writer = BulkWriter::new(self.client.clone());
        let flush_every = bulk.backfill_flush_every.max(1);
        let mut buffer = Vec::with_capacity(flush_every);
        let mut summary = RunSummary::default();
        let start = Instant::now();

        info!("starting backfill");
        while let Some(hit) = cursor.next().await? {
            let id = hit.id.clone();
            let record = hit.into_record();
            let action = build_backfill_action(&id, &record, self.normalizer.as_ref(), Utc::now())
                .with_target(self.client.index_name(), self.client.type_name());
            buffer.push(action);
            summary.scraped += 1;

            if buffer.len() >= flush_every {
                let report = writer.save(&buffer, bulk.threads, bulk.chunk_size).await?;
                summary.cycles += 1;
                summary.saved += report.written();
                summary.write_failures += report.failed;
                buffer.clear();
                info!(seen = summary.scraped, "flushed {} backfill actions", report.submitted);
            }

            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                info!("shutdown requested, flushing what was read");
                break;
            }
        }

        let report = writer.save(&buffer, 1, bulk.chunk_size).await?;
        if report.submitted > 0 {
            summary.cycles += 1;
        }
        summary.saved += report.written();
        summary.write_failures += report.failed;

        info!(
            saved = summary.saved,
            write_failures = summary.write_failures,
            "backfilled {} records in {:.2}s",
            summary.scraped,
            start.elapsed().as_secs_f64()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use basefill_core::config::IndexConfig;
    use basefill_core::{IndexError, PipelineError, TableLicenseNormalizer};
    use basefill_scrape::{PageScrape, ScrapeError};
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::{Value, json};

    use super::*;

    /// Full text on every URL containing "open"; cancels the run on "stop".
    struct FakeScraper {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl PageScraper for FakeScraper {
        async fn scrape(&self, url: &str) -> std::result::Result<PageScrape, ScrapeError> {
            if url.contains("stop") {
                self.cancel.cancel();
            }
            if url.contains("open") {
                Ok(PageScrape::found(format!("{url}.pdf"), Some("cc-by".to_string())))
            } else {
                Ok(PageScrape::no_fulltext())
            }
        }
    }

    fn pipeline(server: &ServerGuard, config: AppConfig, cancel: CancellationToken) -> Pipeline {
        let client = IndexClient::new(&IndexConfig {
            url: server.url(),
            max_retries: 0,
            ..config.index.clone()
        })
        .unwrap();
        Pipeline::new(
            client,
            Arc::new(FakeScraper {
                cancel: cancel.clone(),
            }),
            Arc::new(TableLicenseNormalizer),
            config,
            cancel,
        )
    }

    fn search_page(hits: Value) -> String {
        json!({"hits": {"total": 2, "hits": hits}}).to_string()
    }

    fn bulk_ok(ids: &[&str]) -> String {
        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({"update": {"_index": "base", "_id": id, "status": 200}}))
            .collect();
        json!({"errors": false, "items": items}).to_string()
    }

    #[tokio::test]
    async fn sampled_run_stops_on_empty_page() {
        let mut server = Server::new_async().await;
        let page = server
            .mock("POST", "/base/_search")
            .with_status(200)
            .with_body(search_page(json!([
                {"_id": "a", "_source": {"id": "a", "oa": 2, "urls": ["https://x.org/open/a"]}},
                {"_id": "b", "_source": {"id": "b", "oa": 2, "urls": ["https://x.org/closed/b"]}}
            ])))
            .expect(1)
            .create_async()
            .await;
        let empty = server
            .mock("POST", "/base/_search")
            .with_status(200)
            .with_body(search_page(json!([])))
            .expect(1)
            .create_async()
            .await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_query(Matcher::Any)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""fulltext_license":"cc-by""#.to_string()),
                Matcher::Regex(r#""pdf_landing_page":"https://x.org/open/a""#.to_string()),
                Matcher::Regex(r#""_id":"b""#.to_string()),
            ]))
            .with_status(200)
            .with_body(bulk_ok(&["a", "b"]))
            .expect(1)
            .create_async()
            .await;

        let run = pipeline(&server, AppConfig::default(), CancellationToken::new());
        let summary = tokio::time::timeout(Duration::from_secs(10), run.run_sampled())
            .await
            .expect("sampled run did not stop")
            .unwrap();

        page.assert_async().await;
        empty.assert_async().await;
        bulk.assert_async().await;
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.scraped, 2);
        assert_eq!(summary.saved, 2);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn sampled_run_with_nothing_to_do_writes_nothing() {
        let mut server = Server::new_async().await;
        let _search = server
            .mock("POST", "/base/_search")
            .with_status(200)
            .with_body(search_page(json!([])))
            .create_async()
            .await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let run = pipeline(&server, AppConfig::default(), CancellationToken::new());
        let summary = run.run_sampled().await.unwrap();

        bulk.assert_async().await;
        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn shutdown_ends_sampled_run_after_current_cycle() {
        let mut server = Server::new_async().await;
        let search = server
            .mock("POST", "/base/_search")
            .with_status(200)
            .with_body(search_page(json!([
                {"_id": "s", "_source": {"id": "s", "oa": 2, "urls": ["https://x.org/stop/open"]}}
            ])))
            .expect(1)
            .create_async()
            .await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(bulk_ok(&["s"]))
            .expect(1)
            .create_async()
            .await;

        let run = pipeline(&server, AppConfig::default(), CancellationToken::new());
        let summary = tokio::time::timeout(Duration::from_secs(10), run.run_sampled())
            .await
            .expect("sampled run did not stop")
            .unwrap();

        search.assert_async().await;
        bulk.assert_async().await;
        assert!(summary.cancelled);
        assert_eq!(summary.cycles, 1);
    }

    #[tokio::test]
    async fn sampled_run_fails_on_missing_hits() {
        let mut server = Server::new_async().await;
        let _search = server
            .mock("POST", "/base/_search")
            .with_status(200)
            .with_body(json!({"took": 3}).to_string())
            .create_async()
            .await;

        let run = pipeline(&server, AppConfig::default(), CancellationToken::new());
        let err = run.run_sampled().await.unwrap_err();
        assert!(matches!(err, PipelineError::Index(IndexError::MissingTag(_))));
    }

    #[tokio::test]
    async fn sampled_run_writes_to_configured_typeless_index() {
        let mut server = Server::new_async().await;
        let _page = server
            .mock("POST", "/papers/_search")
            .with_status(200)
            .with_body(search_page(json!([
                {"_id": "a", "_source": {"id": "a", "oa": 2, "urls": ["https://x.org/open/a"]}}
            ])))
            .expect(1)
            .create_async()
            .await;
        let _empty = server
            .mock("POST", "/papers/_search")
            .with_status(200)
            .with_body(search_page(json!([])))
            .create_async()
            .await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_query(Matcher::Any)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""_index":"papers""#.to_string()),
                Matcher::Regex(r"^(?:[^_\n]|_[^t\n])*\n".to_string()),
            ]))
            .with_status(200)
            .with_body(bulk_ok(&["a"]))
            .expect(1)
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.index.index_name = "papers".to_string();
        config.index.type_name = String::new();
        let run = pipeline(&server, config, CancellationToken::new());
        let summary = tokio::time::timeout(Duration::from_secs(10), run.run_sampled())
            .await
            .expect("sampled run did not stop")
            .unwrap();

        bulk.assert_async().await;
        assert_eq!(summary.saved, 1);
    }

    async fn mock_scroll(server: &mut ServerGuard, hits: usize) -> Vec<Mock> {
        mock_scroll_on(server, "base", hits).await
    }

    async fn mock_scroll_on(server: &mut ServerGuard, index: &str, hits: usize) -> Vec<Mock> {
        let hits: Vec<Value> = (0..hits)
            .map(|i| json!({"_id": format!("h{i}"), "_source": {"oa": 1, "license": "CC-BY", "urls": [format!("https://x.org/{i}")]}}))
            .collect();
        vec![
            server
                .mock("POST", format!("/{index}/_search").as_str())
                .match_query(Matcher::UrlEncoded("scroll".into(), "5m".into()))
                .with_status(200)
                .with_body(json!({"_scroll_id": "s1", "hits": {"hits": hits}}).to_string())
                .create_async()
                .await,
            server
                .mock("POST", "/_search/scroll")
                .with_status(200)
                .with_body(json!({"_scroll_id": "s2", "hits": {"hits": []}}).to_string())
                .create_async()
                .await,
            server
                .mock("DELETE", "/_search/scroll")
                .with_status(200)
                .with_body(json!({"succeeded": true}).to_string())
                .create_async()
                .await,
        ]
    }

    #[tokio::test]
    async fn backfill_flushes_in_batches_then_once_more() {
        let mut server = Server::new_async().await;
        let _scroll = mock_scroll(&mut server, 5).await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(r#""fulltext_urls":\["https://x.org/\d"\]"#.to_string()))
            .with_status(200)
            .with_body(bulk_ok(&["h"]))
            .expect(3)
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.bulk.backfill_flush_every = 2;
        let run = pipeline(&server, config, CancellationToken::new());
        let summary = run.run_backfill().await.unwrap();

        // 2 + 2 in full flushes, 1 in the final one
        bulk.assert_async().await;
        assert_eq!(summary.scraped, 5);
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.saved, 5);
    }

    #[tokio::test]
    async fn backfill_final_flush_skips_empty_remainder() {
        let mut server = Server::new_async().await;
        let _scroll = mock_scroll(&mut server, 4).await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(r#""fulltext_license":"cc-by""#.to_string()))
            .with_status(200)
            .with_body(bulk_ok(&["h"]))
            .expect(2)
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.bulk.backfill_flush_every = 2;
        let run = pipeline(&server, config, CancellationToken::new());
        let summary = run.run_backfill().await.unwrap();

        bulk.assert_async().await;
        assert_eq!(summary.scraped, 4);
        assert_eq!(summary.cycles, 2);
    }

    #[tokio::test]
    async fn backfill_writes_to_configured_index_and_type() {
        let mut server = Server::new_async().await;
        let _scroll = mock_scroll_on(&mut server, "records_v2", 3).await;
        let bulk = server
            .mock("POST", "/_bulk")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex(
                r#""_index":"records_v2","_type":"paper""#.to_string(),
            ))
            .with_status(200)
            .with_body(bulk_ok(&["h"]))
            .expect(1)
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.index.index_name = "records_v2".to_string();
        config.index.type_name = "paper".to_string();
        let run = pipeline(&server, config, CancellationToken::new());
        let summary = run.run_backfill().await.unwrap();

        bulk.assert_async().await;
        assert_eq!(summary.scraped, 3);
        assert_eq!(summary.saved, 3);
        assert_eq!(summary.write_failures, 0);
    }

    #[tokio::test]
    async fn backfill_stops_when_index_is_gone() {
        let mut server = Server::new_async().await;
        let _scroll = server
            .mock("POST", "/base/_search")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let run = pipeline(&server, AppConfig::default(), CancellationToken::new());
        let err = run.run_backfill().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Index(IndexError::RetriesExhausted { .. })
        ));
    }
}
