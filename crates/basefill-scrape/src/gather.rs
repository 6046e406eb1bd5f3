use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};

use crate::error::Result;
use crate::page::{PageScrape, PageScraper};

/// What a bounded wait got back.
#[derive(Debug)]
pub struct Gathered<T> {
    /// Results of tasks that completed before the deadline, in completion
    /// order.
    pub finished: Vec<T>,
    /// Tasks still running at the deadline. They were aborted and their
    /// results are gone.
    pub dropped: usize,
    /// Tasks that panicked.
    pub crashed: usize,
}

impl<T> Gathered<T> {
    pub fn is_complete(&self) -> bool {
        self.dropped == 0 && self.crashed == 0
    }
}

/// Start every task at once and collect whatever finishes within `deadline`.
///
/// Late tasks are aborted and only counted. Callers that need every result
/// should use [`ScrapeCoordinator`](crate::ScrapeCoordinator) instead.
pub async fn gather_within<F, T>(tasks: Vec<F>, deadline: Duration) -> Gathered<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(task);
    }

    let until = Instant::now() + deadline;
    let mut gathered = Gathered {
        finished: Vec::with_capacity(set.len()),
        dropped: 0,
        crashed: 0,
    };

    loop {
        match timeout_at(until, set.join_next()).await {
            Ok(Some(Ok(value))) => gathered.finished.push(value),
            Ok(Some(Err(e))) => {
                tracing::warn!("in gathered task, got error: {}", e);
                gathered.crashed += 1;
            }
            Ok(None) => break,
            Err(_) => {
                gathered.dropped = set.len();
                set.abort_all();
                break;
            }
        }
    }

    if gathered.dropped > 0 {
        tracing::warn!(
            "{} tasks still running after {:?}, dropped",
            gathered.dropped,
            deadline
        );
    }
    gathered
}

/// Scrape many URLs at once, each with its own call to `scraper`.
pub async fn scrape_targets_in_parallel(
    scraper: Arc<dyn PageScraper>,
    urls: &[String],
    deadline: Duration,
) -> Gathered<(String, Result<PageScrape>)> {
    let tasks = urls
        .iter()
        .cloned()
        .map(|url| {
            let scraper = Arc::clone(&scraper);
            async move {
                let result = scraper.scrape(&url).await;
                (url, result)
            }
        })
        .collect();
    gather_within(tasks, deadline).await
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;

    use async_trait::async_trait;

    use super::*;
    use crate::record::tests::ScriptedScraper;

    type Task = Pin<Box<dyn Future<Output = u32> + Send>>;

    fn after(ms: u64, value: u32) -> Task {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            value
        })
    }

    #[tokio::test]
    async fn late_tasks_are_dropped_not_awaited() {
        let tasks = vec![after(10, 1), after(5_000, 2), after(20, 3), after(5_000, 4)];

        let started = std::time::Instant::now();
        let gathered = gather_within(tasks, Duration::from_millis(300)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let mut finished = gathered.finished.clone();
        finished.sort();
        assert_eq!(finished, vec![1, 3]);
        assert_eq!(gathered.dropped, 2);
        assert!(!gathered.is_complete());
    }

    #[tokio::test]
    async fn all_in_time_is_complete() {
        let gathered = gather_within(vec![after(5, 7), after(1, 8)], Duration::from_secs(5)).await;
        assert_eq!(gathered.finished.len(), 2);
        assert!(gathered.is_complete());
    }

    #[tokio::test]
    async fn panicking_task_is_counted() {
        let boom: Task = Box::pin(async {
            let nothing: Option<u32> = None;
            nothing.expect("boom")
        });
        let tasks = vec![after(1, 1), boom];
        let gathered = gather_within(tasks, Duration::from_secs(5)).await;
        assert_eq!(gathered.finished, vec![1]);
        assert_eq!(gathered.crashed, 1);
    }

    struct StallingScraper;

    #[async_trait]
    impl PageScraper for StallingScraper {
        async fn scrape(&self, url: &str) -> Result<PageScrape> {
            if url.contains("stall") {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(PageScrape::found(format!("{url}.pdf"), None))
        }
    }

    #[tokio::test]
    async fn parallel_scrape_keeps_url_with_result() {
        let scraper = Arc::new(
            ScriptedScraper::default().open("https://a.org/1", "https://a.org/1.pdf", None),
        );
        let urls = vec!["https://a.org/1".to_string(), "https://b.org/2".to_string()];

        let gathered =
            scrape_targets_in_parallel(scraper.clone(), &urls, Duration::from_secs(5)).await;

        assert!(gathered.is_complete());
        let open: Vec<_> = gathered
            .finished
            .iter()
            .filter(|(_, r)| r.as_ref().is_ok_and(|p| p.has_fulltext_url))
            .map(|(url, _)| url.as_str())
            .collect();
        assert_eq!(open, vec!["https://a.org/1"]);
        assert_eq!(scraper.calls().len(), 2);
    }

    #[tokio::test]
    async fn stalled_scrape_is_dropped() {
        let urls = vec!["https://a.org/stall".to_string(), "https://b.org/2".to_string()];
        let gathered =
            scrape_targets_in_parallel(Arc::new(StallingScraper), &urls, Duration::from_millis(200))
                .await;

        assert_eq!(gathered.dropped, 1);
        assert_eq!(gathered.finished.len(), 1);
        assert_eq!(gathered.finished[0].0, "https://b.org/2");
    }
}
