//! Fan-out of crawl runs across sources and query variants.
//!
//! One [`CrawlEngine`] run is started per [`CrawlTarget`]. All runs share the
//! engine's fetcher (and therefore one proxy pool and per-site pacing) and a
//! single [`Deduplicator`], so a posting seen by any run is emitted once.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::{CrawlTarget, ScrapeConfig};
use crate::crawl::{CrawlEngine, CrawlReport, CrawlRun, DropCounts};
use crate::dedup::Deduplicator;
use crate::error::AppError;
use crate::fetcher::Fetcher;
use crate::models::JobRecord;
use crate::proxy_pool::ProxyPool;
use crate::traits::{AdapterFactory, Transport};

/// Run-level outcome of a pipeline invocation.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One report per crawl run, in completion order.
    pub runs: Vec<CrawlReport>,
    /// Records emitted after deduplication.
    pub emitted: usize,
    pub drops: DropCounts,
    /// First fatal error reported by any run.
    pub fatal: Option<AppError>,
}

impl RunSummary {
    pub fn dropped(&self) -> usize {
        self.drops.total()
    }

    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let runs: Vec<_> = self
            .runs
            .iter()
            .map(|run| {
                json!({
                    "run_id": run.run_id.to_string(),
                    "source": run.source,
                    "keywords": run.query.keywords,
                    "location": run.query.location,
                    "pages_visited": run.pages_visited,
                    "records_emitted": run.records_emitted,
                    "dropped": run.drops.total(),
                    "terminal_reason": run.terminal_reason,
                })
            })
            .collect();

        json!({
            "emitted": self.emitted,
            "dropped": self.dropped(),
            "drops": {
                "parse_failures": self.drops.parse_failures,
                "invalid_records": self.drops.invalid_records,
                "detail_blocked": self.drops.detail_blocked,
                "detail_fetch_failures": self.drops.detail_fetch_failures,
                "duplicate_stubs": self.drops.duplicate_stubs,
                "duplicate_records": self.drops.duplicate_records,
            },
            "fatal": self.fatal.as_ref().map(ToString::to_string),
            "runs": runs,
        })
    }
}

/// Runs every target of a configuration against shared crawl infrastructure.
#[derive(Clone)]
pub struct Pipeline<T: Transport, F: AdapterFactory> {
    engine: CrawlEngine<T>,
    factory: F,
}

impl<T: Transport, F: AdapterFactory> Pipeline<T, F> {
    pub fn new(engine: CrawlEngine<T>, factory: F) -> Self {
        Self { engine, factory }
    }

    /// Build the proxy pool, fetcher and engine described by `config`.
    pub fn from_config(transport: T, factory: F, config: &ScrapeConfig) -> Self {
        let pool = ProxyPool::new(config.proxy_endpoints(), config.pool_config());
        let fetcher = Fetcher::new(transport, pool, config.retry_policy());
        Self::new(CrawlEngine::new(fetcher, config.crawl_config()), factory)
    }

    pub fn engine(&self) -> &CrawlEngine<T> {
        &self.engine
    }

    /// Expand `config` into targets and run them all.
    pub fn run(
        &self,
        config: &ScrapeConfig,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, AppError> {
        self.run_targets(config.targets()?, cancel)
    }

    /// Start one crawl run per target.
    ///
    /// Every query is validated before anything is fetched. A fatal error in
    /// any run cancels the others; cancelling `cancel` stops all of them.
    pub fn run_targets(
        &self,
        targets: Vec<CrawlTarget>,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, AppError> {
        for target in &targets {
            target.query.validate()?;
        }

        let capacity = self.engine.config().concurrency.max(1) * 2;
        let (tx, rx) = mpsc::channel(capacity);
        let dedup = Deduplicator::new();
        let cancel = cancel.child_token();

        tracing::info!(runs = targets.len(), "Starting scrape pipeline");

        let mut runs = JoinSet::new();
        for target in targets {
            let adapter = self.factory.adapter(target.source);
            let crawl = self.engine.run(adapter, target.query, cancel.clone());
            runs.spawn(forward(crawl, dedup.clone(), tx.clone(), cancel.clone()));
        }
        drop(tx);

        let summary = tokio::spawn(supervise(runs, cancel));
        Ok(PipelineRun {
            records: rx,
            summary,
        })
    }
}

/// Pass one run's records through the shared deduplicator.
///
/// Returns the run's report together with how many records it forwarded.
async fn forward(
    mut crawl: CrawlRun,
    dedup: Deduplicator,
    tx: mpsc::Sender<JobRecord>,
    cancel: CancellationToken,
) -> (CrawlReport, usize) {
    let mut forwarded = 0;
    let mut duplicates = 0;

    while let Some(record) = crawl.next().await {
        if !dedup.admit(&record) {
            duplicates += 1;
            continue;
        }
        if tx.send(record).await.is_err() {
            tracing::debug!(run_id = %crawl.run_id(), "Record consumer dropped, stopping");
            cancel.cancel();
            break;
        }
        forwarded += 1;
    }

    let mut report = crawl.finish().await;
    report.drops.duplicate_records += duplicates;
    (report, forwarded)
}

async fn supervise(
    mut runs: JoinSet<(CrawlReport, usize)>,
    cancel: CancellationToken,
) -> RunSummary {
    let mut summary = RunSummary::default();

    while let Some(joined) = runs.join_next().await {
        match joined {
            Ok((mut report, forwarded)) => {
                if let Some(err) = report.fatal.take() {
                    tracing::error!(
                        run_id = %report.run_id,
                        source = %report.source,
                        error = %err,
                        "Fatal crawl error, cancelling remaining runs"
                    );
                    cancel.cancel();
                    if summary.fatal.is_none() {
                        summary.fatal = Some(err);
                    }
                }
                summary.emitted += forwarded;
                summary.drops.merge(&report.drops);
                summary.runs.push(report);
            }
            Err(e) => {
                tracing::error!(error = %e, "Crawl forwarder task failed");
            }
        }
    }

    tracing::info!(
        runs = summary.runs.len(),
        emitted = summary.emitted,
        dropped = summary.dropped(),
        fatal = summary.fatal.is_some(),
        "Scrape pipeline finished"
    );
    summary
}

/// A running pipeline: a stream of deduplicated records plus the final
/// [`RunSummary`].
pub struct PipelineRun {
    records: mpsc::Receiver<JobRecord>,
    summary: JoinHandle<RunSummary>,
}

impl PipelineRun {
    /// Wait for every run to stop and return the summary.
    ///
    /// Records not yet received are discarded and outstanding runs stop.
    pub async fn finish(mut self) -> RunSummary {
        self.records.close();
        match self.summary.await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Pipeline supervisor aborted");
                RunSummary::default()
            }
        }
    }

    pub async fn collect_all(mut self) -> (Vec<JobRecord>, RunSummary) {
        let mut records = Vec::new();
        while let Some(record) = self.records.recv().await {
            records.push(record);
        }
        let summary = self.finish().await;
        (records, summary)
    }
}

impl Stream for PipelineRun {
    type Item = JobRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobRecord>> {
        self.records.poll_recv(cx)
    }
}
