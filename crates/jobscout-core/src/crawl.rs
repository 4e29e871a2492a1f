//! Per-(source, query) crawl runs: pagination plus detail-page follow-through.
//!
//! A run walks listing pages strictly in order, fans out the detail pages of
//! each listing page over a bounded number of concurrent fetches and streams
//! every valid record as soon as it is parsed.
//!
//! A run ends at the first of:
//! - `max_results` records emitted
//! - the adapter reports no next page
//! - more than `empty_page_threshold` consecutive pages without new stubs
//! - a listing page that cannot be fetched, or is blocked
//! - cancellation, or a fatal error (proxy pool exhausted)

use std::collections::HashSet;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::fetcher::{FetchResult, Fetcher};
use crate::models::{JobRecord, ListingStub, PageToken, Query, Source};
use crate::traits::{SiteAdapter, Transport};

/// Tuning for crawl runs.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum concurrent detail-page fetches per run.
    pub concurrency: usize,

    /// Consecutive pages without usable stubs tolerated before the run is
    /// considered to have reached the end of real inventory.
    pub empty_page_threshold: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            empty_page_threshold: 2,
        }
    }
}

/// Why a crawl run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    MaxResults,
    NoMorePages,
    EmptyPages,
    FetchFailure,
    Blocked,
    Cancelled,
    PoolExhausted,
    InvalidQuery,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::MaxResults => "max_results",
            TerminalReason::NoMorePages => "no_more_pages",
            TerminalReason::EmptyPages => "empty_pages",
            TerminalReason::FetchFailure => "fetch_failure",
            TerminalReason::Blocked => "blocked",
            TerminalReason::Cancelled => "cancelled",
            TerminalReason::PoolExhausted => "pool_exhausted",
            TerminalReason::InvalidQuery => "invalid_query",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records and stubs that did not make it into the output, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    /// Detail pages without a locatable title or company.
    pub parse_failures: usize,
    /// Parsed records that failed validation.
    pub invalid_records: usize,
    pub detail_blocked: usize,
    /// Detail pages whose fetch failed after retries.
    pub detail_fetch_failures: usize,
    /// Stubs already seen earlier in the same run.
    pub duplicate_stubs: usize,
    /// Records already emitted by another run (filled in by the pipeline).
    pub duplicate_records: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.parse_failures
            + self.invalid_records
            + self.detail_blocked
            + self.detail_fetch_failures
            + self.duplicate_stubs
            + self.duplicate_records
    }

    pub fn merge(&mut self, other: &DropCounts) {
        self.parse_failures += other.parse_failures;
        self.invalid_records += other.invalid_records;
        self.detail_blocked += other.detail_blocked;
        self.detail_fetch_failures += other.detail_fetch_failures;
        self.duplicate_stubs += other.duplicate_stubs;
        self.duplicate_records += other.duplicate_records;
    }
}

/// Final bookkeeping of one crawl run.
#[derive(Debug)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub source: Source,
    pub query: Query,
    pub pages_visited: u32,
    pub records_emitted: usize,
    pub drops: DropCounts,
    pub terminal_reason: TerminalReason,
    /// Set when the run ended on an error that must stop the whole pipeline.
    pub fatal: Option<AppError>,
}

/// Mutable state of one run, owned by the task driving it.
struct CrawlState {
    query: Query,
    pages_visited: u32,
    cursor: Option<PageToken>,
    records_emitted: usize,
    consecutive_empty_pages: u32,
    seen_stubs: HashSet<String>,
    drops: DropCounts,
}

impl CrawlState {
    fn new(query: Query) -> Self {
        Self {
            query,
            pages_visited: 0,
            cursor: None,
            records_emitted: 0,
            consecutive_empty_pages: 0,
            seen_stubs: HashSet::new(),
            drops: DropCounts::default(),
        }
    }

    fn limit_reached(&self) -> bool {
        self.records_emitted >= self.query.max_results
    }
}

/// Events emitted by crawl runs for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    Started {
        run_id: Uuid,
        source: Source,
        query: &'a Query,
    },
    ListingPage {
        run_id: Uuid,
        page: u32,
        new_stubs: usize,
        has_next: bool,
    },
    ListingFailed {
        run_id: Uuid,
        url: &'a str,
        kind: &'static str,
    },
    RecordDropped {
        run_id: Uuid,
        url: &'a str,
        reason: &'a str,
    },
    Finished {
        report: &'a CrawlReport,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::Started {
                run_id,
                source,
                query,
            } => {
                tracing::info!(
                    %run_id,
                    %source,
                    keywords = %query.keywords,
                    location = %query.location,
                    max_results = query.max_results,
                    "Crawl started"
                );
            }
            CrawlEvent::ListingPage {
                run_id,
                page,
                new_stubs,
                has_next,
            } => {
                tracing::info!(%run_id, page, new_stubs, has_next, "Listing page parsed");
            }
            CrawlEvent::ListingFailed { run_id, url, kind } => {
                tracing::warn!(%run_id, %url, %kind, "Listing page failed");
            }
            CrawlEvent::RecordDropped {
                run_id,
                url,
                reason,
            } => {
                tracing::debug!(%run_id, %url, %reason, "Record dropped");
            }
            CrawlEvent::Finished { report } => {
                tracing::info!(
                    run_id = %report.run_id,
                    source = %report.source,
                    pages = report.pages_visited,
                    emitted = report.records_emitted,
                    dropped = report.drops.total(),
                    reason = %report.terminal_reason,
                    "Crawl finished"
                );
            }
        }
    }
}

/// Drives crawl runs against any [`SiteAdapter`].
#[derive(Clone)]
pub struct CrawlEngine<T: Transport> {
    fetcher: Fetcher<T>,
    config: CrawlConfig,
    reporter: Arc<dyn CrawlReporter>,
}

impl<T: Transport> CrawlEngine<T> {
    pub fn new(fetcher: Fetcher<T>, config: CrawlConfig) -> Self {
        Self {
            fetcher,
            config,
            reporter: Arc::new(TracingCrawlReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CrawlReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Start a run. Records are streamed through the returned [`CrawlRun`]
    /// as soon as they are parsed; the run stops issuing fetches once
    /// `cancel` fires or the stream is dropped.
    pub fn run<A: SiteAdapter>(
        &self,
        adapter: A,
        query: Query,
        cancel: CancellationToken,
    ) -> CrawlRun {
        let (tx, rx) = mpsc::channel(self.config.concurrency.max(1));
        let run_id = Uuid::new_v4();
        let source = adapter.source();
        let engine = self.clone();
        let fallback_query = query.clone();
        let task =
            tokio::spawn(async move { engine.drive(run_id, adapter, query, tx, cancel).await });

        CrawlRun {
            records: rx,
            task,
            run_id,
            source,
            query: fallback_query,
        }
    }

    async fn drive<A: SiteAdapter>(
        &self,
        run_id: Uuid,
        adapter: A,
        query: Query,
        tx: mpsc::Sender<JobRecord>,
        cancel: CancellationToken,
    ) -> CrawlReport {
        let mut state = CrawlState::new(query);
        let mut fatal = None;
        self.reporter.report(CrawlEvent::Started {
            run_id,
            source: adapter.source(),
            query: &state.query,
        });

        let terminal_reason = loop {
            if cancel.is_cancelled() || tx.is_closed() {
                break TerminalReason::Cancelled;
            }
            if state.limit_reached() {
                break TerminalReason::MaxResults;
            }

            let request = match adapter.build_search_request(&state.query, state.cursor.as_ref())
            {
                Ok(request) => request,
                Err(e) => {
                    fatal = Some(e);
                    break TerminalReason::InvalidQuery;
                }
            };

            let body = match self.fetcher.fetch(&adapter, &request).await {
                Ok(FetchResult::Ok { body, .. }) => body,
                Ok(failed) => {
                    self.reporter.report(CrawlEvent::ListingFailed {
                        run_id,
                        url: &request.url,
                        kind: failed.kind(),
                    });
                    break match failed {
                        FetchResult::Blocked => TerminalReason::Blocked,
                        _ => TerminalReason::FetchFailure,
                    };
                }
                Err(e) => {
                    fatal = Some(e);
                    break TerminalReason::PoolExhausted;
                }
            };

            state.pages_visited += 1;
            let page = adapter.parse_listing_page(&body);
            let has_next = adapter.has_next_page(page.next_page.as_ref());

            let mut stubs = Vec::with_capacity(page.stubs.len());
            for stub in page.stubs {
                if state.seen_stubs.insert(stub.detail_url.clone()) {
                    stubs.push(stub);
                } else {
                    state.drops.duplicate_stubs += 1;
                }
            }

            self.reporter.report(CrawlEvent::ListingPage {
                run_id,
                page: state.pages_visited,
                new_stubs: stubs.len(),
                has_next,
            });

            if stubs.is_empty() {
                state.consecutive_empty_pages += 1;
                if state.consecutive_empty_pages > self.config.empty_page_threshold {
                    break TerminalReason::EmptyPages;
                }
            } else {
                state.consecutive_empty_pages = 0;
                if let Err(e) = self
                    .crawl_details(run_id, &adapter, stubs, &mut state, &tx, &cancel)
                    .await
                {
                    fatal = Some(e);
                    break TerminalReason::PoolExhausted;
                }
                if state.limit_reached() {
                    break TerminalReason::MaxResults;
                }
            }

            if cancel.is_cancelled() || tx.is_closed() {
                break TerminalReason::Cancelled;
            }
            if !has_next {
                break TerminalReason::NoMorePages;
            }
            state.cursor = page.next_page;
        };

        let report = CrawlReport {
            run_id,
            source: adapter.source(),
            query: state.query,
            pages_visited: state.pages_visited,
            records_emitted: state.records_emitted,
            drops: state.drops,
            terminal_reason,
            fatal,
        };
        self.reporter.report(CrawlEvent::Finished { report: &report });
        report
    }

    /// Fetch and parse the detail pages behind `stubs`, emitting records as
    /// they complete. Only a fatal fetch error is returned.
    async fn crawl_details<A: SiteAdapter>(
        &self,
        run_id: Uuid,
        adapter: &A,
        stubs: Vec<ListingStub>,
        state: &mut CrawlState,
        tx: &mpsc::Sender<JobRecord>,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let fetcher = &self.fetcher;
        // Never more fetches in flight than records still wanted.
        let remaining = state.query.max_results.saturating_sub(state.records_emitted);
        let width = self.config.concurrency.min(remaining).max(1);
        // Stops pulling new stubs on cancellation; in-flight fetches still finish.
        let mut details = stream::iter(stubs)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|stub| async move {
                let request = adapter.build_detail_request(&stub);
                let result = fetcher.fetch(adapter, &request).await;
                (stub, result)
            })
            .buffer_unordered(width);

        while let Some((stub, result)) = details.next().await {
            let drop_reason = match result? {
                FetchResult::Ok { body, .. } => match adapter.parse_detail_page(&body, &stub) {
                    Ok(record) if record.is_valid() => {
                        if tx.send(record).await.is_err() {
                            return Ok(());
                        }
                        state.records_emitted += 1;
                        if state.limit_reached() {
                            return Ok(());
                        }
                        continue;
                    }
                    Ok(_) => {
                        state.drops.invalid_records += 1;
                        "invalid record".to_string()
                    }
                    Err(e) => {
                        state.drops.parse_failures += 1;
                        e.to_string()
                    }
                },
                FetchResult::Blocked => {
                    state.drops.detail_blocked += 1;
                    "blocked".to_string()
                }
                failed => {
                    state.drops.detail_fetch_failures += 1;
                    format!("fetch failed: {}", failed.kind())
                }
            };

            self.reporter.report(CrawlEvent::RecordDropped {
                run_id,
                url: &stub.detail_url,
                reason: &drop_reason,
            });
        }

        Ok(())
    }
}

/// A running crawl: a stream of records plus the final [`CrawlReport`].
pub struct CrawlRun {
    records: mpsc::Receiver<JobRecord>,
    task: JoinHandle<CrawlReport>,
    run_id: Uuid,
    source: Source,
    query: Query,
}

impl CrawlRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Wait for the run to stop and return its report.
    ///
    /// Call after the record stream is exhausted; records not yet received
    /// are discarded and the run is stopped.
    pub async fn finish(mut self) -> CrawlReport {
        self.records.close();
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(run_id = %self.run_id, error = %e, "Crawl task aborted");
                CrawlReport {
                    run_id: self.run_id,
                    source: self.source,
                    query: self.query,
                    pages_visited: 0,
                    records_emitted: 0,
                    drops: DropCounts::default(),
                    terminal_reason: TerminalReason::Cancelled,
                    fatal: None,
                }
            }
        }
    }

    /// Drain every record, then return them with the report.
    pub async fn collect_all(mut self) -> (Vec<JobRecord>, CrawlReport) {
        let mut records = Vec::new();
        while let Some(record) = self.records.recv().await {
            records.push(record);
        }
        let report = self.finish().await;
        (records, report)
    }
}

impl Stream for CrawlRun {
    type Item = JobRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobRecord>> {
        self.records.poll_recv(cx)
    }
}
