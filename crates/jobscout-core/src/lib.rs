pub mod config;
pub mod crawl;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod proxy_pool;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod traits;
pub mod util;

pub use config::{CrawlTarget, ScrapeConfig};
pub use crawl::{
    CrawlConfig, CrawlEngine, CrawlReport, CrawlReporter, CrawlRun, DropCounts, TerminalReason,
    TracingCrawlReporter,
};
pub use dedup::{DedupKey, Deduplicator, dedupe};
pub use error::AppError;
pub use fetcher::{FetchResult, Fetcher, RetryPolicy};
pub use models::{
    FetchRequest, JobRecord, JobType, ListingPage, ListingStub, PageToken, PostedDate, Query,
    RawResponse, Remote, SALARY_UNSPECIFIED, Source, Workplace, compute_hash,
};
pub use pipeline::{Pipeline, PipelineRun, RunSummary};
pub use proxy_pool::{ProxyEndpoint, ProxyPool, ProxyPoolConfig};
pub use traits::{AdapterFactory, SiteAdapter, Transport};
