use std::time::Duration;

use chrono::NaiveDate;
use jobscout_client::{IndeedAdapter, LinkedInAdapter, Site, SiteFactory};
use jobscout_core::testutil::MockTransport;
use jobscout_core::{
    AdapterFactory, CrawlConfig, CrawlEngine, Fetcher, PageToken, Pipeline, ProxyPool,
    ProxyPoolConfig, Query, RetryPolicy, SiteAdapter, Source,
};

pub const INDEED: &str = "https://indeed.test";
pub const LINKEDIN: &str = "https://linkedin.test";

pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
}

pub fn factory() -> SiteFactory {
    SiteFactory::with_adapters(
        IndeedAdapter::with_base_url(INDEED)
            .unwrap()
            .with_reference_date(reference_date()),
        LinkedInAdapter::with_base_url(LINKEDIN)
            .unwrap()
            .with_reference_date(reference_date()),
    )
}

pub fn adapter(source: Source) -> Site {
    factory().adapter(source)
}

/// URL the adapter requests for `query` at `token`.
pub fn search_url(source: Source, query: &Query, token: Option<&str>) -> String {
    let token = token.map(PageToken::new);
    adapter(source)
        .build_search_request(query, token.as_ref())
        .unwrap()
        .url
}

/// Pipeline over `transport` with no pacing, no backoff and lenient quarantine.
pub fn pipeline(transport: MockTransport) -> Pipeline<MockTransport, SiteFactory> {
    let pool = ProxyPool::direct(
        ProxyPoolConfig::new(Duration::ZERO)
            .with_jitter(Duration::ZERO)
            .with_quarantine(1_000, Duration::from_secs(60)),
    );
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: Duration::ZERO,
    };
    let engine = CrawlEngine::new(
        Fetcher::new(transport, pool, policy),
        CrawlConfig {
            concurrency: 4,
            empty_page_threshold: 1,
        },
    );
    Pipeline::new(engine, factory())
}

// ---------------------------------------------------------------------------
// Indeed fixtures
// ---------------------------------------------------------------------------

pub fn indeed_card(job_key: &str, title: &str, company: &str) -> String {
    format!(
        r#"<div class="job_seen_beacon">
             <h2 class="jobTitle"><a class="jcs-JobTitle" data-jk="{job_key}" href="/rc/clk?jk={job_key}&amp;from=serp"><span>{title}</span></a></h2>
             <span class="companyName">{company}</span>
             <div class="companyLocation">Atlanta, GA</div>
           </div>"#
    )
}

pub fn indeed_listing(cards: &[String], next_start: Option<u32>) -> String {
    let next = next_start
        .map(|start| {
            format!(
                r#"<nav><a data-testid="pagination-page-next" href="/jobs?q=architect&amp;start={start}">Next</a></nav>"#
            )
        })
        .unwrap_or_default();
    format!("<html><body><div id=\"mosaic\">{}</div>{next}</body></html>", cards.join("\n"))
}

pub fn indeed_detail(title: &str, company: Option<&str>, badges: &str) -> String {
    let company = company
        .map(|c| format!(r#"<div data-testid="inlineHeader-companyName"><a>{c}</a></div>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body>
             <h1 class="jobsearch-JobInfoHeader-title">{title} - job post</h1>
             {company}
             <div data-testid="inlineHeader-companyLocation">Atlanta, GA</div>
             <div id="salaryInfoAndJobType">{badges}</div>
             <div id="jobDescriptionText"><p>Join our team.</p></div>
             <span class="date">Posted 2 days ago</span>
           </body></html>"#
    )
}

pub fn indeed_detail_url(job_key: &str) -> String {
    format!("{INDEED}/viewjob?jk={job_key}")
}

// ---------------------------------------------------------------------------
// LinkedIn fixtures
// ---------------------------------------------------------------------------

pub fn linkedin_card(slug: &str, id: &str, title: &str) -> String {
    format!(
        r#"<li><div class="base-card job-search-card" data-entity-urn="urn:li:jobPosting:{id}">
             <a class="base-card__full-link" href="{LINKEDIN}/jobs/view/{slug}-{id}?trk=public_jobs"></a>
             <h3 class="base-search-card__title">{title}</h3>
           </div></li>"#
    )
}

pub fn linkedin_listing(cards: &[String]) -> String {
    format!(
        r#"<html><body><ul class="jobs-search__results-list">{}</ul></body></html>"#,
        cards.join("\n")
    )
}

pub fn linkedin_detail(title: &str, company: &str, employment_type: &str) -> String {
    format!(
        r#"<html><body>
             <h1 class="top-card-layout__title">{title}</h1>
             <span class="topcard__flavor"><a class="topcard__org-name-link">{company}</a></span>
             <span class="topcard__flavor topcard__flavor--bullet">Atlanta, GA</span>
             <span class="posted-time-ago__text">1 week ago</span>
             <div class="show-more-less-html__markup">Join our team.</div>
             <ul><li class="description__job-criteria-item"><h3>Employment type</h3><span>{employment_type}</span></li></ul>
           </body></html>"#
    )
}

pub fn linkedin_detail_url(slug: &str, id: &str) -> String {
    format!("{LINKEDIN}/jobs/view/{slug}-{id}?trk=public_jobs")
}
