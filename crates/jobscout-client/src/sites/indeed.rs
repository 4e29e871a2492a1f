use std::sync::Arc;

use chrono::NaiveDate;
use jobscout_core::error::AppError;
use jobscout_core::models::{
    FetchRequest, JobRecord, JobType, ListingPage, ListingStub, PageToken, Query, Remote,
    SALARY_UNSPECIFIED, Source, Workplace,
};
use jobscout_core::traits::SiteAdapter;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{all_texts, element_text, find_salary, first_text, parse_base_url, selector, today};
use crate::dates::normalize_posted_date;

pub const INDEED_BASE_URL: &str = "https://www.indeed.com";

/// Search filter restricting results to remote postings.
const REMOTE_FILTER: &str = "0kf:jt(telecommute);";

/// Markers of Indeed's Cloudflare and hCaptcha interstitials.
const BLOCK_MARKERS: &[&str] = &[
    "hcaptcha",
    "h-captcha",
    "cf-challenge",
    "just a moment...",
    "additional verification required",
];

struct IndeedSelectors {
    cards: Selector,
    cards_fallback: Selector,
    card_link: Selector,
    next_link: Selector,
    title: Selector,
    company: Selector,
    location: Selector,
    description: Selector,
    attributes: Selector,
    date: Selector,
}

impl IndeedSelectors {
    fn compile() -> Result<Self, AppError> {
        Ok(Self {
            cards: selector("div.job_seen_beacon")?,
            cards_fallback: selector("td.resultContent")?,
            card_link: selector("h2.jobTitle a, a.jcs-JobTitle, a.tapItem")?,
            next_link: selector(
                r#"a[data-testid="pagination-page-next"], a[aria-label="Next Page"], a[aria-label="Next"]"#,
            )?,
            title: selector(
                r#"h1.jobsearch-JobInfoHeader-title, h1[data-testid="jobsearch-JobInfoHeader-title"], h2.jobTitle"#,
            )?,
            company: selector(
                r#"[data-testid="inlineHeader-companyName"], [data-company-name="true"], span.companyName"#,
            )?,
            location: selector(
                r#"[data-testid="inlineHeader-companyLocation"], [data-testid="job-location"], div.companyLocation"#,
            )?,
            description: selector("#jobDescriptionText, div.job-snippet")?,
            attributes: selector(
                "#salaryInfoAndJobType span, div.salary-snippet, span.salary-snippet-container, div.attribute_snippet, div.metadata",
            )?,
            date: selector(r#"span.date, span.dateStamp, [data-testid="myJobsStateDate"]"#)?,
        })
    }
}

/// Adapter for Indeed search results and `viewjob` pages.
///
/// Page tokens hold the `start` offset of the next result page.
#[derive(Clone)]
pub struct IndeedAdapter {
    selectors: Arc<IndeedSelectors>,
    base_url: Url,
    reference_date: Option<NaiveDate>,
}

impl IndeedAdapter {
    pub fn new() -> Result<Self, AppError> {
        Self::with_base_url(INDEED_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            selectors: Arc::new(IndeedSelectors::compile()?),
            base_url: parse_base_url(base_url)?,
            reference_date: None,
        })
    }

    /// Resolve relative posted dates against `date` instead of today.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn job_type_param(job_type: JobType) -> &'static str {
        match job_type {
            JobType::FullTime => "fulltime",
            JobType::PartTime => "parttime",
            JobType::Contract => "contract",
            JobType::Internship => "internship",
            JobType::Temporary => "temporary",
        }
    }

    /// Detail URL for a card: `viewjob?jk=` when the job key is known,
    /// otherwise the card link resolved against the base URL.
    fn detail_url(&self, link: ElementRef<'_>, card: ElementRef<'_>) -> Option<(String, Option<String>)> {
        let href = link.value().attr("href");
        let resolved = href.and_then(|h| self.base_url.join(h).ok());

        let job_key = link
            .value()
            .attr("data-jk")
            .or_else(|| card.value().attr("data-jk"))
            .map(str::to_string)
            .or_else(|| {
                resolved.as_ref().and_then(|url| {
                    url.query_pairs()
                        .find(|(name, _)| name == "jk")
                        .map(|(_, value)| value.into_owned())
                })
            });

        match (&job_key, resolved) {
            (Some(jk), _) => {
                let mut url = self.base_url.join("/viewjob").ok()?;
                url.query_pairs_mut().append_pair("jk", jk);
                Some((url.to_string(), job_key))
            }
            (None, Some(url)) => Some((url.to_string(), None)),
            (None, None) => None,
        }
    }

    fn next_token(&self, document: &Html) -> Option<PageToken> {
        let href = document
            .select(&self.selectors.next_link)
            .find_map(|a| a.value().attr("href"))?;
        let url = self.base_url.join(href).ok()?;
        let start = url
            .query_pairs()
            .find(|(name, _)| name == "start")
            .and_then(|(_, value)| value.parse::<u32>().ok())?;
        Some(PageToken::new(start.to_string()))
    }
}

impl SiteAdapter for IndeedAdapter {
    fn source(&self) -> Source {
        Source::Indeed
    }

    fn build_search_request(
        &self,
        query: &Query,
        page_token: Option<&PageToken>,
    ) -> Result<FetchRequest, AppError> {
        let start = page_token
            .map(|token| {
                token.as_str().parse::<u32>().map_err(|_| {
                    AppError::InvalidQuery(format!("Invalid Indeed page token '{}'", token.as_str()))
                })
            })
            .transpose()?;

        let mut url = self
            .base_url
            .join("/jobs")
            .map_err(|e| AppError::ConfigError(format!("Invalid Indeed search URL: {e}")))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("q", query.keywords.trim());
            params.append_pair("l", query.location.trim());
            // Indeed takes a single job type.
            if let Some(job_type) = query.job_types.first() {
                params.append_pair("jt", Self::job_type_param(*job_type));
            }
            if query.workplaces.contains(&Workplace::Remote) {
                params.append_pair("sc", REMOTE_FILTER);
            }
            if let Some(days) = query.posted_within_days {
                params.append_pair("fromage", &days.to_string());
            }
            if let Some(start) = start {
                params.append_pair("start", &start.to_string());
            }
        }

        Ok(FetchRequest::get(Source::Indeed, url.to_string()))
    }

    fn parse_listing_page(&self, body: &str) -> ListingPage {
        let document = Html::parse_document(body);
        let s = &self.selectors;

        let mut cards: Vec<ElementRef<'_>> = document.select(&s.cards).collect();
        if cards.is_empty() {
            cards = document.select(&s.cards_fallback).collect();
        }

        let mut stubs = Vec::new();
        for card in cards {
            let Some(link) = card.select(&s.card_link).next() else {
                tracing::debug!("Indeed card without a title link, skipping");
                continue;
            };
            let Some((detail_url, job_key)) = self.detail_url(link, card) else {
                tracing::debug!("Indeed card without a usable link, skipping");
                continue;
            };
            stubs.push(ListingStub {
                detail_url,
                source_site_id: job_key,
                raw_title: element_text(link),
            });
        }

        let next_page = if stubs.is_empty() {
            None
        } else {
            self.next_token(&document)
        };
        ListingPage { stubs, next_page }
    }

    fn parse_detail_page(&self, body: &str, stub: &ListingStub) -> Result<JobRecord, AppError> {
        let document = Html::parse_document(body);
        let root = document.root_element();
        let s = &self.selectors;

        let title = first_text(root, &s.title)
            .map(|t| t.trim_end_matches("- job post").trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::ParseFailure(format!("no title on {}", stub.detail_url)))?;
        let company = first_text(root, &s.company)
            .ok_or_else(|| AppError::ParseFailure(format!("no company on {}", stub.detail_url)))?;
        let location = first_text(root, &s.location).unwrap_or_default();
        let attributes = all_texts(root, &s.attributes);
        let badges = attributes.join(" ");

        let remote = match Remote::from_text(&location) {
            Remote::Unknown => Remote::from_text(&badges),
            known => known,
        };
        let posted_date = first_text(root, &s.date).and_then(|text| {
            normalize_posted_date(&text, self.reference_date.unwrap_or_else(today))
        });

        Ok(JobRecord {
            title,
            company,
            location,
            job_type: JobType::from_text(&badges),
            remote,
            posted_date,
            url: stub.detail_url.clone(),
            description: first_text(root, &s.description).unwrap_or_default(),
            salary: find_salary(&attributes).unwrap_or_else(|| SALARY_UNSPECIFIED.to_string()),
            source: Source::Indeed,
        })
    }

    fn has_next_page(&self, next_page: Option<&PageToken>) -> bool {
        next_page.is_some()
    }

    fn is_blocked(&self, status: u16, body: &str) -> bool {
        if status == 403 {
            return true;
        }
        let lower = body.to_lowercase();
        BLOCK_MARKERS.iter().any(|marker| lower.contains(marker))
    }
}
