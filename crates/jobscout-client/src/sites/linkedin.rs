use std::sync::Arc;

use chrono::NaiveDate;
use jobscout_core::error::AppError;
use jobscout_core::models::{
    FetchRequest, JobRecord, JobType, ListingPage, ListingStub, PageToken, PostedDate, Query, Remote,
    SALARY_UNSPECIFIED, Source, Workplace,
};
use jobscout_core::traits::SiteAdapter;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{all_texts, element_text, find_salary, first_text, parse_base_url, selector, today};
use crate::dates::normalize_posted_date;

pub const LINKEDIN_BASE_URL: &str = "https://www.linkedin.com";

/// LinkedIn answers scrapers it dislikes with this non-standard status.
const STATUS_REQUEST_DENIED: u16 = 999;

const BLOCK_MARKERS: &[&str] = &["authwall", "checkpoint/challenge", "captcha-internal"];

struct LinkedInSelectors {
    cards: Selector,
    cards_fallback: Selector,
    card_link: Selector,
    card_title: Selector,
    next_link: Selector,
    title: Selector,
    company: Selector,
    location: Selector,
    description: Selector,
    criteria: Selector,
    salary: Selector,
    date: Selector,
}

impl LinkedInSelectors {
    fn compile() -> Result<Self, AppError> {
        Ok(Self {
            cards: selector("div.base-card")?,
            cards_fallback: selector("li.jobs-search-results__list-item")?,
            card_link: selector("a.base-card__full-link, a[href*='/jobs/view/']")?,
            card_title: selector("h3.base-search-card__title")?,
            next_link: selector(
                r#"a[aria-label="Next"], a.jobs-search-pagination__button--next, link[rel="next"]"#,
            )?,
            title: selector(
                "h1.top-card-layout__title, h2.top-card-layout__title, h3.base-search-card__title",
            )?,
            company: selector(
                "a.topcard__org-name-link, span.topcard__flavor a, h4.base-search-card__subtitle a, h4.base-search-card__subtitle",
            )?,
            location: selector("span.topcard__flavor--bullet, span.job-search-card__location")?,
            description: selector(
                "div.show-more-less-html__markup, div.description__text, p.job-search-card__snippet",
            )?,
            criteria: selector(
                "li.description__job-criteria-item, span.topcard__flavor--metadata, div.job-search-card__benefits",
            )?,
            salary: selector(
                "div.salary, div.compensation__salary, span.job-search-card__salary-info, p.job-search-card__snippet",
            )?,
            date: selector("span.posted-time-ago__text, time")?,
        })
    }
}

/// Adapter for LinkedIn's public job search and job view pages.
///
/// Page tokens hold the absolute URL of the next result page.
#[derive(Clone)]
pub struct LinkedInAdapter {
    selectors: Arc<LinkedInSelectors>,
    base_url: Url,
    reference_date: Option<NaiveDate>,
}

impl LinkedInAdapter {
    pub fn new() -> Result<Self, AppError> {
        Self::with_base_url(LINKEDIN_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            selectors: Arc::new(LinkedInSelectors::compile()?),
            base_url: parse_base_url(base_url)?,
            reference_date: None,
        })
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    fn job_type_param(job_type: JobType) -> &'static str {
        match job_type {
            JobType::FullTime => "F",
            JobType::PartTime => "P",
            JobType::Contract => "C",
            JobType::Internship => "I",
            JobType::Temporary => "T",
        }
    }

    /// `f_WT` codes (2 remote, 1 on-site, 3 hybrid) in that order.
    fn workplace_param(workplaces: &[Workplace]) -> Option<String> {
        let codes: Vec<&str> = [
            (Workplace::Remote, "2"),
            (Workplace::OnSite, "1"),
            (Workplace::Hybrid, "3"),
        ]
        .into_iter()
        .filter(|(workplace, _)| workplaces.contains(workplace))
        .map(|(_, code)| code)
        .collect();
        (!codes.is_empty()).then(|| codes.join(","))
    }

    fn stub_from_card(&self, card: ElementRef<'_>) -> Option<ListingStub> {
        let s = &self.selectors;
        let href = card
            .select(&s.card_link)
            .find_map(|a| a.value().attr("href"))
            .or_else(|| card.value().attr("href"))?;
        let detail_url = self.base_url.join(href.trim()).ok()?;

        // data-entity-urn="urn:li:jobPosting:3912345678"
        let job_id = card
            .value()
            .attr("data-entity-urn")
            .and_then(|urn| urn.rsplit(':').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Some(ListingStub {
            detail_url: detail_url.to_string(),
            source_site_id: job_id,
            raw_title: first_text(card, &s.card_title).unwrap_or_default(),
        })
    }

    fn next_token(&self, document: &Html) -> Option<PageToken> {
        let href = document
            .select(&self.selectors.next_link)
            .find_map(|a| a.value().attr("href"))?;
        let url = self.base_url.join(href).ok()?;
        Some(PageToken::new(url.to_string()))
    }

    /// Posted date, preferring the machine-readable `datetime` attribute.
    fn posted_date(&self, root: ElementRef<'_>) -> Option<PostedDate> {
        let reference = self.reference_date.unwrap_or_else(today);
        root.select(&self.selectors.date).find_map(|el| {
            el.value()
                .attr("datetime")
                .and_then(|dt| normalize_posted_date(dt, reference))
                .or_else(|| normalize_posted_date(&element_text(el), reference))
        })
    }
}

impl SiteAdapter for LinkedInAdapter {
    fn source(&self) -> Source {
        Source::LinkedIn
    }

    fn build_search_request(
        &self,
        query: &Query,
        page_token: Option<&PageToken>,
    ) -> Result<FetchRequest, AppError> {
        if let Some(token) = page_token {
            let url = Url::parse(token.as_str()).map_err(|e| {
                AppError::InvalidQuery(format!("Invalid LinkedIn page token '{}': {e}", token.as_str()))
            })?;
            return Ok(FetchRequest::get(Source::LinkedIn, url.to_string()));
        }

        let mut url = self
            .base_url
            .join("/jobs/search/")
            .map_err(|e| AppError::ConfigError(format!("Invalid LinkedIn search URL: {e}")))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("keywords", query.keywords.trim());
            params.append_pair("location", query.location.trim());
            if !query.job_types.is_empty() {
                let codes: Vec<&str> = query
                    .job_types
                    .iter()
                    .map(|jt| Self::job_type_param(*jt))
                    .collect();
                params.append_pair("f_JT", &codes.join(","));
            }
            if let Some(codes) = Self::workplace_param(&query.workplaces) {
                params.append_pair("f_WT", &codes);
            }
            if let Some(days) = query.posted_within_days {
                let seconds = u64::from(days) * 86_400;
                params.append_pair("f_TPR", &format!("r{seconds}"));
            }
        }

        Ok(FetchRequest::get(Source::LinkedIn, url.to_string()))
    }

    fn parse_listing_page(&self, body: &str) -> ListingPage {
        let document = Html::parse_document(body);
        let s = &self.selectors;

        let mut cards: Vec<ElementRef<'_>> = document.select(&s.cards).collect();
        if cards.is_empty() {
            cards = document.select(&s.cards_fallback).collect();
        }

        let stubs: Vec<ListingStub> = cards
            .into_iter()
            .filter_map(|card| {
                let stub = self.stub_from_card(card);
                if stub.is_none() {
                    tracing::debug!("LinkedIn card without a job link, skipping");
                }
                stub
            })
            .collect();

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
            .ok_or_else(|| AppError::ParseFailure(format!("no title on {}", stub.detail_url)))?;
        let company = first_text(root, &s.company)
            .ok_or_else(|| AppError::ParseFailure(format!("no company on {}", stub.detail_url)))?;
        let location = first_text(root, &s.location).unwrap_or_default();
        let criteria = all_texts(root, &s.criteria).join(" ");

        let remote = match Remote::from_text(&criteria) {
            Remote::Unknown => Remote::from_text(&location),
            known => known,
        };

        Ok(JobRecord {
            title,
            company,
            location,
            job_type: JobType::from_text(&criteria),
            remote,
            posted_date: self.posted_date(root),
            url: stub.detail_url.clone(),
            description: first_text(root, &s.description).unwrap_or_default(),
            salary: find_salary(&all_texts(root, &s.salary))
                .unwrap_or_else(|| SALARY_UNSPECIFIED.to_string()),
            source: Source::LinkedIn,
        })
    }

    fn has_next_page(&self, next_page: Option<&PageToken>) -> bool {
        next_page.is_some_and(|token| !token.as_str().is_empty())
    }

    fn is_blocked(&self, status: u16, body: &str) -> bool {
        if status == STATUS_REQUEST_DENIED || status == 403 {
            return true;
        }
        BLOCK_MARKERS.iter().any(|marker| body.contains(marker))
    }
}
