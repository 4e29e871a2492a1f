//! HTML site adapters.
//!
//! Each adapter owns the markup knowledge for one listing site: how to build
//! its search URLs, how its pagination works, where the fields sit on a
//! detail page and what its anti-bot pages look like. [`Site`] and
//! [`SiteFactory`] let the pipeline pick an adapter by [`Source`] without
//! branching on it.

mod indeed;
mod linkedin;

pub use indeed::{INDEED_BASE_URL, IndeedAdapter};
pub use linkedin::{LINKEDIN_BASE_URL, LinkedInAdapter};

use chrono::NaiveDate;
use jobscout_core::error::AppError;
use jobscout_core::models::{
    FetchRequest, JobRecord, ListingPage, ListingStub, PageToken, Query, Source,
};
use jobscout_core::traits::{AdapterFactory, SiteAdapter};
use jobscout_core::util::collapse_whitespace;
use scraper::{ElementRef, Selector};
use url::Url;

/// Either of the supported adapters.
#[derive(Clone)]
pub enum Site {
    Indeed(IndeedAdapter),
    LinkedIn(LinkedInAdapter),
}

impl SiteAdapter for Site {
    fn source(&self) -> Source {
        match self {
            Site::Indeed(a) => a.source(),
            Site::LinkedIn(a) => a.source(),
        }
    }

    fn build_search_request(
        &self,
        query: &Query,
        page_token: Option<&PageToken>,
    ) -> Result<FetchRequest, AppError> {
        match self {
            Site::Indeed(a) => a.build_search_request(query, page_token),
            Site::LinkedIn(a) => a.build_search_request(query, page_token),
        }
    }

    fn parse_listing_page(&self, body: &str) -> ListingPage {
        match self {
            Site::Indeed(a) => a.parse_listing_page(body),
            Site::LinkedIn(a) => a.parse_listing_page(body),
        }
    }

    fn parse_detail_page(&self, body: &str, stub: &ListingStub) -> Result<JobRecord, AppError> {
        match self {
            Site::Indeed(a) => a.parse_detail_page(body, stub),
            Site::LinkedIn(a) => a.parse_detail_page(body, stub),
        }
    }

    fn has_next_page(&self, next_page: Option<&PageToken>) -> bool {
        match self {
            Site::Indeed(a) => a.has_next_page(next_page),
            Site::LinkedIn(a) => a.has_next_page(next_page),
        }
    }

    fn is_blocked(&self, status: u16, body: &str) -> bool {
        match self {
            Site::Indeed(a) => a.is_blocked(status, body),
            Site::LinkedIn(a) => a.is_blocked(status, body),
        }
    }

    fn build_detail_request(&self, stub: &ListingStub) -> FetchRequest {
        match self {
            Site::Indeed(a) => a.build_detail_request(stub),
            Site::LinkedIn(a) => a.build_detail_request(stub),
        }
    }
}

/// Hands out the adapter for a [`Source`].
#[derive(Clone)]
pub struct SiteFactory {
    indeed: IndeedAdapter,
    linkedin: LinkedInAdapter,
}

impl SiteFactory {
    /// Adapters pointed at the live sites.
    pub fn new() -> Result<Self, AppError> {
        Ok(Self::with_adapters(
            IndeedAdapter::new()?,
            LinkedInAdapter::new()?,
        ))
    }

    pub fn with_adapters(indeed: IndeedAdapter, linkedin: LinkedInAdapter) -> Self {
        Self { indeed, linkedin }
    }
}

impl AdapterFactory for SiteFactory {
    type Adapter = Site;

    fn adapter(&self, source: Source) -> Site {
        match source {
            Source::Indeed => Site::Indeed(self.indeed.clone()),
            Source::LinkedIn => Site::LinkedIn(self.linkedin.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared parsing helpers
// ---------------------------------------------------------------------------

pub(crate) fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e:?}")))
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, AppError> {
    Url::parse(base_url).map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))
}

/// Whitespace-collapsed text content of `element`.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first element under `scope` matching `selector` that has any.
pub(crate) fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// Texts of every element under `scope` matching `selector`.
pub(crate) fn all_texts(scope: ElementRef<'_>, selector: &Selector) -> Vec<String> {
    scope
        .select(selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

/// Salary-looking text: anything mentioning a currency sign.
pub(crate) fn find_salary<'a>(candidates: impl IntoIterator<Item = &'a String>) -> Option<String> {
    candidates
        .into_iter()
        .find(|text| text.contains(['$', '€', '£']))
        .cloned()
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
