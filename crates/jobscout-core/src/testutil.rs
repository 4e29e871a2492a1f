//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit and integration
//! tests. All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.
//!
//! [`MockAdapter`] speaks a tiny line-based page format instead of HTML:
//!
//! ```text
//! stub <detail-url> <raw title ...>     listing page entry
//! next <token>                          listing page pagination
//! title: Architect                      detail page field
//! ```
//!
//! Any body containing `captcha` is treated as an anti-bot page.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::models::{
    FetchRequest, JobRecord, JobType, ListingPage, ListingStub, PageToken, Query, RawResponse,
    Remote, SALARY_UNSPECIFIED, Source,
};
use crate::traits::{AdapterFactory, SiteAdapter, Transport};

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Cloneable scripted reply for a routed URL.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(RawResponse),
    Timeout,
    NetworkError(String),
}

impl MockReply {
    pub fn ok(body: impl Into<String>) -> Self {
        MockReply::Response(RawResponse::new(200, body))
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        MockReply::Response(RawResponse::new(status, body))
    }

    fn into_result(self) -> Result<RawResponse, AppError> {
        match self {
            MockReply::Response(response) => Ok(response),
            MockReply::Timeout => Err(AppError::Timeout(20)),
            MockReply::NetworkError(msg) => Err(AppError::NetworkError(msg)),
        }
    }
}

/// Mock transport answering from per-URL routes or a fallback queue.
///
/// Routed URLs pop their replies in order and keep repeating the last one.
/// Unrouted URLs pop the fallback queue; when it is empty they get a 404.
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<Vec<Result<RawResponse, AppError>>>>,
    routes: Arc<Mutex<HashMap<String, Vec<MockReply>>>>,
    sent: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Result<RawResponse, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Default::default()
        }
    }

    /// Answer `url` with a 200 and `body`.
    pub fn route(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.route_replies(url, vec![MockReply::ok(body)])
    }

    pub fn route_replies(self, url: impl Into<String>, replies: Vec<MockReply>) -> Self {
        self.routes.lock().unwrap().insert(url.into(), replies);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: &FetchRequest) -> Result<RawResponse, AppError> {
        self.sent.lock().unwrap().push(request.clone());

        let routed = {
            let mut routes = self.routes.lock().unwrap();
            routes.get_mut(&request.url).and_then(|replies| match replies.len() {
                0 => None,
                1 => Some(replies[0].clone()),
                _ => Some(replies.remove(0)),
            })
        };
        if let Some(reply) = routed {
            return reply.into_result();
        }

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(RawResponse::new(404, "not found"))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockAdapter
// ---------------------------------------------------------------------------

/// Line-format adapter for exercising the crawl engine without HTML.
#[derive(Debug, Clone)]
pub struct MockAdapter {
    source: Source,
    base_url: String,
}

impl MockAdapter {
    pub fn new(source: Source, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into(),
        }
    }

    pub fn indeed() -> Self {
        Self::new(Source::Indeed, "https://indeed.test")
    }

    pub fn linkedin() -> Self {
        Self::new(Source::LinkedIn, "https://linkedin.test")
    }

    /// URL of the listing page for `query` at `page` (`None` = first page).
    pub fn search_url(&self, query: &Query, page: Option<&str>) -> String {
        format!(
            "{}/search?q={}&l={}&page={}",
            self.base_url,
            query.keywords.replace(' ', "+"),
            query.location.replace(' ', "+"),
            page.unwrap_or("0")
        )
    }

    pub fn detail_url(&self, id: &str) -> String {
        format!("{}/job/{id}", self.base_url)
    }
}

/// Render a listing page in the mock format.
pub fn listing_body(stubs: &[(&str, &str)], next: Option<&str>) -> String {
    let mut body = String::from("<listing>\n");
    for (url, title) in stubs {
        body.push_str(&format!("stub {url} {title}\n"));
    }
    if let Some(token) = next {
        body.push_str(&format!("next {token}\n"));
    }
    body
}

/// Render a detail page in the mock format.
pub fn detail_body(fields: &[(&str, &str)]) -> String {
    let mut body = String::from("<detail>\n");
    for (key, value) in fields {
        body.push_str(&format!("{key}: {value}\n"));
    }
    body
}

impl SiteAdapter for MockAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn build_search_request(
        &self,
        query: &Query,
        page_token: Option<&PageToken>,
    ) -> Result<FetchRequest, AppError> {
        Ok(FetchRequest::get(
            self.source,
            self.search_url(query, page_token.map(PageToken::as_str)),
        ))
    }

    fn parse_listing_page(&self, body: &str) -> ListingPage {
        let mut page = ListingPage::default();
        for line in body.lines() {
            let mut parts = line.splitn(3, ' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("stub"), Some(url), title) => page.stubs.push(ListingStub {
                    detail_url: url.to_string(),
                    source_site_id: url.rsplit('/').next().map(str::to_string),
                    raw_title: title.unwrap_or_default().to_string(),
                }),
                (Some("next"), Some(token), _) => page.next_page = Some(PageToken::new(token)),
                _ => {}
            }
        }
        page
    }

    fn parse_detail_page(&self, body: &str, stub: &ListingStub) -> Result<JobRecord, AppError> {
        let fields: HashMap<&str, &str> = body
            .lines()
            .filter_map(|line| line.split_once(": "))
            .collect();

        let title = fields
            .get("title")
            .ok_or_else(|| AppError::ParseFailure(format!("no title on {}", stub.detail_url)))?;
        let company = fields
            .get("company")
            .ok_or_else(|| AppError::ParseFailure(format!("no company on {}", stub.detail_url)))?;

        Ok(JobRecord {
            title: title.to_string(),
            company: company.to_string(),
            location: fields.get("location").copied().unwrap_or_default().to_string(),
            job_type: fields.get("jobtype").and_then(|v| v.parse::<JobType>().ok()),
            remote: match fields.get("remote").copied() {
                Some("Yes") => Remote::Yes,
                Some("No") => Remote::No,
                _ => Remote::Unknown,
            },
            posted_date: None,
            url: stub.detail_url.clone(),
            description: fields.get("description").copied().unwrap_or_default().to_string(),
            salary: fields
                .get("salary")
                .copied()
                .unwrap_or(SALARY_UNSPECIFIED)
                .to_string(),
            source: self.source,
        })
    }

    fn has_next_page(&self, next_page: Option<&PageToken>) -> bool {
        next_page.is_some()
    }

    fn is_blocked(&self, _status: u16, body: &str) -> bool {
        body.contains("captcha")
    }
}

// ---------------------------------------------------------------------------
// MockAdapterFactory
// ---------------------------------------------------------------------------

/// Factory handing out [`MockAdapter::indeed`] / [`MockAdapter::linkedin`].
#[derive(Debug, Clone, Default)]
pub struct MockAdapterFactory;

impl AdapterFactory for MockAdapterFactory {
    type Adapter = MockAdapter;

    fn adapter(&self, source: Source) -> MockAdapter {
        match source {
            Source::Indeed => MockAdapter::indeed(),
            Source::LinkedIn => MockAdapter::linkedin(),
        }
    }
}
