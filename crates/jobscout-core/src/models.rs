use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::proxy_pool::ProxyEndpoint;

/// Salary value used when a posting does not advertise one.
pub const SALARY_UNSPECIFIED: &str = "unspecified";

/// Listing site a record was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Indeed,
    LinkedIn,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Indeed, Source::LinkedIn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Indeed => "Indeed",
            Source::LinkedIn => "LinkedIn",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "indeed" => Ok(Source::Indeed),
            "linkedin" => Ok(Source::LinkedIn),
            other => Err(AppError::ConfigError(format!("Unknown platform: {other}"))),
        }
    }
}

/// Whether a posting allows remote work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Remote {
    Yes,
    No,
    #[default]
    Unknown,
}

impl Remote {
    /// Infer the remote flag from free text such as a badge or a criteria line.
    ///
    /// "Hybrid" counts as remote-capable.
    pub fn from_text(text: &str) -> Remote {
        let lower = text.to_lowercase();
        if lower.contains("remote") || lower.contains("hybrid") || lower.contains("work from home")
        {
            Remote::Yes
        } else if lower.contains("on-site") || lower.contains("on site") || lower.contains("onsite")
        {
            Remote::No
        } else {
            Remote::Unknown
        }
    }
}

/// Employment type of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "Full-time")]
    FullTime,
    #[serde(rename = "Part-time")]
    PartTime,
    Contract,
    Internship,
    Temporary,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "Full-time",
            JobType::PartTime => "Part-time",
            JobType::Contract => "Contract",
            JobType::Internship => "Internship",
            JobType::Temporary => "Temporary",
        }
    }

    /// Find a job type mentioned anywhere in free text.
    pub fn from_text(text: &str) -> Option<JobType> {
        let lower = text.to_lowercase();
        if lower.contains("full-time") || lower.contains("full time") {
            Some(JobType::FullTime)
        } else if lower.contains("part-time") || lower.contains("part time") {
            Some(JobType::PartTime)
        } else if lower.contains("contract") {
            Some(JobType::Contract)
        } else if lower.contains("internship") {
            Some(JobType::Internship)
        } else if lower.contains("temporary") {
            Some(JobType::Temporary)
        } else {
            None
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full-time" | "fulltime" | "full time" => Ok(JobType::FullTime),
            "part-time" | "parttime" | "part time" => Ok(JobType::PartTime),
            "contract" => Ok(JobType::Contract),
            "internship" => Ok(JobType::Internship),
            "temporary" => Ok(JobType::Temporary),
            other => Err(AppError::ConfigError(format!("Unknown job type: {other}"))),
        }
    }
}

/// When a posting was published.
///
/// Either a normalized calendar date or, when the site text could not be
/// interpreted, the raw relative-age marker as shown by the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostedDate {
    Date(NaiveDate),
    Relative(String),
}

impl fmt::Display for PostedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostedDate::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            PostedDate::Relative(marker) => f.write_str(marker),
        }
    }
}

impl Serialize for PostedDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Workplace arrangement a search can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workplace {
    OnSite,
    Remote,
    Hybrid,
}

impl Workplace {
    /// Interpret a config remote flag ("yes", "remote", "no", "on-site",
    /// "hybrid", ...).
    pub fn from_flag(flag: &str) -> Option<Workplace> {
        let flag = flag.trim().to_lowercase();
        match flag.as_str() {
            "yes" | "remote" => Some(Workplace::Remote),
            "no" | "onsite" | "on-site" | "on site" => Some(Workplace::OnSite),
            _ if flag.contains("hybrid") => Some(Workplace::Hybrid),
            _ => None,
        }
    }
}

/// A search to run against one or more listing sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub keywords: String,
    pub location: String,
    /// Requested job types, in config order. Empty means any.
    pub job_types: Vec<JobType>,
    /// Requested workplace arrangements. Empty means any.
    pub workplaces: Vec<Workplace>,
    pub max_results: usize,
    pub posted_within_days: Option<u32>,
}

impl Query {
    pub const DEFAULT_MAX_RESULTS: usize = 50;

    pub fn new(keywords: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            location: location.into(),
            job_types: Vec::new(),
            workplaces: Vec::new(),
            max_results: Self::DEFAULT_MAX_RESULTS,
            posted_within_days: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Add `job_type` to the requested job types.
    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        if !self.job_types.contains(&job_type) {
            self.job_types.push(job_type);
        }
        self
    }

    /// Add `workplace` to the requested workplace arrangements.
    pub fn with_workplace(mut self, workplace: Workplace) -> Self {
        if !self.workplaces.contains(&workplace) {
            self.workplaces.push(workplace);
        }
        self
    }

    pub fn with_posted_within_days(mut self, days: u32) -> Self {
        self.posted_within_days = Some(days);
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.keywords.trim().is_empty() {
            return Err(AppError::InvalidQuery("keywords must not be empty".into()));
        }
        if self.location.trim().is_empty() {
            return Err(AppError::InvalidQuery(format!(
                "location must not be empty (keywords '{}')",
                self.keywords
            )));
        }
        if self.max_results == 0 {
            return Err(AppError::InvalidQuery(format!(
                "max_results must be greater than zero (keywords '{}')",
                self.keywords
            )));
        }
        Ok(())
    }
}

/// Adapter-owned pagination cursor. Only the adapter that produced it may
/// interpret its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reference to a detail page found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingStub {
    pub detail_url: String,
    pub source_site_id: Option<String>,
    pub raw_title: String,
}

/// Result of parsing one listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub stubs: Vec<ListingStub>,
    pub next_page: Option<PageToken>,
}

/// Canonical job posting.
///
/// Serializes 1:1 onto the export schema
/// (`title, company, location, jobtype, remote, posted_date, link,
/// description, salary, source`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(rename = "jobtype")]
    pub job_type: Option<JobType>,
    pub remote: Remote,
    pub posted_date: Option<PostedDate>,
    #[serde(rename = "link")]
    pub url: String,
    pub description: String,
    pub salary: String,
    pub source: Source,
}

impl JobRecord {
    /// A record needs a title and a company to be worth emitting.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.company.trim().is_empty()
    }
}

/// HTTP method of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// One outbound request attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub site: Source,
    /// Set by the fetcher for each attempt.
    pub proxy: Option<ProxyEndpoint>,
    /// 1-indexed attempt number.
    pub attempt: u32,
}

impl FetchRequest {
    pub fn get(site: Source, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            site,
            proxy: None,
            attempt: 1,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw HTTP answer handed back by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
