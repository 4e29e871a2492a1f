//! Cross-page, cross-source deduplication of job records.
//!
//! A record is identified by up to two [`DedupKey`]s:
//! - its canonical URL (query-string variants of the same posting collapse)
//! - its normalized `company | title | location` triple (cross-posts collapse)
//!
//! A record whose keys include any key already seen is a duplicate. The first
//! occurrence wins; later ones are dropped silently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use url::Url;

use crate::models::{JobRecord, compute_hash};
use crate::util::normalize_text;

/// Query parameters that identify a posting on their own.
const IDENTITY_PARAMS: &[&str] = &["jk", "vjk", "currentJobId"];

/// Query parameters that track a visit and never identify a posting.
const TRACKING_PARAMS: &[&str] = &[
    "from", "tk", "refId", "trackingId", "trk", "trkInfo", "position", "pageNum", "vjs",
    "advn", "xkcb", "xpse", "sjdu", "acatk", "camk", "pub",
];

fn is_tracking_param(name: &str) -> bool {
    TRACKING_PARAMS.contains(&name) || name.starts_with("utm_")
}

/// Derived identity of a posting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    /// Key from the canonical form of `url`, if it has one.
    pub fn from_url(url: &str) -> Option<Self> {
        canonical_url(url).map(|canonical| Self(compute_hash(&format!("url|{canonical}"))))
    }

    /// Key from the normalized company, title and location.
    pub fn from_fields(company: &str, title: &str, location: &str) -> Option<Self> {
        let company = normalize_text(company);
        let title = normalize_text(title);
        if company.is_empty() || title.is_empty() {
            return None;
        }
        let location = normalize_text(location);
        Some(Self(compute_hash(&format!(
            "fields|{company}|{title}|{location}"
        ))))
    }

    /// Every key identifying `record`.
    pub fn for_record(record: &JobRecord) -> Vec<Self> {
        DedupKey::from_url(&record.url)
            .into_iter()
            .chain(DedupKey::from_fields(
                &record.company,
                &record.title,
                &record.location,
            ))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Canonical form of a posting URL: lowercase scheme and host, no fragment,
/// no trailing slash and sorted query parameters.
///
/// When an identity parameter is present only identity parameters are kept.
/// Otherwise every parameter except known tracking ones is kept, since the
/// posting may be identified by any of them (e.g. Indeed ad links).
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.host_str()?;
    url.set_fragment(None);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    let has_identity = pairs
        .iter()
        .any(|(name, _)| IDENTITY_PARAMS.contains(&name.as_str()));
    let mut kept: Vec<(String, String)> = pairs
        .into_iter()
        .filter(|(name, _)| {
            if has_identity {
                IDENTITY_PARAMS.contains(&name.as_str())
            } else {
                !is_tracking_param(name)
            }
        })
        .collect();
    kept.sort();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut canonical = url.to_string();
    if url.query().is_none() && canonical.ends_with('/') && url.path() != "/" {
        canonical.pop();
    }
    Some(canonical)
}

/// Thread-safe, incremental deduplicator shared by all crawl runs.
///
/// Lookups and inserts happen under one lock, so concurrent callers observe
/// a single first occurrence per key.
#[derive(Clone, Default)]
pub struct Deduplicator {
    seen: Arc<Mutex<HashSet<DedupKey>>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the seen-set lock, recovering from poison if necessary.
    fn lock_seen(&self) -> std::sync::MutexGuard<'_, HashSet<DedupKey>> {
        self.seen.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned deduplicator mutex");
            poisoned.into_inner()
        })
    }

    /// Returns true if `record` is the first occurrence of its posting and
    /// should be emitted. All of its keys are remembered either way.
    pub fn admit(&self, record: &JobRecord) -> bool {
        let keys = DedupKey::for_record(record);
        let mut seen = self.lock_seen();
        let duplicate = keys.iter().any(|key| seen.contains(key));
        seen.extend(keys);
        if duplicate {
            tracing::debug!(url = %record.url, title = %record.title, "Duplicate record dropped");
        }
        !duplicate
    }

    /// Filter `records`, keeping first occurrences in their original order.
    pub fn dedupe<I>(&self, records: I) -> Vec<JobRecord>
    where
        I: IntoIterator<Item = JobRecord>,
    {
        records
            .into_iter()
            .filter(|record| self.admit(record))
            .collect()
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.lock_seen().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One-shot deduplication of a complete record list.
pub fn dedupe<I>(records: I) -> Vec<JobRecord>
where
    I: IntoIterator<Item = JobRecord>,
{
    Deduplicator::new().dedupe(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Remote, SALARY_UNSPECIFIED, Source};

    fn record(title: &str, company: &str, location: &str, url: &str, source: Source) -> JobRecord {
        JobRecord {
            title: title.into(),
            company: company.into(),
            location: location.into(),
            job_type: None,
            remote: Remote::Unknown,
            posted_date: None,
            url: url.into(),
            description: String::new(),
            salary: SALARY_UNSPECIFIED.into(),
            source,
        }
    }

    #[test]
    fn canonical_url_strips_tracking_but_keeps_identity() {
        assert_eq!(
            canonical_url("https://WWW.Indeed.com/viewjob?from=serp&jk=abc123&tk=xyz#apply").unwrap(),
            "https://www.indeed.com/viewjob?jk=abc123"
        );
        assert_eq!(
            canonical_url("https://www.linkedin.com/jobs/view/architect-at-abc-123/?refId=9&trk=guest").unwrap(),
            "https://www.linkedin.com/jobs/view/architect-at-abc-123"
        );
        assert!(canonical_url("not a url").is_none());
    }

    #[test]
    fn canonical_url_keeps_non_tracking_params_without_identity() {
        assert_eq!(
            canonical_url("https://www.indeed.com/pagead/clk?mo=r&ad=AAA111&tk=x&utm_source=mail").unwrap(),
            "https://www.indeed.com/pagead/clk?ad=AAA111&mo=r"
        );
        assert_eq!(
            canonical_url("https://www.indeed.com/pagead/clk?ad=AAA111&mo=r").unwrap(),
            canonical_url("https://www.indeed.com/pagead/clk?mo=r&ad=AAA111&from=serp").unwrap()
        );
    }

    #[test]
    fn ad_links_with_different_ids_are_distinct() {
        let records = vec![
            record("Architect", "ABC", "Atlanta", "https://www.indeed.com/pagead/clk?mo=r&ad=AAA111", Source::Indeed),
            record("Civil Engineer", "XYZ", "Atlanta", "https://www.indeed.com/pagead/clk?mo=r&ad=BBB222", Source::Indeed),
        ];
        assert_eq!(dedupe(records).len(), 2);
    }

    #[test]
    fn query_string_variants_are_duplicates() {
        let records = vec![
            record("Architect", "ABC", "Atlanta", "https://www.indeed.com/viewjob?jk=1&from=serp", Source::Indeed),
            record("Architect II", "ABC Inc", "Atlanta", "https://www.indeed.com/viewjob?jk=1&from=email", Source::Indeed),
        ];
        let out = dedupe(records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Architect");
    }

    #[test]
    fn cross_posted_records_are_duplicates_regardless_of_source() {
        let records = vec![
            record("Architect", "ABC Design Group", "Atlanta, USA", "https://www.indeed.com/viewjob?jk=1", Source::Indeed),
            record("architect", "ABC Design Group.", "Atlanta USA", "https://www.linkedin.com/jobs/view/77", Source::LinkedIn),
        ];
        let out = dedupe(records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, Source::Indeed);
    }

    #[test]
    fn dedupe_preserves_first_occurrence_order_and_is_idempotent() {
        let records = vec![
            record("A", "X", "L", "https://site.test/a", Source::Indeed),
            record("B", "X", "L", "https://site.test/b", Source::Indeed),
            record("A", "X", "L", "https://site.test/a2", Source::LinkedIn),
            record("C", "Y", "L", "https://site.test/b?utm_source=mail", Source::LinkedIn),
            record("D", "Y", "L", "https://site.test/d", Source::Indeed),
        ];
        let input_len = records.len();

        let once = dedupe(records);
        let titles: Vec<&str> = once.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "D"]);
        assert!(once.len() <= input_len);

        let twice = dedupe(once.clone());
        assert_eq!(twice, once);
    }

    #[test]
    fn shared_deduplicator_works_incrementally() {
        let dedup = Deduplicator::new();
        let first = record("A", "X", "L", "https://site.test/a", Source::Indeed);
        assert!(dedup.admit(&first));
        assert!(!dedup.admit(&first));
        assert!(!dedup.clone().admit(&first));
        assert_eq!(dedup.len(), 2);
    }
}
