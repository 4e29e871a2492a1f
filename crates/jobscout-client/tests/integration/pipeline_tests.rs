use futures::StreamExt;
use jobscout_core::testutil::{MockReply, MockTransport};
use jobscout_core::{CrawlTarget, Query, Source, TerminalReason};
use tokio_util::sync::CancellationToken;

use crate::common::{
    indeed_card, indeed_detail, indeed_detail_url, indeed_listing, linkedin_card,
    linkedin_detail, linkedin_detail_url, linkedin_listing, pipeline, search_url,
};

fn query() -> Query {
    Query::new("architect", "Atlanta, USA")
}

fn targets() -> Vec<CrawlTarget> {
    Source::ALL
        .into_iter()
        .map(|source| CrawlTarget {
            source,
            query: query(),
        })
        .collect()
}

/// Two Indeed pages and one LinkedIn page. The LinkedIn "Architect" posting is
/// a cross-post of Indeed's, one Indeed detail has no company and one
/// LinkedIn detail is behind the auth wall.
fn scripted_sites() -> MockTransport {
    let q = query();
    MockTransport::new()
        .route(
            search_url(Source::Indeed, &q, None),
            indeed_listing(
                &[
                    indeed_card("a1", "Architect", "ABC Design Group"),
                    indeed_card("a2", "Project Architect", "Unknown"),
                ],
                Some(10),
            ),
        )
        .route(
            search_url(Source::Indeed, &q, Some("10")),
            indeed_listing(&[indeed_card("a3", "Senior Architect", "XYZ Studio")], None),
        )
        .route(
            indeed_detail_url("a1"),
            indeed_detail("Architect", Some("ABC Design Group"), "<span>Full-time</span>"),
        )
        .route(
            indeed_detail_url("a2"),
            indeed_detail("Project Architect", None, ""),
        )
        .route(
            indeed_detail_url("a3"),
            indeed_detail("Senior Architect", Some("XYZ Studio"), "<span>Contract</span>"),
        )
        .route(
            search_url(Source::LinkedIn, &q, None),
            linkedin_listing(&[
                linkedin_card("architect-at-abc", "1", "Architect"),
                linkedin_card("interior-architect", "2", "Interior Architect"),
            ]),
        )
        .route(
            linkedin_detail_url("architect-at-abc", "1"),
            linkedin_detail("Architect", "ABC Design Group", "Full-time"),
        )
        .route(
            linkedin_detail_url("interior-architect", "2"),
            r#"<html><body><a href="https://www.linkedin.com/authwall?trk=x">Sign in</a></body></html>"#,
        )
}

#[tokio::test]
async fn scrapes_both_sites_and_dedupes_cross_posts() {
    let transport = scripted_sites();

    let run = pipeline(transport.clone())
        .run_targets(targets(), CancellationToken::new())
        .unwrap();
    let (records, summary) = run.collect_all().await;

    let mut titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Architect", "Senior Architect"]);

    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.drops.duplicate_records, 1);
    assert_eq!(summary.drops.parse_failures, 1);
    assert_eq!(summary.drops.detail_blocked, 1);
    assert!(summary.is_success());
    assert_eq!(summary.runs.len(), 2);
    assert!(
        summary
            .runs
            .iter()
            .all(|run| run.terminal_reason == TerminalReason::NoMorePages)
    );

    let indeed_run = summary
        .runs
        .iter()
        .find(|run| run.source == Source::Indeed)
        .unwrap();
    assert_eq!(indeed_run.pages_visited, 2);
}

#[tokio::test]
async fn blocked_search_page_ends_only_that_run() {
    let q = query();
    let transport = scripted_sites().route_replies(
        search_url(Source::Indeed, &q, None),
        vec![MockReply::status(403, "Forbidden")],
    );

    let run = pipeline(transport)
        .run_targets(targets(), CancellationToken::new())
        .unwrap();
    let (records, summary) = run.collect_all().await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, Source::LinkedIn);
    assert!(summary.is_success());

    let reasons: Vec<(Source, TerminalReason)> = summary
        .runs
        .iter()
        .map(|run| (run.source, run.terminal_reason))
        .collect();
    assert!(reasons.contains(&(Source::Indeed, TerminalReason::Blocked)));
    assert!(reasons.contains(&(Source::LinkedIn, TerminalReason::NoMorePages)));
}

#[tokio::test]
async fn records_stream_before_the_run_finishes() {
    let transport = scripted_sites();

    let mut run = pipeline(transport)
        .run_targets(targets(), CancellationToken::new())
        .unwrap();

    let first = run.next().await.expect("at least one record");
    assert!(first.is_valid());

    let summary = run.finish().await;
    assert!(summary.emitted >= 1);
}
