use jobscout_core::{JobType, ListingStub, PageToken, Remote, SiteAdapter, Source};

use crate::common::{
    adapter, indeed_card, indeed_detail, indeed_detail_url, indeed_listing, linkedin_card,
    linkedin_detail, linkedin_detail_url, linkedin_listing,
};

#[test]
fn indeed_listing_through_site_dispatch() {
    let site = adapter(Source::Indeed);
    let body = indeed_listing(
        &[
            indeed_card("a1", "Architect", "ABC Design Group"),
            indeed_card("a2", "Project Architect", "XYZ Studio"),
        ],
        Some(10),
    );

    let page = site.parse_listing_page(&body);

    assert_eq!(site.source(), Source::Indeed);
    let urls: Vec<&str> = page.stubs.iter().map(|s| s.detail_url.as_str()).collect();
    assert_eq!(urls, vec![indeed_detail_url("a1"), indeed_detail_url("a2")]);
    assert_eq!(page.next_page, Some(PageToken::new("10")));
    assert!(site.has_next_page(page.next_page.as_ref()));
}

#[test]
fn indeed_detail_through_site_dispatch() {
    let site = adapter(Source::Indeed);
    let stub = ListingStub {
        detail_url: indeed_detail_url("a1"),
        source_site_id: Some("a1".into()),
        raw_title: "Architect".into(),
    };

    let record = site
        .parse_detail_page(
            &indeed_detail(
                "Architect",
                Some("ABC Design Group"),
                "<span>$40 an hour</span><span>Part-time</span><span>Hybrid work</span>",
            ),
            &stub,
        )
        .unwrap();

    assert_eq!(record.title, "Architect");
    assert_eq!(record.company, "ABC Design Group");
    assert_eq!(record.job_type, Some(JobType::PartTime));
    assert_eq!(record.remote, Remote::Yes);
    assert_eq!(record.salary, "$40 an hour");
    assert_eq!(record.posted_date.unwrap().to_string(), "2024-05-08");
}

#[test]
fn linkedin_listing_and_detail_through_site_dispatch() {
    let site = adapter(Source::LinkedIn);
    let page = site.parse_listing_page(&linkedin_listing(&[linkedin_card(
        "architect-at-abc",
        "1",
        "Architect",
    )]));

    assert_eq!(page.stubs.len(), 1);
    assert_eq!(page.stubs[0].detail_url, linkedin_detail_url("architect-at-abc", "1"));
    assert_eq!(page.stubs[0].source_site_id.as_deref(), Some("1"));
    assert!(!site.has_next_page(page.next_page.as_ref()));

    let record = site
        .parse_detail_page(
            &linkedin_detail("Architect", "ABC Design Group", "Internship"),
            &page.stubs[0],
        )
        .unwrap();
    assert_eq!(record.job_type, Some(JobType::Internship));
    assert_eq!(record.posted_date.unwrap().to_string(), "2024-05-03");
    assert_eq!(record.source, Source::LinkedIn);
}

#[test]
fn block_detection_is_per_site() {
    let indeed = adapter(Source::Indeed);
    let linkedin = adapter(Source::LinkedIn);

    assert!(linkedin.is_blocked(999, ""));
    assert!(!indeed.is_blocked(999, ""));
    assert!(indeed.is_blocked(200, "<title>Just a moment...</title>"));
    assert!(!linkedin.is_blocked(200, "<title>Just a moment...</title>"));
}
