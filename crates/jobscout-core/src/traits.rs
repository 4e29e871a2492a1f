use std::future::Future;

use crate::error::AppError;
use crate::models::{
    FetchRequest, JobRecord, ListingPage, ListingStub, PageToken, Query, RawResponse, Source,
};

/// Sends a single HTTP request through the proxy assigned on the request.
///
/// Implementations report timeouts as [`AppError::Timeout`] and connection
/// problems as [`AppError::NetworkError`]; any HTTP status, including
/// non-2xx ones, comes back as a [`RawResponse`] for the caller to classify.
pub trait Transport: Send + Sync + Clone + 'static {
    fn send(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<RawResponse, AppError>> + Send;
}

/// Site-specific knowledge: how to search, paginate and parse one listing site.
///
/// Adapters are pure request builders and parsers; they never perform I/O.
pub trait SiteAdapter: Send + Sync + Clone + 'static {
    fn source(&self) -> Source;

    /// Build the listing request for `query`. `page_token` is `None` for the
    /// first page, otherwise a token this adapter returned earlier.
    fn build_search_request(
        &self,
        query: &Query,
        page_token: Option<&PageToken>,
    ) -> Result<FetchRequest, AppError>;

    /// Extract detail-page stubs and the next-page token from a listing page.
    fn parse_listing_page(&self, body: &str) -> ListingPage;

    /// Build a full record from a detail page. Fails with
    /// [`AppError::ParseFailure`] when title or company cannot be located.
    fn parse_detail_page(&self, body: &str, stub: &ListingStub) -> Result<JobRecord, AppError>;

    fn has_next_page(&self, next_page: Option<&PageToken>) -> bool;

    /// Recognize an anti-bot challenge served instead of real content.
    fn is_blocked(&self, status: u16, body: &str) -> bool;

    fn build_detail_request(&self, stub: &ListingStub) -> FetchRequest {
        FetchRequest::get(self.source(), stub.detail_url.clone())
    }
}

/// Maps a [`Source`] to the adapter that knows its markup.
pub trait AdapterFactory: Send + Sync + Clone + 'static {
    type Adapter: SiteAdapter;

    fn adapter(&self, source: Source) -> Self::Adapter;
}
