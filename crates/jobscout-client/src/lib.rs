pub mod dates;
pub mod sites;
pub mod transport;

pub use sites::{IndeedAdapter, LinkedInAdapter, Site, SiteFactory};
pub use transport::ReqwestTransport;
