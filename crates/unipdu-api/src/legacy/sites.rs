// Legacy API site endpoints
//
// Site listing is controller-scoped (`/api/self/sites`); the caller's own
// view of a site (`/api/s/{site}/self`) is site-scoped and carries the
// role the logged-in account holds there.

use tracing::debug;

use crate::error::Error;
use crate::legacy::client::LegacyClient;
use crate::legacy::models::{LegacySite, SiteDescription};

impl LegacyClient {
    /// List all sites visible to the authenticated user.
    ///
    /// `GET /api/self/sites` (controller-level, not site-scoped)
    pub async fn list_sites(&self) -> Result<Vec<LegacySite>, Error> {
        let url = self.api_url("self/sites")?;
        debug!("listing sites");
        self.get(url).await
    }

    /// Describe the configured site from the logged-in account's perspective.
    ///
    /// `GET /api/s/{site}/self`
    pub async fn site_description(&self) -> Result<Vec<SiteDescription>, Error> {
        let url = self.site_url("self")?;
        debug!(site = self.site(), "fetching site description");
        self.get(url).await
    }
}
