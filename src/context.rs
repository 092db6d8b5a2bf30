use crate::{config::SyncConfig, requests::PortalClient, urls::{LinkIdExtractor, PortalUrls}};

/// Everything a sync run needs, built once at startup.
pub struct SyncContext {
    pub config: SyncConfig,
    pub urls: PortalUrls,
    pub ids: LinkIdExtractor,
    pub client: PortalClient,
}

impl SyncContext {
    pub fn new() -> anyhow::Result<Self> {
        let config = SyncConfig::new()?;
        let urls = PortalUrls::new(&config.portal_base_url);
        let ids = LinkIdExtractor::new()?;
        let client = PortalClient::new()?;
        Ok(SyncContext {
            config,
            urls,
            ids,
            client,
        })
    }
}
