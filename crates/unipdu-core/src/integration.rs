// ── Host lifecycle ──
//
// `Integration` is what a host holds per config entry: set up once,
// optionally re-optioned, unloaded at the end.

use std::sync::Arc;

use tracing::{debug, info};

use crate::client::{ControllerClient, LegacyControllerClient};
use crate::config::{ConfigEntry, EntryOptions, SessionConfig};
use crate::dispatch::Signal;
use crate::entity::{AddEntities, descriptors, register_platform_add_entities};
use crate::error::SetupError;
use crate::session::Session;

/// A set-up config entry and its live session.
#[derive(Debug)]
pub struct Integration {
    entry_id: String,
    session: Session,
}

impl Integration {
    /// Connect to the entry's controller, register the switch platform
    /// and start background work.
    pub async fn setup(entry: &ConfigEntry, add_entities: AddEntities) -> Result<Self, SetupError> {
        let config = SessionConfig::from(entry);
        let client = LegacyControllerClient::new(&config)
            .map_err(|e| e.into_setup_kind(config.url.as_str()))?;
        Self::setup_with_client(entry, Arc::new(client), add_entities).await
    }

    /// [`setup`](Self::setup) over a caller-supplied controller client.
    pub async fn setup_with_client(
        entry: &ConfigEntry,
        client: Arc<dyn ControllerClient>,
        add_entities: AddEntities,
    ) -> Result<Self, SetupError> {
        let session = Session::connect(SessionConfig::from(entry), client).await?;
        session.set_options(entry.options.clone());

        register_platform_add_entities(&session, &descriptors(&entry.options), add_entities);
        session.initialize();

        info!(entry = %entry.entry_id, site = %session.config().site, "integration set up");
        Ok(Self {
            entry_id: entry.entry_id.clone(),
            session,
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Replace the entry options and let registrars re-scan.
    pub fn update_options(&self, options: EntryOptions) {
        debug!(entry = %self.entry_id, "updating options");
        self.session.set_options(options);
        self.session.dispatcher().send(Signal::OptionsUpdated);
    }

    /// Shut the session down and wait for its tasks. Returns `false` if a
    /// task ended abnormally.
    pub async fn unload(self) -> bool {
        self.session.shutdown();
        let clean = self.session.join().await;
        info!(entry = %self.entry_id, clean, "integration unloaded");
        clean
    }
}
