// Legacy API device endpoints
//
// Device listing via stat/device and the outlet relay override via
// rest/device/{id}. SmartPower PDUs expose their outlets through the
// `outlet_table` / `outlet_overrides` fields of the device object.

use serde_json::json;
use tracing::debug;

use crate::error::Error;
use crate::legacy::client::LegacyClient;
use crate::legacy::models::{LegacyDevice, OutletOverride};

impl LegacyClient {
    /// List all devices with full statistics.
    ///
    /// `GET /api/s/{site}/stat/device`
    pub async fn list_devices(&self) -> Result<Vec<LegacyDevice>, Error> {
        let url = self.site_url("stat/device")?;
        debug!("listing devices");
        self.get(url).await
    }

    /// Replace a device's outlet overrides.
    ///
    /// `PUT /api/s/{site}/rest/device/{device_id}` with
    /// `{"outlet_overrides": [{"index": N, "name": "...", "relay_state": bool}, ...]}`.
    /// The controller treats the list as authoritative, so callers pass the
    /// device's full override list with the targeted entry changed.
    pub async fn set_outlet_overrides(
        &self,
        device_id: &str,
        overrides: &[OutletOverride],
    ) -> Result<(), Error> {
        let url = self.site_url(&format!("rest/device/{device_id}"))?;
        debug!(device_id, count = overrides.len(), "updating outlet overrides");
        let _: Vec<serde_json::Value> = self
            .put(url, &json!({ "outlet_overrides": overrides }))
            .await?;
        Ok(())
    }
}
