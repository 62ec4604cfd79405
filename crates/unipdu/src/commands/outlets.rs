//! Outlet listing.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use unipdu_core::{Outlet, PduDevice, Session};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Listing record ──────────────────────────────────────────────────

/// Outlet joined with its device, as rendered by `unipdu outlets`.
#[derive(Debug, Serialize)]
struct OutletView {
    id: String,
    device: String,
    index: u32,
    name: String,
    on: bool,
    switchable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    power_watts: Option<f64>,
}

impl OutletView {
    fn new(outlet: &Outlet, device: Option<&Arc<PduDevice>>) -> Self {
        Self {
            id: outlet.outlet_id().to_string(),
            device: device.map_or_else(
                || outlet.device_mac.to_string(),
                |d| d.display_name().to_owned(),
            ),
            index: outlet.index,
            name: outlet.name.clone(),
            on: outlet.relay_state,
            switchable: outlet.is_switchable(),
            power_watts: outlet.power_watts,
        }
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct OutletRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "#")]
    index: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Power")]
    power: String,
}

fn row(view: &OutletView, color: bool) -> OutletRow {
    OutletRow {
        id: view.id.clone(),
        device: view.device.clone(),
        index: view.index,
        name: view.name.clone(),
        state: if view.switchable {
            output::relay_label(view.on, color)
        } else {
            "-".into()
        },
        power: view
            .power_watts
            .map(|w| format!("{w:.1} W"))
            .unwrap_or_default(),
    }
}

/// Every outlet in the store, sorted by device MAC then index.
fn collect(session: &Session) -> Vec<OutletView> {
    let store = session.store();
    let mut outlets: Vec<Arc<Outlet>> = store.outlets_snapshot().iter().cloned().collect();
    outlets.sort_by(|a, b| {
        a.device_mac
            .as_str()
            .cmp(b.device_mac.as_str())
            .then(a.index.cmp(&b.index))
    });
    outlets
        .iter()
        .map(|o| OutletView::new(o, store.device(o.device_mac.as_str()).as_ref()))
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(entry: &unipdu_core::ConfigEntry, global: &GlobalOpts) -> Result<(), CliError> {
    let session = super::connect(entry).await?;
    let views = collect(&session);
    session.shutdown();

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &views,
        |v| row(v, color),
        |v| v.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
