//! `unipdu watch`: run the integration and stream switch state.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use unipdu_core::{AddEntities, ConfigEntry, ConnectionState, EntityStateChanged, Integration, SwitchEntity};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

fn state_line(update: &EntityStateChanged, color: bool) -> String {
    format!(
        "{}  {}  {}",
        update.object_id,
        output::relay_label(update.is_on, color),
        output::availability_label(update.available, color),
    )
}

fn snapshot(entity: &SwitchEntity) -> EntityStateChanged {
    let state = entity.state();
    EntityStateChanged {
        unique_id: entity.unique_id().to_owned(),
        object_id: entity.object_id().to_owned(),
        is_on: state.is_on,
        available: state.available,
    }
}

/// Print every newly registered switch with its initial state.
fn printer(format: OutputFormat, color: bool, quiet: bool) -> AddEntities {
    Arc::new(move |entities: Vec<SwitchEntity>| {
        for entity in &entities {
            let update = snapshot(entity);
            match output::render_record(&format, &update, |u| {
                let name = entity.name().unwrap_or_default();
                format!("+ {}  {name}", state_line(u, color))
            }) {
                Ok(line) => output::print_output(&line, quiet),
                Err(e) => tracing::warn!(error = %e, "failed to render entity"),
            }
        }
    })
}

pub async fn handle(entry: &ConfigEntry, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let integration =
        Integration::setup(entry, printer(global.output.clone(), color, global.quiet)).await?;

    let mut updates = integration.session().entity_updates();
    let mut connection = integration.session().connection_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;

            _ = &mut ctrl_c => break,

            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connection.borrow_and_update().clone();
                if !global.quiet {
                    match state {
                        ConnectionState::Reconnecting { attempt } => {
                            eprintln!("reconnecting (attempt {attempt})");
                        }
                        other => eprintln!("connection: {other:?}"),
                    }
                }
            }

            update = updates.recv() => match update {
                Ok(update) => {
                    match output::render_record(&global.output, &update, |u| state_line(u, color)) {
                        Ok(line) => output::print_output(&line, global.quiet),
                        Err(e) => tracing::warn!(error = %e, "failed to render update"),
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "entity updates lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if !integration.unload().await {
        tracing::warn!("background task ended abnormally during unload");
    }
    Ok(())
}
