//! `unipdu on` / `unipdu off`.

use unipdu_core::entity::switch::set_outlet_relay;
use unipdu_core::{ConfigEntry, CoreError, OutletId};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Parse and normalize an outlet argument (`AA-BB-..._1` works too).
fn parse_outlet(raw: &str) -> Result<OutletId, CliError> {
    raw.parse::<OutletId>().map_err(|_| CliError::Validation {
        field: "outlet".into(),
        reason: format!("expected <device-mac>_<outlet-index>, got '{raw}'"),
    })
}

pub async fn handle(
    entry: &ConfigEntry,
    outlet: &str,
    target: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let outlet_id = parse_outlet(outlet)?;
    let object_id = outlet_id.to_string();

    let session = super::connect(entry).await?;
    let result = match session.store().outlet(&object_id) {
        Some(o) if !o.is_switchable() => Err(CliError::Validation {
            field: "outlet".into(),
            reason: format!("outlet '{object_id}' has no relay"),
        }),
        Some(_) => set_outlet_relay(&session, &object_id, target)
            .await
            .map_err(CliError::from),
        None => Err(CoreError::OutletNotFound {
            identifier: object_id.clone(),
        }
        .into()),
    };
    session.shutdown();
    result?;

    tracing::debug!(outlet = %object_id, target, "relay switched");
    let color = output::should_color(&global.color);
    output::print_output(
        &format!("{object_id}: {}", output::relay_label(target, color)),
        global.quiet,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn outlet_argument_is_normalized() {
        let id = parse_outlet("AA-BB-CC-DD-EE-FF_4").expect("valid outlet");
        assert_eq!(id.to_string(), "aa:bb:cc:dd:ee:ff_4");
    }

    #[test]
    fn malformed_outlet_is_a_usage_error() {
        let err = parse_outlet("not-an-outlet").expect_err("must fail");
        assert_eq!(err.exit_code(), crate::error::exit_code::USAGE);
    }
}
