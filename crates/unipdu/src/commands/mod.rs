//! Command dispatch: bridges CLI args -> core session -> output formatting.

pub mod config_cmd;
pub mod outlets;
pub mod switch;
pub mod watch;

use std::sync::Arc;

use unipdu_core::{ConfigEntry, LegacyControllerClient, Session, SessionConfig};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    entry: &ConfigEntry,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Outlets => outlets::handle(entry, global).await,
        Command::On(args) => switch::handle(entry, &args.outlet, true, global).await,
        Command::Off(args) => switch::handle(entry, &args.outlet, false, global).await,
        Command::Watch => watch::handle(entry, global).await,
        // Config is handled before dispatch
        Command::Config(args) => config_cmd::handle(&args, global),
    }
}

/// One-shot session for commands that read or act once and exit.
///
/// Background tasks are never started, so dropping the session after
/// [`Session::shutdown`] is enough.
pub(crate) async fn connect(entry: &ConfigEntry) -> Result<Session, CliError> {
    let config = SessionConfig::from(entry);
    let client = LegacyControllerClient::new(&config)?;
    let session = Session::connect(config, Arc::new(client)).await?;
    Ok(session)
}
