//! Clap derive structures for the `unipdu` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// unipdu -- switch UniFi SmartPower PDU outlets from the command line
#[derive(Debug, Parser)]
#[command(
    name = "unipdu",
    version,
    about = "Control UniFi SmartPower PDU outlets",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "UNIPDU_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller URL (overrides profile)
    #[arg(long, short = 'c', env = "UNIPDU_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Controller username (overrides profile)
    #[arg(long, short = 'u', env = "UNIPDU_USERNAME", global = true)]
    pub username: Option<String>,

    /// Site name
    #[arg(long, short = 's', env = "UNIPDU_SITE", global = true)]
    pub site: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "UNIPDU_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "UNIPDU_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List outlets on every PDU of the site
    #[command(alias = "ls")]
    Outlets,

    /// Switch an outlet on
    On(OutletArgs),

    /// Switch an outlet off
    Off(OutletArgs),

    /// Run the integration and print switch state changes until Ctrl-C
    Watch,

    /// Inspect CLI configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct OutletArgs {
    /// Outlet id: `<device-mac>_<outlet-index>` (see `unipdu outlets`)
    pub outlet: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Show the merged configuration with secrets masked
    Show,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_outlet_switch_with_globals() {
        let cli = Cli::try_parse_from([
            "unipdu",
            "--controller",
            "https://10.0.0.1",
            "-k",
            "on",
            "aa:bb:cc:dd:ee:ff_1",
        ])
        .expect("valid args");

        assert!(cli.global.insecure);
        assert_eq!(cli.global.controller.as_deref(), Some("https://10.0.0.1"));
        match cli.command {
            Command::On(args) => assert_eq!(args.outlet, "aa:bb:cc:dd:ee:ff_1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
