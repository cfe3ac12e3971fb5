use clap::{Args, Parser, Subcommand};

/// Maintenance tool for the OTP relay's persisted session state.
#[derive(Parser, Debug)]
#[command(name = "otp-relay", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Defines the available subcommands for the application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print record count, database size and location.
    Stats(ConfigArgs),
    /// List stored record names, oldest update first.
    Keys(KeysCmd),
    /// Delete every stored record. The device will have to be paired again.
    Clear(ConfigArgs),
    /// Compact the database file and refresh planner statistics.
    Optimize(ConfigArgs),
}

impl Commands {
    pub fn config_path(&self) -> Option<&str> {
        match self {
            Commands::Stats(args) | Commands::Clear(args) | Commands::Optimize(args) => args.config.as_deref(),
            Commands::Keys(cmd) => cmd.config.config.as_deref(),
        }
    }
}

/// Arguments shared by every subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Path to the gateway configuration TOML file.
    /// If not provided, default values (and `OTP_RELAY_*` overrides) are used.
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Arguments for the `keys` subcommand.
#[derive(Args, Debug)]
pub struct KeysCmd {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Only list records of this category, e.g. `pre-key` or `session`.
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long)]
    pub offset: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_accepts_paging_and_prefix() {
        let cli = Cli::try_parse_from([
            "otp-relay", "keys", "--config", "relay.toml", "--prefix", "session", "--limit", "10", "--offset", "5",
        ])
        .unwrap();

        assert_eq!(cli.command.config_path(), Some("relay.toml"));
        let Commands::Keys(cmd) = cli.command else {
            panic!("expected the keys subcommand");
        };
        assert_eq!(cmd.prefix.as_deref(), Some("session"));
        assert_eq!(cmd.limit, Some(10));
        assert_eq!(cmd.offset, Some(5));
    }

    #[test]
    fn config_is_optional() {
        let cli = Cli::try_parse_from(["otp-relay", "stats"]).unwrap();
        assert_eq!(cli.command.config_path(), None);
    }
}
