pub mod chat;
pub mod config;
pub mod token;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};

use im_domain::config::Config;

/// imsim: drive an in-app messaging deployment from the terminal.
#[derive(Debug, Parser)]
#[command(name = "imsim", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Obtain an access token and print it as JSON.
    Token {
        /// Request a guest token without signing an assertion.
        #[arg(long, conflicts_with = "client_credentials")]
        unauthenticated: bool,
        /// Use the OAuth client-credentials grant from
        /// `[exchange.client_credentials]`.
        #[arg(long)]
        client_credentials: bool,
    },
    /// Decode an assertion and report its header, claims and timing.
    ///
    /// Without an argument, a fresh assertion is signed with the
    /// configured key and inspected.
    Inspect {
        /// Compact JWT to inspect.
        assertion: Option<String>,
    },
    /// Open a conversation, stream its events and send stdin lines as
    /// messages (default when no subcommand is given).
    Chat {
        /// Language tag for the new conversation.
        #[arg(long)]
        language: Option<String>,
        /// Keep the conversation open on exit.
        #[arg(long)]
        keep_open: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `IM_CONFIG` (or `imsim.toml`). Returns the
/// parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("IM_CONFIG").unwrap_or_else(|_| "imsim.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

/// A missing file yields the defaults.
pub fn load_config_from(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn no_subcommand_parses() {
        let cli = Cli::try_parse_from(["imsim"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn token_flags_parse() {
        let cli = Cli::try_parse_from(["imsim", "token", "--unauthenticated"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Token {
                unauthenticated: true,
                client_credentials: false
            })
        ));
        let cli = Cli::try_parse_from(["imsim", "token", "--client-credentials"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Token {
                client_credentials: true,
                ..
            })
        ));
        assert!(Cli::try_parse_from([
            "imsim",
            "token",
            "--unauthenticated",
            "--client-credentials"
        ])
        .is_err());
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["imsim", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Config(ConfigCommand::Show))));
        assert!(Cli::try_parse_from(["imsim", "config", "frobnicate"]).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(
            cfg.stream.max_reconnect_attempts,
            Config::default().stream.max_reconnect_attempts
        );
    }

    #[test]
    fn partial_file_keeps_field_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[service]\nbase_url = \"https://scrt.example.com\"\norg_id = \"00D1\"\n\n[credentials]\nkid = \"kid-1\""
        )
        .unwrap();

        let cfg = load_config_from(file.path()).unwrap();
        assert_eq!(cfg.service.base_url, "https://scrt.example.com");
        assert_eq!(cfg.credentials.kid.as_deref(), Some("kid-1"));
        assert_eq!(cfg.service.language, "en_US");
    }

    #[test]
    fn malformed_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[service\nbase_url =").unwrap();
        let err = load_config_from(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }
}
