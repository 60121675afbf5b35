use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use im_cli::cli::{self, Cli, Command, ConfigCommand};
use im_domain::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,im_credentials=debug,im_stream=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let (config, _) = cli::load_config()?;
            init_tracing(&config.logging);
            cli::chat::chat(Arc::new(config), None, false).await
        }
        Some(Command::Chat { language, keep_open }) => {
            let (config, _) = cli::load_config()?;
            init_tracing(&config.logging);
            cli::chat::chat(Arc::new(config), language, keep_open).await
        }
        Some(Command::Token {
            unauthenticated,
            client_credentials,
        }) => {
            let (config, _) = cli::load_config()?;
            init_tracing(&config.logging);
            let flow = cli::token::TokenFlow::from_flags(unauthenticated, client_credentials);
            cli::token::token(&config, flow).await
        }
        Some(Command::Inspect { assertion }) => {
            let (config, _) = cli::load_config()?;
            init_tracing(&config.logging);
            cli::token::inspect(&config, assertion)
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _) = cli::load_config()?;
            cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("imsim {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Stderr tracing so stdout carries only command output.
///
/// `RUST_LOG` wins over `logging.filter`, which wins over the default.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(logging.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}
