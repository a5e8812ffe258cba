//! postrs - command-line client for the postrs email API.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use postrs_core::ScreenError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use commands::App;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postrs=info,postrs_core=info,postrs_oauth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            match e.downcast_ref::<ScreenError>() {
                Some(screen) if screen.needs_login() => {
                    eprintln!("Not signed in. Run `postrs login` (or `postrs logout` first to reset).");
                }
                Some(_) => {
                    eprintln!("If this keeps happening, `postrs logout` resets the stored session.");
                }
                None => {}
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = postrs_core::AppConfig::load(cli.config.as_deref())?;
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
        config.validate()?;
    }

    let app = App::new(config)?;
    app.run(cli.command, cli.validate).await
}
