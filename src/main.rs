use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use usagewatch::config::{Command, Config, Settings};
use usagewatch::monitor;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    match cli.command.unwrap_or_default() {
        Command::Check { json } => monitor::run_check(&settings, json).await,
        Command::Watch { .. } => monitor::run_watch(&settings).await,
    }
}

fn setup_logging(debug: bool) {
    let default_filter = if debug {
        "usagewatch=debug,usagewatch_core=debug"
    } else {
        "usagewatch=info,usagewatch_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr so `check --json` output stays machine readable
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
