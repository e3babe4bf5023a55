use anyhow::Result;
use clap::Parser;
use deep_research::cli::Args;
use deep_research::config::LogConfig;
use deep_research::launch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Logs go to stderr so stdout carries only the result JSON.
fn init_tracing(log: &LogConfig) {
    let registry = tracing_subscriber::registry().with(EnvFilter::new(&log.level));
    if log.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.into_config()?;
    init_tracing(&config.log);

    let options = args.launch_options(&config);
    launch(&config, &options).await?;
    Ok(())
}
