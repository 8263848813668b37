use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use jobcontroller_core::script_api::ScriptApiClient;
use job_watcher::config::WatcherConfig;
use job_watcher::watcher::JobWatcher;
use tracing_subscriber::FmtSubscriber;

/// Sidecar that watches one workload's main container to completion and
/// reports its outcome back to the script API.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = WatcherConfig::load();
    let client = kube::Client::try_default().await?;
    let script_api = ScriptApiClient::new(reqwest::Client::new(), config.api_host.clone(), config.api_key.clone());

    let watcher = JobWatcher::discover(client, &config, script_api).await?;
    watcher.watch().await?;
    Ok(())
}
