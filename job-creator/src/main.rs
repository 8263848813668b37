use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing_subscriber::FmtSubscriber;

use job_creator::config::CreatorConfig;
use job_creator::consumer;
use job_creator::dispatcher::Dispatcher;
use job_creator::paths::MountRoots;

/// Queue consumer that translates job requests into cluster workloads.
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

    let config = CreatorConfig::load();
    let client = kube::Client::try_default().await?;
    let script_api = jobcontroller_core::script_api::ScriptApiClient::new(
        reqwest::Client::new(),
        config.api_host.clone(),
        config.api_key.clone(),
    );

    let dispatcher = Dispatcher {
        client,
        config: config.clone(),
        script_api,
        http: reqwest::Client::new(),
        mount_roots: MountRoots::default(),
    };

    let consumer = consumer::connect(&config).await?;
    tracing::info!(queue = %config.queue_name, "job creator ready, consuming messages");
    consumer::run(consumer, dispatcher).await;

    Ok(())
}
