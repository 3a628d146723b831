use std::path::PathBuf;

use orderbook_recorder_lib::{config, logger};
use structopt::StructOpt;
use tracing::{info, warn};

#[ctor::ctor]
fn init_logger() {
    logger::init("orderbook_recorder", "info");
}

#[derive(Debug, StructOpt)]
#[structopt(name = "orderbook_recorder", about = "order book recorder usage.")]
struct Opt {
    #[structopt(parse(from_os_str))]
    replay: Option<PathBuf>,
    #[structopt(short = "c", long = "config")]
    config: Option<String>,
    #[structopt(short = "m", long = "memory")]
    memory: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    let replay_file = opt
        .replay
        .unwrap_or_else(|| PathBuf::from("orderbook_recorder/resources/updates.jsonl"));
    let config_file = opt
        .config
        .unwrap_or_else(|| "orderbook_recorder/config/default.yaml".into());

    let config: config::Config = config::load_config(Some(config_file.as_str())).unwrap_or_else(|e| {
        warn!("Using default config: {}", e);
        config::Config::default()
    });
    info!("Config: {:?}", config);

    let pipeline = if opt.memory {
        info!("Using in-memory cache and store");
        orderbook_recorder_lib::run_in_memory(replay_file, config).await?.0
    } else {
        info!("Using redis cache and postgres store");
        orderbook_recorder_lib::run_persistent(replay_file, config).await?
    };

    tokio::signal::ctrl_c().await?;
    let unavailable = pipeline.unavailable();
    if !unavailable.is_empty() {
        warn!("Unavailable instruments: {:?}", unavailable);
    }
    pipeline.shutdown().await;
    Ok(())
}
