use anyhow::Result;
use std::{process, sync::Arc};
use tcp_relay::{CONFIG_FILE, Counters, Logger, init_tracing, load_config, run};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(CONFIG_FILE)?;
    init_tracing(&config.settings);

    let log = Logger::from_settings(&config.settings);
    log.info(format_args!(
        "tcp-relay ({}) proxying from {} to {}",
        env!("CARGO_PKG_VERSION"),
        config.link.local_address,
        config.link.remote_address
    ));

    let counters = Arc::new(Counters::new());
    if let Err(e) = run(config, log.clone(), counters).await {
        log.warn(e);
        process::exit(1);
    }

    Ok(())
}
