use anyhow::Context;
use cproxy_config::CproxyConfig;
use cproxy_core::ProxyServer;
use tracing::{info, warn};
use utils::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = CproxyConfig::from_env().context("cannot load configuration")?;
    init_tracing(cfg.global().log_level());

    for warning in cfg.validate().warnings() {
        warn!(target: "cproxy", "{warning}");
    }
    info!(target: "cproxy", "{}", cfg.summary());

    let mut server = ProxyServer::new(cfg)?;
    server.start().await?;
    info!(target: "cproxy", url = %server.url(), "Configure clients with this HTTP proxy");

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;

    info!(target: "cproxy", "Ctrl-C received");
    server.stop().await;

    Ok(())
}
