use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use vercel_runtime::Error;
use whatsapp_relay::dev_server::{self, DEFAULT_ADDR};
use whatsapp_relay::{telemetry, Relay, RelayConfig, Route};

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init();

    let addr: SocketAddr = std::env::var("DEV_SERVER_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    let config = RelayConfig::from_env()?;
    if config.credentials.is_none() {
        warn!("WhatsApp credentials missing, every send will fail with a configuration error");
    }
    let relay = Arc::new(Relay::new(config)?);

    let listener = TcpListener::bind(addr).await?;
    info!("Dev server listening on http://{}", addr);
    info!(
        "Routes: POST {} and POST {}",
        Route::SendMessage.path(),
        Route::SendAttachment.path()
    );

    dev_server::run(listener, relay).await;
    Ok(())
}
