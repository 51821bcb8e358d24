use std::sync::Arc;

use tracing::{error, info};
use vercel_runtime::{run, Error};
use whatsapp_relay::{telemetry, Relay, RelayConfig};

mod api {
    use std::sync::Arc;

    use whatsapp_relay::{Relay, Route};
    pub use vercel_runtime::{Body, Error, Request, Response};

    pub async fn handler(req: Request, relay: Arc<Relay>) -> Result<Response<Body>, Error> {
        relay.handle(Route::SendMessage, req).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init();

    let config = RelayConfig::from_env().inspect_err(|e| error!("Invalid configuration: {}", e))?;
    let relay = Arc::new(Relay::new(config)?);
    info!("WhatsApp relay (JSON message route) initiated...");

    match run(move |req| api::handler(req, Arc::clone(&relay))).await {
        Ok(_) => {
            info!("API server shutdown gracefully");
            Ok(())
        }
        Err(e) => {
            error!("API server error: {}", e);
            Err(e)
        }
    }
}
