use anyhow::Result;
use drivelink::logging::{get_logger, init_logging};
use drivelink::sink::ChannelStore;
use drivelink::transport::http::HttpFetcher;
use drivelink::web::{self, AppState};
use drivelink::{Config, VehicleHandler};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    let logger = get_logger("main");
    logger.info(&format!(
        "Drivelink {} starting for vehicle {}",
        env!("APP_VERSION"),
        config.vehicle.vin
    ));

    let fetcher = Arc::new(
        HttpFetcher::new(&config).map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?,
    );
    let store = Arc::new(ChannelStore::new());
    let handler = VehicleHandler::new(config.clone(), fetcher, store.clone());

    // An invalid configuration keeps the vehicle offline; the HTTP surface
    // still reports why
    if let Err(e) = handler.initialize() {
        logger.error(&format!("Vehicle stays offline: {}", e));
    }

    let state = AppState {
        handler: handler.clone(),
        store,
    };
    let host = config.web.host.clone();
    let port = config.web.port;
    let web_task = tokio::spawn(async move {
        if let Err(e) = web::serve(state, &host, port).await {
            tracing::error!("Web server error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            logger.info("Shutdown requested");
        }
        _ = web_task => {
            logger.warn("Web server stopped");
        }
    }

    handler.dispose();
    Ok(())
}
