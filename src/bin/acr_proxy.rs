use acr::config::Config;
use tracing::error;

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = acr::proxy::serve(config.proxy_port, config.proxy_target).await {
        error!("Proxy stopped: {}", e);
        std::process::exit(1);
    }
}
