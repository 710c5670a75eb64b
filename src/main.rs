use anyhow::Result;
use ble_bridge_lib::{config::AppConfig, console, logging, state::AppState};
use log::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // The config path is the only argument; defaults apply without one.
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(path).await?,
        None => AppConfig::default(),
    };
    if logging::init(&config.log_level).is_err() {
        eprintln!("Logger already initialized");
    }

    info!("Starting AppState initialization.");
    let app_state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize AppState with BluetoothManager: {}", e);
            return Err(e);
        }
    };

    let result = console::run(&app_state.bridge).await;
    app_state.shutdown().await;
    info!("Bridge stopped");
    result
}
