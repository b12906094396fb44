use lepton_breakout_rpi::{get_config_path, load_config, probe, BOARD_NAME};
use lepton_transport::{init_all, init_tracing};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    init_tracing();

    // Get config path (board default or override)
    let config_path = get_config_path();
    info!("[{}] Configuration path: {}", BOARD_NAME, config_path);

    let bus_config = load_config(&config_path)?;
    info!("[config] loaded {} bus(es)", bus_config.buses.len());

    let buses = init_all(&bus_config)?;
    info!("[registry] buses initialized");

    let report = probe(&buses).await;
    println!("{}", report.to_json()?);

    if report.passed() {
        info!("[{}] probe passed", BOARD_NAME);
        Ok(())
    } else {
        error!("[{}] probe failed", BOARD_NAME);
        Err("probe failed".into())
    }
}
