//! `diarist serve`: Start the HTTP API server.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Diarist gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.backend);
    println!("   Media:     {}", config.media.backend);
    println!(
        "   Sweep:     {}",
        if config.scheduler.profile_sweep.enabled {
            config.scheduler.profile_sweep.schedule.as_str()
        } else {
            "disabled"
        }
    );

    diarist_gateway::start(config).await?;

    Ok(())
}
