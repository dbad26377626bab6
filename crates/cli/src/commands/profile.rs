//! `diarist analyze` and `diarist sweep`: Profile derivation on demand.

use diarist_core::auth::UserId;
use diarist_gateway::GatewayState;
use std::path::Path;

pub async fn analyze(config_path: Option<&Path>, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let state = GatewayState::from_config(&config).await?;

    let profile = state.analyzer.derive_and_store_profile(&UserId::new(user)).await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

pub async fn sweep(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let state = GatewayState::from_config(&config).await?;

    let report = state.analyzer.sweep().await?;
    println!("Profile sweep");
    println!("  Analyzed: {}", report.analyzed);
    println!("  Skipped:  {}", report.skipped);
    println!("  Failed:   {}", report.failed);
    Ok(())
}
