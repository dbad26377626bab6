//! `diarist chat`: One conversation turn from the terminal.

use diarist_core::auth::UserId;
use diarist_core::persona::Persona;
use diarist_gateway::GatewayState;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, persona: &str, user: &str, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let persona: Persona = persona.parse()?;
    let state = GatewayState::from_config(&config).await?;

    let reply = state
        .conversation
        .handle(&UserId::new(user), persona, message, None, None)
        .await?;

    println!("{}: {}", persona.display_name(), reply.response);
    if !reply.persisted {
        eprintln!("(exchange was not saved to history)");
    }
    for source in &reply.degraded {
        eprintln!("(context source unavailable: {source})");
    }
    Ok(())
}
