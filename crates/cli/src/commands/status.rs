//! `diarist status`: Show configuration and loaded personas.

use diarist_config::AppConfig;
use diarist_core::persona::PersonaLibrary;
use std::path::Path;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let file = super::config_file(config_path);

    println!("Diarist status");
    println!("==============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Store:        {} ({})", config.store.backend, config.store.resolved_path().display());
    println!("  Media:        {} ({})", config.media.backend, config.media.resolved_dir().display());
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Credentials:  {}", config.auth.tokens.len());
    println!(
        "  Sweep:        {}",
        if config.scheduler.profile_sweep.enabled {
            config.scheduler.profile_sweep.schedule.as_str()
        } else {
            "disabled"
        }
    );
    println!(
        "  Context:      {} days of entries, {} exchanges",
        config.companion.entry_window_days, config.companion.history_limit
    );

    println!("\nPersonas");
    let personas = PersonaLibrary::load(config.personas.dir.as_deref().map(Path::new));
    print!("{}", personas.diagnostic_summary());

    if file.exists() {
        println!("\n  Config file found: {}", file.display());
    } else {
        println!("\n  No config file, run `diarist init` first");
    }

    Ok(())
}
