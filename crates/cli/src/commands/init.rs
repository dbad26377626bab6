//! `diarist init`: First-time setup.

use diarist_config::AppConfig;
use diarist_core::persona::{Persona, PersonaIdentity};
use std::path::Path;

pub fn run(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_file(config_path);
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_dir);
    let personas_dir = config_dir.join("personas");

    println!("Diarist setup");
    println!("=============\n");

    std::fs::create_dir_all(&personas_dir)?;
    println!("  Config directory: {}", config_dir.display());

    for persona in Persona::ALL {
        let path = personas_dir.join(persona.identity_file());
        if path.exists() && !force {
            println!("  {} exists, keeping it", path.display());
            continue;
        }
        std::fs::write(&path, PersonaIdentity::builtin(persona).document)?;
        println!("  Wrote {}", path.display());
    }

    if config_path.exists() && !force {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    let mut config = AppConfig::default();
    config.personas.dir = Some(personas_dir.display().to_string());
    std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;
    println!("  Wrote {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set GEMINI_API_KEY (or api_key in the config)");
    println!("   2. Add a credential under [auth.tokens]");
    println!("   3. Run: diarist serve\n");

    Ok(())
}
