use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::PathBuf;

// Where the terminal client talks to and who it talks as. Resolved in
// order: environment variables, then the saved config file; main falls
// back to prompting and saves what the user enters.

#[derive(Serialize, Deserialize, Clone)]
pub struct Credentials {
    pub server_url: String,
    pub token: String,
}

impl Credentials {
    pub fn new(server_url: &str, token: &str) -> Self {
        Credentials {
            server_url: server_url.to_string(),
            token: token.to_string(),
        }
    }
}

pub fn credentials_from_env() -> Option<Credentials> {
    let server_url = std::env::var("CARELINE_SERVER_URL").ok()?;
    let token = std::env::var("CARELINE_TOKEN").ok()?;
    Some(Credentials::new(&server_url, &token))
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("careline");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("credentials.json"))
}

pub fn save_credentials(credentials: &Credentials) -> Result<()> {
    let config_path = get_config_path()?;
    let file = File::create(&config_path)?;
    serde_json::to_writer_pretty(file, credentials)?;

    info!("Credentials saved to {}", config_path.display());
    Ok(())
}

pub fn load_credentials() -> Result<Option<Credentials>> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&config_path)?;
    let credentials: Credentials = serde_json::from_str(&contents)?;
    info!("Loaded credentials for {} from {}", credentials.server_url, config_path.display());

    Ok(Some(credentials))
}
