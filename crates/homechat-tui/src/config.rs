use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};
use homechat_core::RequestParameters;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Request settings, falling back to the built-in defaults for anything unset
    pub fn request_parameters(&self) -> RequestParameters {
        let defaults = RequestParameters::default();
        RequestParameters {
            endpoint: self.endpoint.clone().unwrap_or(defaults.endpoint),
            model: self.model.clone().unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }

    pub fn from_parameters(params: &RequestParameters) -> Self {
        Self {
            endpoint: Some(params.endpoint.clone()),
            model: Some(params.model.clone()),
            temperature: Some(params.temperature),
            top_p: Some(params.top_p),
            max_tokens: Some(params.max_tokens),
        }
    }

    pub fn data_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("homechat"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("config.json"))
    }
}
