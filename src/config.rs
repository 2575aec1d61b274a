use crate::constants::*;
use crate::errors::{InferenceError, InferenceResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub remote_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_completion_tokens: u32,
    pub system_prompt: String,
    pub inference_server_url: String,
    pub log_level: String,
    pub api_log_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            top_p: DEFAULT_TOP_P,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            system_prompt: String::new(),
            inference_server_url: DEFAULT_INFERENCE_SERVER_URL.to_string(),
            log_level: "info".to_string(),
            api_log_path: None,
        }
    }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Loads the config from `~/.config/remote-inference/config.json`, writing the
/// defaults there on first run, and makes it the current config.
pub fn initialize_config() -> InferenceResult<Config> {
    let config_path = get_config_path()?;
    let config = initialize_config_at(&config_path)?;

    *CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config.clone();

    Ok(config)
}

pub fn initialize_config_at(config_path: &Path) -> InferenceResult<Config> {
    let mut config = if config_path.exists() {
        let config_str = fs::read_to_string(config_path).map_err(|e| {
            InferenceError::config_error(format!("Failed to read config file: {}", e))
        })?;

        serde_json::from_str::<Config>(&config_str)
            .map_err(|e| InferenceError::config_error(format!("Failed to parse config: {}", e)))?
    } else {
        let config = Config::default();
        write_config(config_path, &config)?;
        config
    };

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = env::var(API_KEY_ENV) {
        if !key.is_empty() {
            config.api_key = key;
        }
    }
    if let Ok(url) = env::var(REMOTE_URL_ENV) {
        if !url.is_empty() {
            config.remote_url = url;
        }
    }
}

fn get_config_path() -> InferenceResult<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| InferenceError::config_error("Could not determine home directory"))?;

    Ok(home_dir
        .join(".config")
        .join("remote-inference")
        .join("config.json"))
}

fn write_config(config_path: &Path, config: &Config) -> InferenceResult<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            InferenceError::config_error(format!("Failed to create config directory: {}", e))
        })?;
    }

    let config_str = serde_json::to_string_pretty(config)
        .map_err(|e| InferenceError::config_error(format!("Failed to serialize config: {}", e)))?;

    fs::write(config_path, config_str)
        .map_err(|e| InferenceError::config_error(format!("Failed to write config file: {}", e)))
}

pub fn validate_config(config: &Config) -> InferenceResult<()> {
    if !(config.remote_url.starts_with("http://") || config.remote_url.starts_with("https://")) {
        return Err(InferenceError::config_error(
            "remote_url must be an http(s) URL",
        ));
    }

    if !(config.inference_server_url.starts_with("http://")
        || config.inference_server_url.starts_with("https://"))
    {
        return Err(InferenceError::config_error(
            "inference_server_url must be an http(s) URL",
        ));
    }

    if config.model.is_empty() {
        return Err(InferenceError::config_error("Model name is required"));
    }

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(InferenceError::config_error(
            "Temperature must be between 0.0 and 2.0",
        ));
    }

    if config.top_p <= 0.0 || config.top_p > 1.0 {
        return Err(InferenceError::config_error(
            "top_p must be greater than 0.0 and at most 1.0",
        ));
    }

    if config.max_completion_tokens == 0 {
        return Err(InferenceError::config_error(
            "max_completion_tokens must be greater than 0",
        ));
    }

    Ok(())
}

pub fn get_config() -> Config {
    CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Validates, persists, and publishes a new config. Nothing changes when
/// validation fails.
pub fn update_config(updated_config: Config) -> InferenceResult<()> {
    let config_path = get_config_path()?;
    update_config_at(&config_path, updated_config)
}

pub fn update_config_at(config_path: &Path, updated_config: Config) -> InferenceResult<()> {
    validate_config(&updated_config)?;
    write_config(config_path, &updated_config)?;

    *CONFIG.write().unwrap_or_else(|e| e.into_inner()) = updated_config;

    Ok(())
}
