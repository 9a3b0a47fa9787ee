// Settings loader
// Reads ~/.cadet/config.toml when present, otherwise environment overrides on
// top of defaults.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use super::settings::Settings;

/// Load settings from the Cadet config file or environment.
pub fn load_settings() -> Result<Settings> {
    if let Some(settings) = try_load_from_config_file()? {
        return Ok(settings);
    }

    let mut settings = Settings::default();

    if let Ok(path) = std::env::var("CADET_MODEL_STORAGE_PATH") {
        if !path.is_empty() {
            settings.model_storage_path = PathBuf::from(path);
        }
    }
    if let Ok(value) = std::env::var("CADET_MAX_TRAINING_JOBS") {
        settings.max_training_jobs = value
            .parse()
            .context("CADET_MAX_TRAINING_JOBS must be an integer")?;
    }
    if let Ok(value) = std::env::var("CADET_TRAINING_TIMEOUT") {
        settings.training_timeout_secs = value
            .parse()
            .context("CADET_TRAINING_TIMEOUT must be seconds")?;
    }

    Ok(settings)
}

fn try_load_from_config_file() -> Result<Option<Settings>> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let config_path = home.join(".cadet/config.toml");

    if !config_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    #[derive(serde::Deserialize)]
    struct TomlSettings {
        model_storage_path: Option<PathBuf>,
        max_training_jobs: Option<usize>,
        training_timeout_secs: Option<u64>,
        progress_cache_ttl_secs: Option<u64>,
        progress_batch_interval: Option<usize>,
        max_epoch_checkpoints: Option<usize>,
    }

    let parsed: TomlSettings =
        toml::from_str(&contents).context("Failed to parse config.toml")?;

    let mut settings = Settings::default();
    if let Some(path) = parsed.model_storage_path {
        settings.model_storage_path = path;
    }
    if let Some(value) = parsed.max_training_jobs {
        settings.max_training_jobs = value;
    }
    if let Some(value) = parsed.training_timeout_secs {
        settings.training_timeout_secs = value;
    }
    if let Some(value) = parsed.progress_cache_ttl_secs {
        settings.progress_cache_ttl_secs = value;
    }
    if let Some(value) = parsed.progress_batch_interval {
        settings.progress_batch_interval = value;
    }
    if let Some(value) = parsed.max_epoch_checkpoints {
        settings.max_epoch_checkpoints = value;
    }

    Ok(Some(settings))
}
