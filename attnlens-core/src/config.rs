//! Configuration system for attnlens.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/attnlens/config.toml` and/or `.attnlens/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ViewError;
use crate::gateway::GatewayConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Choices and bounds offered by the interactive view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Models the user may pick from. The first entry is the default.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Max-token values are multiples of this step above `min_tokens`.
    #[serde(default = "default_token_step")]
    pub token_step: usize,
    #[serde(default = "default_token_count")]
    pub default_tokens: usize,
    #[serde(default = "default_sentence")]
    pub default_sentence: String,
    /// Query token selected when a new sentence is rendered.
    #[serde(default = "default_token_index")]
    pub default_token_index: usize,
    /// Draw `[CLS]` / `[SEP]` faint in the colored sentence.
    #[serde(default = "default_true")]
    pub dim_special_tokens: bool,
    /// Directory holding `<model name>/` checkpoints to use instead of the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            min_tokens: default_min_tokens(),
            max_tokens: default_max_tokens(),
            token_step: default_token_step(),
            default_tokens: default_token_count(),
            default_sentence: default_sentence(),
            default_token_index: default_token_index(),
            dim_special_tokens: true,
            model_dir: None,
        }
    }
}

fn default_models() -> Vec<String> {
    vec!["bert-base-uncased".to_string()]
}

fn default_min_tokens() -> usize {
    16
}

fn default_max_tokens() -> usize {
    64
}

fn default_token_step() -> usize {
    8
}

fn default_token_count() -> usize {
    48
}

fn default_sentence() -> String {
    "I love deep learning because it can understand language.".to_string()
}

fn default_token_index() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// `[CLS]` and `[SEP]` alone take two positions.
pub const MIN_SEQUENCE_TOKENS: usize = 2;

impl ViewerConfig {
    /// Reject settings no request could satisfy.
    pub fn validate(&self) -> Result<(), ViewError> {
        if self.models.is_empty() {
            return Err(ViewError::InvalidSettings(
                "at least one model must be listed".into(),
            ));
        }
        if self.min_tokens < MIN_SEQUENCE_TOKENS {
            return Err(ViewError::InvalidSettings(format!(
                "min_tokens is {}, must be at least {MIN_SEQUENCE_TOKENS}",
                self.min_tokens
            )));
        }
        if self.min_tokens > self.max_tokens {
            return Err(ViewError::InvalidSettings(format!(
                "min_tokens {} exceeds max_tokens {}",
                self.min_tokens, self.max_tokens
            )));
        }
        if !(self.min_tokens..=self.max_tokens).contains(&self.default_tokens) {
            return Err(ViewError::InvalidSettings(format!(
                "default_tokens {} outside {}..={}",
                self.default_tokens, self.min_tokens, self.max_tokens
            )));
        }
        Ok(())
    }

    /// The model used when a request does not name one.
    pub fn default_model(&self) -> &str {
        self.models
            .first()
            .map(String::as_str)
            .unwrap_or("bert-base-uncased")
    }

    /// Check that `name` is one of the offered models.
    pub fn check_model(&self, name: &str) -> Result<(), ViewError> {
        if self.models.iter().any(|m| m == name) {
            return Ok(());
        }
        Err(ViewError::UnknownModel {
            name: name.to_string(),
            available: self.models.clone(),
        })
    }

    /// Validate a max-token value and snap it down onto the step grid.
    ///
    /// The result is never below [`MIN_SEQUENCE_TOKENS`].
    pub fn quantize_max_tokens(&self, value: usize) -> Result<usize, ViewError> {
        let min = self.min_tokens.max(MIN_SEQUENCE_TOKENS);
        if value < min || value > self.max_tokens {
            return Err(ViewError::MaxTokensOutOfRange {
                value,
                min,
                max: self.max_tokens,
            });
        }
        let step = self.token_step.max(1);
        Ok(min + (value - min) / step * step)
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `ATTNLENS_`)
/// 3. Workspace-local config (`.attnlens/config.toml`)
/// 4. User config (`~/.config/attnlens/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // ATTNLENS_GATEWAY__PORT, ATTNLENS_VIEWER__DEFAULT_TOKENS, etc.
    figment = figment.merge(Env::prefixed("ATTNLENS_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: AppConfig = figment.extract().map_err(Box::new)?;
    config
        .viewer
        .validate()
        .map_err(|e| Box::new(figment::Error::from(e.to_string())))?;
    Ok(config)
}

/// `~/.config/attnlens/config.toml` on Linux, platform equivalent elsewhere.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "attnlens", "attnlens")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".attnlens").join("config.toml")
}

/// Write the default configuration to `<workspace>/.attnlens/config.toml`.
///
/// Returns the path and whether a new file was written; an existing file is
/// left untouched.
pub fn init_workspace_config(workspace: &Path) -> anyhow::Result<(PathBuf, bool)> {
    let config_path = workspace_config_path(workspace);
    if config_path.exists() {
        return Ok((config_path, false));
    }
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let toml_str = toml::to_string_pretty(&AppConfig::default())?;
    std::fs::write(&config_path, toml_str)?;
    Ok((config_path, true))
}
