//! # Config Loader
//!
//! 读取 streamgate 的 `ServiceConfig`：按扩展名选择 TOML 或 JSON，
//! 反序列化后立即校验，调用方拿到的配置总是合法的。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("streamgate.toml"))?;
//! println!("listening on {}", config.server.bind_addr);
//! # Ok::<(), contracts::ContractError>(())
//! ```

mod parser;
mod validator;

pub use contracts::ServiceConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Loads, validates and writes back `ServiceConfig`
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from a `.toml` or `.json` file
    pub fn load_from_path(path: &Path) -> Result<ServiceConfig, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let format = ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!(
                "unsupported config format: '{}' (expected .toml or .json)",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Parse then validate
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ServiceConfig, ContractError> {
        let config = parser::parse(content, format)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Range rules plus cross-field checks; used again after CLI overrides
    pub fn validate(config: &ServiceConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &ServiceConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &ServiceConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}
