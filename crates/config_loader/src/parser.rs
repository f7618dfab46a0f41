//! 配置解析
//!
//! TOML 为主，JSON 用于机器生成的配置。解析只做反序列化，
//! 合法性检查在 `validator` 中完成。

use std::error::Error;

use contracts::{ContractError, ServiceConfig};

type BoxError = Box<dyn Error + Send + Sync>;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 按扩展名识别，大小写不敏感
    pub fn from_extension(ext: &str) -> Option<Self> {
        [Self::Toml, Self::Json]
            .into_iter()
            .find(|format| ext.eq_ignore_ascii_case(format.extension()))
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// 反序列化为 `ServiceConfig`，错误保留底层解析器的 source
pub fn parse(content: &str, format: ConfigFormat) -> Result<ServiceConfig, ContractError> {
    let parsed: Result<ServiceConfig, BoxError> = match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(BoxError::from),
        ConfigFormat::Json => serde_json::from_str(content).map_err(BoxError::from),
    };
    parsed.map_err(|e| ContractError::ConfigParse {
        message: format!("{} parse error: {e}", format.label()),
        source: Some(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[ingest]
max_batch_size = 10
"#;
        let result = parse(content, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.ingest.max_batch_size, 10);
        assert_eq!(config.ingest.max_concurrent_batches, 4);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "session": { "session_timeout_ms": 2000, "mailbox_capacity": 8 },
            "alerts": { "bus_capacity": 16 }
        }"#;
        let result = parse(content, ConfigFormat::Json);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.session.mailbox_capacity, 8);
        assert_eq!(config.alerts.bus_capacity, 16);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse(content, ConfigFormat::Toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_parse_toml_wrong_type() {
        let content = r#"
[ingest]
max_batch_size = "lots"
"#;
        assert!(parse(content, ConfigFormat::Toml).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = parse("{", ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().contains("JSON parse error"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
