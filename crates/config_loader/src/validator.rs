//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (validator derive 规则)
//! - min_cadence_ms <= max_cadence_ms
//! - event rule 的 metric_name 合法且唯一
//! - archive 启用时 path 非空

use std::collections::HashSet;

use contracts::{is_valid_metric_name, ContractError, ServiceConfig};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 ServiceConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ServiceConfig) -> Result<(), ContractError> {
    validate_field_rules(config)?;
    validate_cadence_range(config)?;
    validate_event_rules(config)?;
    validate_archive(config)?;
    Ok(())
}

/// 执行派生的字段规则
fn validate_field_rules(config: &ServiceConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_violation(&errors, "");
        ContractError::config_validation(field, message)
    })
}

/// 取出第一个字段错误，字段名带上嵌套路径
fn first_violation(errors: &ValidationErrors, prefix: &str) -> (String, String) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let message = list
                    .first()
                    .map(|e| match &e.message {
                        Some(msg) => msg.to_string(),
                        None => format!("failed '{}' rule", e.code),
                    })
                    .unwrap_or_else(|| "invalid value".to_string());
                return (path, message);
            }
            ValidationErrorsKind::Struct(inner) => return first_violation(inner, &path),
            ValidationErrorsKind::List(items) => {
                if let Some((idx, inner)) = items.iter().next() {
                    return first_violation(inner, &format!("{path}[{idx}]"));
                }
            }
        }
    }
    (prefix.to_string(), "invalid configuration".to_string())
}

/// 校验快照频率范围
fn validate_cadence_range(config: &ServiceConfig) -> Result<(), ContractError> {
    let snapshot = &config.snapshot;
    if snapshot.min_cadence_ms > snapshot.max_cadence_ms {
        return Err(ContractError::config_validation(
            "snapshot.min_cadence_ms / snapshot.max_cadence_ms",
            format!(
                "min_cadence_ms ({}) must be <= max_cadence_ms ({})",
                snapshot.min_cadence_ms, snapshot.max_cadence_ms
            ),
        ));
    }
    Ok(())
}

/// 校验派生事件规则
fn validate_event_rules(config: &ServiceConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, rule) in config.ingest.event_rules.iter().enumerate() {
        if !is_valid_metric_name(&rule.metric_name) {
            return Err(ContractError::config_validation(
                format!("ingest.event_rules[{idx}].metric_name"),
                format!("invalid metric name '{}'", rule.metric_name),
            ));
        }
        if !seen.insert(rule.metric_name.as_str()) {
            return Err(ContractError::config_validation(
                format!("ingest.event_rules[metric_name={}]", rule.metric_name),
                "duplicate event rule",
            ));
        }
        if rule.min_value.is_some_and(|v| !v.is_finite()) {
            return Err(ContractError::config_validation(
                format!("ingest.event_rules[{idx}].min_value"),
                "min_value must be finite",
            ));
        }
    }
    Ok(())
}

/// 校验归档配置
fn validate_archive(config: &ServiceConfig) -> Result<(), ContractError> {
    let archive = &config.archive;
    if archive.enabled && archive.path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "archive.path",
            "archive path cannot be empty when archive is enabled",
        ));
    }
    Ok(())
}
