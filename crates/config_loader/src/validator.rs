//! 配置校验模块
//!
//! 校验规则：
//! - url 合法，且 scheme 为 http/https
//! - interval_ms、max_buffer_size、max_rps、refill_tokens、max_concurrency > 0
//! - max_rps <= 1_000_000
//! - request_timeout_ms 若设置则 > 0

use contracts::{ContractError, NotifierSettings};
use validator::{Validate, ValidationErrors};

/// 校验 NotifierSettings 配置
///
/// 返回第一个遇到的错误（按字段名排序），或 Ok(())。
pub fn validate(settings: &NotifierSettings) -> Result<(), ContractError> {
    settings.validate().map_err(first_error)?;
    validate_url_scheme(settings)?;
    validate_request_timeout(settings)?;
    Ok(())
}

/// 将 derive 校验结果转换为第一个字段错误
fn first_error(errors: ValidationErrors) -> ContractError {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().collect();
    fields.sort();

    let Some(field) = fields.first() else {
        return ContractError::config_validation("settings", "invalid configuration");
    };

    let message = field_errors
        .get(*field)
        .and_then(|errs| errs.first())
        .map(|err| match &err.message {
            Some(message) => message.to_string(),
            None => format!("failed '{}' check", err.code),
        })
        .unwrap_or_else(|| "invalid value".to_string());

    ContractError::config_validation(field.to_string(), message)
}

/// 仅支持 HTTP(S) 目标
fn validate_url_scheme(settings: &NotifierSettings) -> Result<(), ContractError> {
    let scheme = settings
        .url
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase());

    match scheme.as_deref() {
        Some("http") | Some("https") => Ok(()),
        _ => Err(ContractError::config_validation(
            "url",
            format!("unsupported scheme in '{}', expected http or https", settings.url),
        )),
    }
}

/// 校验请求超时
fn validate_request_timeout(settings: &NotifierSettings) -> Result<(), ContractError> {
    if settings.request_timeout_ms == Some(0) {
        return Err(ContractError::config_validation(
            "request_timeout_ms",
            "must be > 0 when set",
        ));
    }
    Ok(())
}
