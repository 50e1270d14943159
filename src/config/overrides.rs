//! # 环境变量覆盖
//!
//! `GATEWAY_` 前缀的环境变量覆盖配置文件中的值，
//! 例如 `GATEWAY_SERVER_PORT` -> `server.port`

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::AppConfig;
use crate::error::{GatewayError, Result};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "GATEWAY_";

/// 旧版前端使用的凭据变量名
const LEGACY_CLIENT_ID_VARS: [&str; 2] = ["REACT_APP_BAIDU_API_KEY", "BAIDU_API_KEY"];
const LEGACY_CLIENT_SECRET_VARS: [&str; 2] = ["REACT_APP_BAIDU_SECRET_KEY", "BAIDU_SECRET_KEY"];

/// 构建环境变量覆盖映射
///
/// 旧版凭据变量先映射到 `provider.client.id` / `provider.client.secret`，
/// 同名的 `GATEWAY_` 变量随后覆盖它们。
pub fn build_env_overrides<I>(vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut legacy = BTreeMap::new();
    let mut overrides = BTreeMap::new();

    for (key, value) in vars {
        if LEGACY_CLIENT_ID_VARS.contains(&key.as_str()) {
            legacy.insert("provider.client.id".to_string(), value);
        } else if LEGACY_CLIENT_SECRET_VARS.contains(&key.as_str()) {
            legacy.insert("provider.client.secret".to_string(), value);
        } else if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
            let config_path = config_key.to_lowercase().replace('_', ".");
            overrides.insert(config_path, value);
        }
    }

    legacy.extend(overrides);
    debug!("发现 {} 个环境变量覆盖", legacy.len());
    legacy
}

/// 应用环境变量覆盖
pub fn apply_env_overrides(
    config: &mut AppConfig,
    overrides: &BTreeMap<String, String>,
) -> Result<()> {
    for (path, value) in overrides {
        debug!(
            "应用环境变量覆盖: {} = {}",
            path,
            if path.contains("secret") || path.contains("id") {
                "***"
            } else {
                value.as_str()
            }
        );
        apply_override_to_config(config, path, value)?;
    }
    Ok(())
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .map_err(|e| GatewayError::config_with_source(format!("无效的配置值 {path}: {value}"), e))
}

/// 将单个覆盖应用到配置对象
fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = path.split('.').collect();

    match parts.as_slice() {
        ["server", "bind", "address"] | ["server", "host"] => {
            config.server.bind_address = value.to_string();
        }
        ["server", "port"] => config.server.port = parse_value(path, value)?,
        ["server", "enable", "cors"] => config.server.enable_cors = parse_value(path, value)?,
        ["server", "cors", "origins"] => {
            config.server.cors_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        ["server", "max", "request", "size"] => {
            config.server.max_request_size = parse_value(path, value)?;
        }
        ["provider", "client", "id"] => config.provider.client_id = value.to_string(),
        ["provider", "client", "secret"] => config.provider.client_secret = value.to_string(),
        ["provider", "token", "url"] => config.provider.token_url = value.to_string(),
        ["provider", "base", "url"] => config.provider.base_url = value.to_string(),
        ["provider", "language", "type"] => config.provider.language_type = value.to_string(),
        ["provider", "recognition", "timeout", "seconds"] => {
            config.provider.recognition_timeout_seconds = parse_value(path, value)?;
        }
        ["provider", "token", "timeout", "seconds"] => {
            config.provider.token_timeout_seconds = parse_value(path, value)?;
        }
        ["provider", "refresh", "buffer", "seconds"] => {
            config.provider.refresh_buffer_seconds = parse_value(path, value)?;
        }
        ["provider", "max", "payload", "kib"] => {
            config.provider.max_payload_kib = parse_value(path, value)?;
        }
        ["provider", "auth", "failure", "codes"] => {
            config.provider.auth_failure_codes = value
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(|code| parse_value(path, code))
                .collect::<Result<Vec<i64>>>()?;
        }
        // 配置文件路径变量由加载器消费
        ["config", "path"] => {}
        _ => {
            warn!("未知的配置路径，忽略环境变量覆盖: {}", path);
        }
    }

    Ok(())
}
