//! # 配置管理模块
//!
//! 处理配置文件加载、环境变量覆盖和验证

mod app_config;
mod overrides;

pub use app_config::{AppConfig, ProviderConfig, ServerConfig};
pub use overrides::{ENV_PREFIX, apply_env_overrides, build_env_overrides};

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Context, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";

/// 解析配置文件路径
///
/// 命令行参数优先，其次 `GATEWAY_CONFIG_PATH`，最后 `config/config.{RUST_ENV}.toml`
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> (PathBuf, bool) {
    if let Some(path) = explicit {
        return (path.to_path_buf(), true);
    }
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return (PathBuf::from(path), true);
    }
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    (PathBuf::from(format!("config/config.{env}.toml")), false)
}

/// 加载配置：文件 + 进程环境变量覆盖 + 验证
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let (path, required) = resolve_config_path(explicit);
    load_config_from(&path, required, env::vars())
}

/// 从指定文件与变量集合加载配置
///
/// `required` 为假时，文件缺失则使用默认配置。
pub fn load_config_from<I>(path: &Path, required: bool, vars: I) -> Result<AppConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("TOML解析失败 - 配置文件: {}", path.display()))?;
        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "config_file_loaded",
            &format!("已加载配置文件: {}", path.display())
        );
        config
    } else if required {
        return Err(crate::config_error!("配置文件不存在: {}", path.display()));
    } else {
        lwarn!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "config_file_missing",
            &format!("配置文件不存在: {}，使用默认配置", path.display())
        );
        AppConfig::default()
    };

    let overrides = build_env_overrides(vars);
    apply_env_overrides(&mut config, &overrides)?;

    config.validate()?;

    linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Config,
        "config_ready",
        &format!(
            "配置加载完成: 端口 {}, 环境变量覆盖 {} 个",
            config.server.port,
            overrides.len()
        )
    );
    Ok(config)
}
