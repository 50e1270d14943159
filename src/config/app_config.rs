//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 刷新缓冲上限（秒），远小于服务商令牌的有效期
pub const MAX_REFRESH_BUFFER_SECONDS: u64 = 86_400;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP 服务器配置
    pub server: ServerConfig,
    /// 识别服务商配置
    pub provider: ProviderConfig,
}

/// HTTP 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_address: String,
    /// 监听端口
    pub port: u16,
    /// 是否启用CORS
    pub enable_cors: bool,
    /// 允许的CORS源地址
    pub cors_origins: Vec<String>,
    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3003,
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            max_request_size: 50 * 1024 * 1024,
        }
    }
}

/// 识别服务商配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// 客户端标识（API Key）
    pub client_id: String,
    /// 客户端密钥（Secret Key）
    pub client_secret: String,
    /// 令牌端点
    pub token_url: String,
    /// 识别接口基础地址
    pub base_url: String,
    /// 语言提示
    pub language_type: String,
    /// 识别请求超时（秒）
    pub recognition_timeout_seconds: u64,
    /// 令牌交换超时（秒）
    pub token_timeout_seconds: u64,
    /// 令牌提前过期缓冲（秒）
    pub refresh_buffer_seconds: u64,
    /// 编码后载荷上限（KiB）
    pub max_payload_kib: usize,
    /// 需要刷新令牌后重试的错误码
    pub auth_failure_codes: Vec<i64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_url: "https://aip.baidubce.com/oauth/2.0/token".to_string(),
            base_url: "https://aip.baidubce.com/rest/2.0/ocr/v1".to_string(),
            language_type: "CHN_ENG".to_string(),
            recognition_timeout_seconds: 30,
            token_timeout_seconds: 10,
            refresh_buffer_seconds: 300,
            max_payload_kib: 4096,
            auth_failure_codes: vec![110, 6],
        }
    }
}

// 手写 Debug，避免密钥进入日志
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &crate::logging::mask_secret(&self.client_id, 8))
            .field("client_secret", &"***")
            .field("token_url", &self.token_url)
            .field("base_url", &self.base_url)
            .field("language_type", &self.language_type)
            .field("recognition_timeout_seconds", &self.recognition_timeout_seconds)
            .field("token_timeout_seconds", &self.token_timeout_seconds)
            .field("refresh_buffer_seconds", &self.refresh_buffer_seconds)
            .field("max_payload_kib", &self.max_payload_kib)
            .field("auth_failure_codes", &self.auth_failure_codes)
            .finish()
    }
}

impl ProviderConfig {
    /// 识别请求超时
    #[must_use]
    pub const fn recognition_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition_timeout_seconds)
    }

    /// 令牌交换超时
    #[must_use]
    pub const fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_seconds)
    }

    /// 令牌刷新缓冲，超出上限时按上限计
    #[must_use]
    pub fn refresh_buffer(&self) -> chrono::Duration {
        let seconds = self.refresh_buffer_seconds.min(MAX_REFRESH_BUFFER_SECONDS);
        chrono::Duration::seconds(i64::try_from(seconds).unwrap_or_default())
    }

    /// 载荷上限（字节），溢出时饱和
    #[must_use]
    pub const fn max_payload_bytes(&self) -> usize {
        self.max_payload_kib.saturating_mul(1024)
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> crate::error::Result<()> {
        crate::ensure_config!(self.server.port != 0, "无效的服务器端口: 0");
        crate::ensure_config!(self.server.max_request_size > 0, "最大请求体大小必须大于0");

        let provider = &self.provider;
        crate::ensure_config!(!provider.client_id.is_empty(), "provider.client_id 不能为空");
        crate::ensure_config!(
            !provider.client_secret.is_empty(),
            "provider.client_secret 不能为空"
        );
        for (name, url) in [("token_url", &provider.token_url), ("base_url", &provider.base_url)] {
            crate::ensure_config!(
                url.starts_with("http://") || url.starts_with("https://"),
                "provider.{} 必须是 http(s) 地址: {}",
                name,
                url
            );
        }
        crate::ensure_config!(
            provider.recognition_timeout_seconds > 0,
            "识别请求超时必须大于0"
        );
        crate::ensure_config!(provider.token_timeout_seconds > 0, "令牌交换超时必须大于0");
        crate::ensure_config!(provider.max_payload_kib > 0, "载荷上限必须大于0");
        crate::ensure_config!(
            provider.max_payload_kib.checked_mul(1024).is_some(),
            "载荷上限过大: {} KiB",
            provider.max_payload_kib
        );
        crate::ensure_config!(
            provider.refresh_buffer_seconds <= MAX_REFRESH_BUFFER_SECONDS,
            "令牌刷新缓冲不能超过 {} 秒: {}",
            MAX_REFRESH_BUFFER_SECONDS,
            provider.refresh_buffer_seconds
        );

        Ok(())
    }
}
