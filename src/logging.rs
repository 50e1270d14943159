//! # 日志配置模块
//!
//! 初始化 tracing 订阅者，并提供带阶段/组件字段的结构化日志宏

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStage {
    /// 启动
    Startup,
    /// 关闭
    Shutdown,
    /// 配置加载
    Configuration,
    /// 载荷校验
    Validation,
    /// 令牌缓存
    TokenCache,
    /// 令牌交换
    TokenExchange,
    /// 识别请求分发
    Dispatch,
    /// 认证失败重试
    Retry,
    /// 响应处理
    Response,
}

impl LogStage {
    /// 字段值
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::TokenCache => "token_cache",
            Self::TokenExchange => "token_exchange",
            Self::Dispatch => "dispatch",
            Self::Retry => "retry",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志组件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogComponent {
    /// 主程序
    Main,
    /// 配置
    Config,
    /// HTTP 服务器
    Server,
    /// 载荷校验器
    Validator,
    /// 令牌缓存
    TokenCache,
    /// 令牌获取器
    TokenAcquirer,
    /// 识别分发器
    Dispatcher,
    /// 重试协调器
    RetryCoordinator,
    /// 路由处理器
    Handler,
}

impl LogComponent {
    /// 字段值
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Server => "server",
            Self::Validator => "validator",
            Self::TokenCache => "token_cache",
            Self::TokenAcquirer => "token_acquirer",
            Self::Dispatcher => "dispatcher",
            Self::RetryCoordinator => "retry_coordinator",
            Self::Handler => "handler",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化 INFO 日志
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 结构化 DEBUG 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 结构化 WARN 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 结构化 ERROR 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 遮蔽敏感值，只保留前缀
#[must_use]
pub fn mask_secret(value: &str, visible: usize) -> String {
    let prefix: String = value.chars().take(visible).collect();
    if prefix.len() == value.len() {
        "***".to_string()
    } else {
        format!("{prefix}...")
    }
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先；否则使用传入级别并对本 crate 开启 debug。
pub fn init_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let default_filter = format!("{level},ocr_gateway=debug,hyper=warn,reqwest=warn");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    // 测试中可能重复初始化
    if let Err(e) = result {
        eprintln!("日志系统已初始化，跳过: {e}");
    }
}
