//! The unified error handling system for the gateway.

use std::fmt::Display;

pub use recognition::RecognitionError;
pub use types::GatewayError;

/// A unified `Result` type for the application layer.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Result type of the recognition pipeline.
pub type RecognitionResult<T> = std::result::Result<T, RecognitionError>;

pub mod macros;
pub mod recognition;
pub mod types;

/// Context trait for adding a message to errors that convert into
/// [`GatewayError`].
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display,
    {
        self.with_context(|| context)
    }

    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|error| GatewayError::config_with_source(context().to_string(), error))
    }
}

/// 错误分类，决定日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 调用方错误（4xx）
    Client,
    /// 网关或服务商错误（5xx）
    Server,
}

#[cfg(test)]
mod tests;
