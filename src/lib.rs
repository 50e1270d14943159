//! # OCR Gateway Library
//!
//! 第三方文字识别服务的令牌缓存与容错识别流水线，以及对外的 HTTP 代理。

pub mod config;
pub mod credential;
pub mod error;
pub mod logging;
pub mod recognition;
pub mod server;

// Re-export commonly used types
pub use config::AppConfig;
pub use credential::{AccessToken, TokenAcquirer, TokenCache};
pub use error::{GatewayError, RecognitionError, RecognitionResult, Result};
pub use recognition::{Recognition, RecognitionPipeline, RecognitionType};
pub use server::GatewayServer;
