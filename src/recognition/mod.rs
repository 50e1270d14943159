//! # 识别流水线
//!
//! 载荷校验、请求分发、认证失败重试与结果文本整理。

mod dispatcher;
mod payload;
mod retry;
mod text;
mod types;

pub use dispatcher::{HttpDispatcher, ProviderResponse, RecognitionDispatcher, WordsItem};
pub use payload::{DEFAULT_MAX_PAYLOAD_BYTES, PayloadValidator, decoded_size_estimate};
pub use retry::{RecognitionPipeline, RetryDecision};
pub use text::preprocess_text;
pub use types::{
    DispatchOutcome, ProviderFailure, Recognition, RecognitionRequest, RecognitionType,
};

#[cfg(test)]
pub use dispatcher::MockRecognitionDispatcher;
