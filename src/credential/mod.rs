//! # 访问令牌管理
//!
//! 令牌的获取（client credentials 交换）与单槽缓存。
//! 缓存是唯一的共享可变状态，由调用方以 `Arc` 持有。

mod cache;
mod exchange;

pub use cache::TokenCache;
pub use exchange::{ClientCredentialsAcquirer, TokenEndpointResponse};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::RecognitionResult;

/// 访问令牌
///
/// 只由 [`TokenAcquirer`] 创建，整体替换，不做局部修改。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// 创建令牌
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// 根据服务商返回的有效期（秒）创建令牌
    ///
    /// 有效期为负或超出时间范围时返回 `None`。
    #[must_use]
    pub fn from_expires_in(
        value: impl Into<String>,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if expires_in < 0 {
            return None;
        }
        let expires_at = now.checked_add_signed(Duration::try_seconds(expires_in)?)?;
        Some(Self::new(value, expires_at))
    }

    /// 令牌值
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 真实过期时间
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// 在 `now` 时刻、考虑刷新缓冲后是否仍可使用
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>, refresh_buffer: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(refresh_buffer)
            .is_some_and(|usable_until| now < usable_until)
    }

    /// 剩余有效秒数（不小于 0）
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &crate::logging::mask_secret(&self.value, 10))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// 令牌获取器：缓存条目的唯一生产者
///
/// 实现不得在内部重试，重试策略属于识别流水线。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenAcquirer: Send + Sync {
    /// 执行一次凭据交换
    async fn acquire(&self) -> RecognitionResult<AccessToken>;
}
