//! # 令牌缓存
//!
//! 单槽缓存：读路径只拿读锁；未命中或强制刷新时经过刷新闸门，
//! 并发的刷新被合并成一次交换，所有等待者拿到同一个令牌。

use chrono::{Duration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

use super::{AccessToken, TokenAcquirer};
use crate::error::RecognitionResult;
use crate::logging::{LogComponent, LogStage, mask_secret};
use crate::{ldebug, lerror, linfo};

/// 令牌缓存
pub struct TokenCache {
    acquirer: Arc<dyn TokenAcquirer>,
    refresh_buffer: Duration,
    slot: RwLock<Option<AccessToken>>,
    /// 防止并发刷新的闸门
    refresh_gate: Mutex<()>,
    /// 每次写入槽位递增
    generation: AtomicU64,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("refresh_buffer", &self.refresh_buffer)
            .field("generation", &self.generation.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    /// 默认刷新缓冲：5分钟
    pub const DEFAULT_REFRESH_BUFFER_SECONDS: i64 = 300;

    /// 创建空缓存
    #[must_use]
    pub fn new(acquirer: Arc<dyn TokenAcquirer>, refresh_buffer: Duration) -> Self {
        Self {
            acquirer,
            refresh_buffer,
            slot: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// 使用默认刷新缓冲创建缓存
    #[must_use]
    pub fn with_default_buffer(acquirer: Arc<dyn TokenAcquirer>) -> Self {
        Self::new(
            acquirer,
            Duration::seconds(Self::DEFAULT_REFRESH_BUFFER_SECONDS),
        )
    }

    /// 获取令牌
    ///
    /// 非强制且缓存令牌仍可用时直接返回，不发起网络请求；
    /// 否则交换新令牌并整体替换槽位。
    pub async fn get_token(&self, force_refresh: bool) -> RecognitionResult<AccessToken> {
        let observed_generation = {
            let slot = self.slot.read().await;
            if !force_refresh {
                if let Some(token) = self.usable(slot.as_ref()) {
                    ldebug!(
                        "token",
                        LogStage::TokenCache,
                        LogComponent::TokenCache,
                        "cache_hit",
                        "使用缓存的访问令牌"
                    );
                    return Ok(token);
                }
            }
            self.generation.load(Ordering::Acquire)
        };

        let _gate = self.refresh_gate.lock().await;

        // 等待闸门期间可能已有其他调用者完成刷新
        {
            let slot = self.slot.read().await;
            let refreshed_meanwhile = self.generation.load(Ordering::Acquire) != observed_generation;
            if refreshed_meanwhile || !force_refresh {
                if let Some(token) = self.usable(slot.as_ref()) {
                    ldebug!(
                        "token",
                        LogStage::TokenCache,
                        LogComponent::TokenCache,
                        "refresh_joined",
                        "复用并发刷新得到的访问令牌"
                    );
                    return Ok(token);
                }
            }
        }

        linfo!(
            "token",
            LogStage::TokenCache,
            LogComponent::TokenCache,
            "refresh_start",
            if force_refresh {
                "强制刷新访问令牌"
            } else {
                "缓存未命中，获取新访问令牌"
            }
        );

        let token = match self.acquirer.acquire().await {
            Ok(token) => token,
            Err(e) => {
                lerror!(
                    "token",
                    LogStage::TokenCache,
                    LogComponent::TokenCache,
                    "refresh_failed",
                    &format!("获取访问令牌失败: {e}")
                );
                return Err(e);
            }
        };

        {
            let mut slot = self.slot.write().await;
            *slot = Some(token.clone());
            self.generation.fetch_add(1, Ordering::AcqRel);
        }

        linfo!(
            "token",
            LogStage::TokenCache,
            LogComponent::TokenCache,
            "refresh_ok",
            &format!(
                "令牌已更新: {}, 剩余 {} 秒",
                mask_secret(token.value(), 10),
                token.remaining_seconds(Utc::now())
            )
        );
        Ok(token)
    }

    /// 查看当前缓存的令牌，不触发刷新
    pub async fn peek(&self) -> Option<AccessToken> {
        self.slot.read().await.clone()
    }

    /// 清空槽位
    pub async fn invalidate(&self) {
        let _gate = self.refresh_gate.lock().await;
        *self.slot.write().await = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// 刷新缓冲
    #[must_use]
    pub const fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    fn usable(&self, token: Option<&AccessToken>) -> Option<AccessToken> {
        token
            .filter(|token| token.is_usable_at(Utc::now(), self.refresh_buffer))
            .cloned()
    }
}
