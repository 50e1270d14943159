//! # 令牌交换
//!
//! OAuth 2.0 client credentials 交换。凭据按服务商要求放在查询串中。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};

use super::{AccessToken, TokenAcquirer};
use crate::config::ProviderConfig;
use crate::error::{GatewayError, RecognitionError, RecognitionResult};
use crate::logging::{LogComponent, LogStage, mask_secret};
use crate::{ldebug, lwarn};

/// 令牌端点的原始响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenEndpointResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    // 错误响应字段
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenEndpointResponse {
    /// 将响应转换为令牌
    pub fn into_token(self, now: DateTime<Utc>) -> RecognitionResult<AccessToken> {
        if let Some(error) = self.error {
            let message = match self.error_description {
                Some(description) if !description.is_empty() => format!("{error}: {description}"),
                _ => error,
            };
            return Err(RecognitionError::CredentialExchangeFailed(message));
        }

        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RecognitionError::CredentialExchangeFailed("missing token".to_string()))?;

        let expires_in = self.expires_in.ok_or_else(|| {
            RecognitionError::CredentialExchangeFailed("missing expires_in".to_string())
        })?;

        AccessToken::from_expires_in(access_token, expires_in, now).ok_or_else(|| {
            RecognitionError::CredentialExchangeFailed("invalid expires_in".to_string())
        })
    }
}

/// client credentials 令牌获取器
#[derive(Clone)]
pub struct ClientCredentialsAcquirer {
    http_client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for ClientCredentialsAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsAcquirer")
            .field("token_url", &self.token_url)
            .field("client_id", &mask_secret(&self.client_id, 8))
            .finish_non_exhaustive()
    }
}

impl ClientCredentialsAcquirer {
    /// 根据服务商配置创建获取器
    pub fn from_config(config: &ProviderConfig) -> crate::error::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.token_timeout())
            .user_agent(concat!("ocr-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::config_with_source("创建令牌HTTP客户端失败", e))?;

        Ok(Self {
            http_client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn transport_error(err: &reqwest::Error) -> RecognitionError {
        if err.is_timeout() {
            RecognitionError::CredentialExchangeFailed("令牌请求超时".to_string())
        } else {
            RecognitionError::CredentialExchangeFailed(format!("令牌请求失败: {err}"))
        }
    }
}

#[async_trait]
impl TokenAcquirer for ClientCredentialsAcquirer {
    async fn acquire(&self) -> RecognitionResult<AccessToken> {
        ldebug!(
            "token",
            LogStage::TokenExchange,
            LogComponent::TokenAcquirer,
            "exchange_start",
            &format!(
                "请求访问令牌: {} (client_id {})",
                self.token_url,
                mask_secret(&self.client_id, 8)
            )
        );

        let response = self
            .http_client
            .post(&self.token_url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let parsed: TokenEndpointResponse = serde_json::from_str(&body).map_err(|e| {
            lwarn!(
                "token",
                LogStage::TokenExchange,
                LogComponent::TokenAcquirer,
                "exchange_bad_body",
                &format!("令牌响应无法解析: HTTP {status}, {e}")
            );
            RecognitionError::CredentialExchangeFailed(format!(
                "HTTP {status}: 无法解析令牌响应"
            ))
        })?;

        if parsed.error.is_none() && !status.is_success() {
            return Err(RecognitionError::CredentialExchangeFailed(format!(
                "HTTP {status}"
            )));
        }

        parsed.into_token(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_config(server: &MockServer) -> ProviderConfig {
        ProviderConfig {
            client_id: "test-id".to_string(),
            client_secret: "test-secret".to_string(),
            token_url: format!("{}/oauth/2.0/token", server.uri()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_error_field_wins() {
        let response = TokenEndpointResponse {
            access_token: Some("ignored".to_string()),
            expires_in: Some(100),
            error: Some("invalid_client".to_string()),
            error_description: Some("unknown client id".to_string()),
        };

        assert_eq!(
            response.into_token(Utc::now()).unwrap_err(),
            RecognitionError::CredentialExchangeFailed(
                "invalid_client: unknown client id".to_string()
            )
        );
    }

    #[test]
    fn test_missing_token() {
        let response = TokenEndpointResponse {
            access_token: Some(String::new()),
            expires_in: Some(100),
            ..TokenEndpointResponse::default()
        };

        assert_eq!(
            response.into_token(Utc::now()).unwrap_err(),
            RecognitionError::CredentialExchangeFailed("missing token".to_string())
        );
    }

    #[test]
    fn test_missing_expiry() {
        let response = TokenEndpointResponse {
            access_token: Some("24.abc".to_string()),
            ..TokenEndpointResponse::default()
        };

        assert_eq!(
            response.into_token(Utc::now()).unwrap_err(),
            RecognitionError::CredentialExchangeFailed("missing expires_in".to_string())
        );
    }

    #[rstest::rstest]
    #[case(-1)]
    #[case(9_000_000_000_000_000)]
    #[case(i64::MAX)]
    fn test_out_of_range_expiry(#[case] expires_in: i64) {
        let response = TokenEndpointResponse {
            access_token: Some("24.abc".to_string()),
            expires_in: Some(expires_in),
            ..TokenEndpointResponse::default()
        };

        assert_eq!(
            response.into_token(Utc::now()).unwrap_err(),
            RecognitionError::CredentialExchangeFailed("invalid expires_in".to_string())
        );
    }

    #[tokio::test]
    async fn test_acquire_rejects_huge_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "24.x",
                "expires_in": 9_000_000_000_000_000_i64
            })))
            .mount(&server)
            .await;

        let acquirer = ClientCredentialsAcquirer::from_config(&provider_config(&server)).unwrap();
        let err = acquirer.acquire().await.unwrap_err();

        assert_eq!(
            err,
            RecognitionError::CredentialExchangeFailed("invalid expires_in".to_string())
        );
    }

    #[test]
    fn test_expiry_is_relative_to_now() {
        let now = Utc::now();
        let response = TokenEndpointResponse {
            access_token: Some("24.abc".to_string()),
            expires_in: Some(2_592_000),
            ..TokenEndpointResponse::default()
        };

        let token = response.into_token(now).unwrap();
        assert_eq!(token.value(), "24.abc");
        assert_eq!(token.expires_at(), now + chrono::Duration::seconds(2_592_000));
    }

    #[tokio::test]
    async fn test_acquire_sends_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/2.0/token"))
            .and(query_param("grant_type", "client_credentials"))
            .and(query_param("client_id", "test-id"))
            .and(query_param("client_secret", "test-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "24.fresh",
                "expires_in": 2_592_000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let acquirer = ClientCredentialsAcquirer::from_config(&provider_config(&server)).unwrap();
        let token = acquirer.acquire().await.unwrap();

        assert_eq!(token.value(), "24.fresh");
        assert!(token.remaining_seconds(Utc::now()) > 2_591_000);
    }

    #[tokio::test]
    async fn test_acquire_maps_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed"
            })))
            .mount(&server)
            .await;

        let acquirer = ClientCredentialsAcquirer::from_config(&provider_config(&server)).unwrap();
        let err = acquirer.acquire().await.unwrap_err();

        assert_eq!(
            err,
            RecognitionError::CredentialExchangeFailed(
                "invalid_client: Client authentication failed".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_acquire_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let acquirer = ClientCredentialsAcquirer::from_config(&provider_config(&server)).unwrap();
        let err = acquirer.acquire().await.unwrap_err();

        assert!(matches!(err, RecognitionError::CredentialExchangeFailed(ref m) if m.contains("502")));
    }

    #[tokio::test]
    async fn test_acquire_unreachable_endpoint() {
        let config = ProviderConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_url: "http://127.0.0.1:9/oauth/2.0/token".to_string(),
            ..ProviderConfig::default()
        };

        let acquirer = ClientCredentialsAcquirer::from_config(&config).unwrap();
        let err = acquirer.acquire().await.unwrap_err();

        assert!(matches!(err, RecognitionError::CredentialExchangeFailed(_)));
    }
}
