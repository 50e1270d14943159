//! # 代理服务器
//!
//! Axum HTTP服务器，对外提供令牌与识别代理接口

mod handlers;
mod response;
mod routes;

pub use handlers::{AVAILABLE_ENDPOINTS, OcrRequest, OcrResponse, TokenResponse};
pub use response::{ApiResponse, ErrorInfo, ErrorResponse};
pub use routes::create_routes;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, ServerConfig};
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage, mask_secret};
use crate::recognition::RecognitionPipeline;
use crate::{linfo, lwarn};

/// 服务器应用状态
#[derive(Clone)]
pub struct AppState {
    /// 识别流水线（含共享令牌缓存）
    pub pipeline: Arc<RecognitionPipeline>,
    /// 运行配置
    pub config: Arc<AppConfig>,
    /// 关闭信号，进行中的重试据此放弃
    pub shutdown: CancellationToken,
}

impl AppState {
    /// 创建状态，关闭信号初始未触发
    #[must_use]
    pub fn new(pipeline: Arc<RecognitionPipeline>, config: Arc<AppConfig>) -> Self {
        Self {
            pipeline,
            config,
            shutdown: CancellationToken::new(),
        }
    }
}

/// 代理服务器
pub struct GatewayServer {
    config: Arc<AppConfig>,
    shutdown: CancellationToken,
    router: Router,
}

impl GatewayServer {
    /// 创建服务器
    #[must_use]
    pub fn new(config: AppConfig, pipeline: Arc<RecognitionPipeline>) -> Self {
        let config = Arc::new(config);
        let state = AppState::new(pipeline, Arc::clone(&config));
        let shutdown = state.shutdown.clone();
        let router = Self::create_router(state, &config.server);

        Self {
            config,
            shutdown,
            router,
        }
    }

    /// 路由器（测试中直接驱动）
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// 关闭信号
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn create_router(state: AppState, config: &ServerConfig) -> Router {
        let app = create_routes(state).layer(DefaultBodyLimit::max(config.max_request_size));
        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        if config.enable_cors {
            app.layer(service_builder.layer(Self::cors_layer(config)))
        } else {
            app.layer(service_builder)
        }
    }

    fn cors_layer(config: &ServerConfig) -> CorsLayer {
        let cors_layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

        if config.cors_origins.iter().any(|origin| origin == "*") {
            return cors_layer.allow_origin(Any);
        }

        let origins = config
            .cors_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<std::result::Result<Vec<_>, _>>();

        match origins {
            Ok(origins) => cors_layer.allow_origin(origins),
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Startup,
                    LogComponent::Server,
                    "cors_config_fail",
                    &format!("CORS 源配置无效: {e}，退回允许任意源")
                );
                cors_layer.allow_origin(Any)
            }
        }
    }

    /// 监听地址
    pub fn bind_address(&self) -> Result<SocketAddr> {
        let bind_address = &self.config.server.bind_address;
        let ip = bind_address.parse::<IpAddr>().map_err(|e| {
            GatewayError::config_with_source(format!("无效的监听地址 '{bind_address}'"), e)
        })?;
        Ok(SocketAddr::new(ip, self.config.server.port))
    }

    /// 启动服务器，Ctrl-C 时优雅退出
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// 启动服务器，`signal` 完成时优雅退出
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_address()?;
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            GatewayError::server_start_with_source(format!("无法监听 {addr}"), e)
        })?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Server,
            "server_start",
            &format!(
                "识别代理已启动: http://{addr} (client_id {})",
                mask_secret(&self.config.provider.client_id, 8)
            )
        );

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                signal.await;
                shutdown.cancel();
            })
            .await
            .map_err(|e| GatewayError::network_with_source("服务器运行错误", e))?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Server,
            "server_stopped",
            "识别代理已停止"
        );
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lwarn!(
            "system",
            LogStage::Shutdown,
            LogComponent::Server,
            "signal_fail",
            &format!("无法监听 Ctrl-C 信号: {e}")
        );
        std::future::pending::<()>().await;
    }
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Server,
        "shutdown_signal",
        "收到关闭信号，停止接受新连接"
    );
}
