//! # 路由配置

use axum::Router;
use axum::routing::{get, post};

use super::AppState;
use super::handlers;

/// 创建所有路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .nest("/api", api_routes())
        .fallback(handlers::not_found_handler)
        .with_state(state)
}

/// `/api` 下的接口
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/test", get(handlers::test_handler))
        .route("/token", post(handlers::token_handler))
        .route("/ocr", post(handlers::ocr_handler))
}
