mod posts;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::{
    error::{Error, Result},
    prismic::ContentService,
    state::AppState,
};

/// 设置应用的路由。
///
/// 将 `/api` 下的文章接口组合在一起，并绑定应用状态。
pub fn setup_route<S: ContentService + 'static>(app: AppState<S>) -> Router {
    Router::new()
        .nest("/api", posts::setup_route())
        .with_state(app)
}

/// 启动 HTTP 服务，并使用给定的路由处理请求。
#[instrument(name = "http server", skip(router))]
pub async fn run_server_with_router(router: Router, listen: &str) {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind TCP listener on {listen}: {e}"));

    tracing::info!("listening on {listen}");

    axum::serve(listener, router)
        .await
        .expect("Failed to start Axum server");
}

/// 启动 HTTP 服务，自动设置路由和中间件。
///
/// 1. 生成路由
/// 2. 添加日志和追踪中间件
/// 3. 在配置的地址上启动服务器
pub async fn run_server<S: ContentService + 'static>(app: AppState<S>) {
    let listen = app.config().listen.clone();
    let router = setup_route(app);
    let router = add_middlewares(router);
    run_server_with_router(router, &listen).await
}

/// 为路由添加中间件，包括请求追踪和失败日志记录。
///
/// 日志记录会在请求失败时输出错误信息。
fn add_middlewares(router: Router) -> Router {
    fn log_failure(
        err: tower_http::classify::ServerErrorsFailureClass,
        _latency: std::time::Duration,
        _span: &tracing::Span,
    ) {
        tracing::error!(error = %err, "request failed");
    }

    router.layer(
        TraceLayer::new_for_http()
            .on_failure(log_failure)
            .on_request(|_req: &_, _span: &tracing::Span| {
                // 空实现，关闭请求日志
            }),
    )
}
