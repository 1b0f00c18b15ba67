//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 持有并调用。

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use hookrelay_core::common::time::TimeProvider;
use hookrelay_core::config::AuthConfig;
use hookrelay_manager::strategy::StrategyManager;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::attach_scope;
use crate::middleware::auth::auth_middleware;
use crate::routes::{auth, hook, strategy};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 所有字段在服务启动前由 `crates/app` 注入，生命周期与进程等同。
#[derive(Clone)]
pub struct AppState {
    /// 策略管理器 (Facade)
    pub manager: Arc<StrategyManager>,
    /// 会话令牌密钥与管理员账户
    pub auth: Arc<AuthConfig>,
    /// 判定令牌过期与签发时间使用的时钟
    pub clock: Arc<dyn TimeProvider>,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "HookRelay 信号中继 API",
        version = "0.1.0",
        description = "接收多个信号源上报的持仓意图，按策略聚合后以有序、至少一次的方式推送给下游 Webhook。",
        license(name = "MIT")
    ),
    tags(
        (name = "信号 (Hook)", description = "信号源上报入口"),
        (name = "鉴权 (Auth)", description = "会话查询、登录与令牌续期"),
        (name = "策略 (Strategy)", description = "策略与信号源的管理及运行状态查询")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// 为 OpenAPI 文档注入全局 Bearer 鉴权方案。
///
/// 注册后，Swagger UI 页面顶部将显示 Authorize 按钮，
/// 填入登录接口返回的令牌即可调试标记了 `security` 的接口。
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "bearer_token",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some(
                        "在此处填入登录接口返回的会话令牌（无需 'Bearer ' 前缀）",
                    ))
                    .build(),
            ),
        );
    }
}

// ============================================================
//  服务构建与启动
// ============================================================

/// # Summary
/// 构建完整的 axum 应用路由树 (含 Swagger UI)。
///
/// # Logic
/// 1. 公开路由：信号上报与登录。
/// 2. 受保护路由：策略管理，统一经过 `auth_middleware`。
/// 3. 业务路由统一挂 `attach_scope`，再合并 Swagger UI、请求追踪与 CORS。
pub fn build_router(state: AppState) -> Router {
    let public_router = OpenApiRouter::new()
        .routes(routes!(hook::receive_signal))
        .routes(routes!(auth::session_info, auth::login, auth::refresh_token));

    let protected_router = OpenApiRouter::new()
        .routes(routes!(strategy::list_strategies, strategy::create_strategy))
        .routes(routes!(strategy::get_strategy, strategy::delete_strategy))
        .routes(routes!(strategy::update_strategy))
        .routes(routes!(strategy::add_source))
        .routes(routes!(strategy::update_source))
        .routes(routes!(strategy::delete_source))
        .routes(routes!(strategy::get_state))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(public_router)
        .merge(protected_router)
        .with_state(state)
        .split_for_parts();

    // 管理端与信号源来自任意来源
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .route_layer(axum::middleware::from_fn(attach_scope))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// # Summary
/// 绑定端口并对外提供服务，直到 `shutdown` 完成后优雅退出。
///
/// # Arguments
/// * `state` - 共享状态。
/// * `bind_addr` - 监听的地址与端口，如 `"127.0.0.1:2280"`。
/// * `shutdown` - 完成时停止接收新连接，并等待已有请求处理完毕。
///
/// # Returns
/// * `std::io::Result<()>` - 绑定失败或服务异常退出时返回错误。
pub async fn start_server<F>(state: AppState, bind_addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!(addr = %bind_addr, "api server listening");
    tracing::info!("swagger ui: http://{}/swagger-ui/", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
