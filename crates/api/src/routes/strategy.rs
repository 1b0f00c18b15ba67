//! # 策略管理路由控制器
//!
//! 实现 `/api/strategy` 路径下的 REST 接口：策略与信号源的增删改查，以及运行状态查询。
//! 所有接口都要求有效的会话令牌。

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use hookrelay_manager::strategy::{NewStrategy, SourcePatch, StrategyPatch};

use crate::error::{ApiError, ApiJson};
use crate::server::AppState;
use crate::types::{
    AddSourceRequest, ApiErrorResponse, CreateStrategyRequest, EmptyResponse, IdResponse,
    StrategyResponse, StrategyStateResponse, UpdateSourceRequest, UpdateStrategyRequest,
};

/// 列出全部策略
///
/// 返回以策略 ID 为键的映射。
#[utoipa::path(
    get,
    path = "/api/strategy",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    responses(
        (status = 200, description = "策略列表获取成功", body = BTreeMap<String, StrategyResponse>),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn list_strategies(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, StrategyResponse>> {
    let strategies = state
        .manager
        .list_strategies()
        .await
        .into_iter()
        .map(|s| (s.id.clone(), StrategyResponse::from(s)))
        .collect();
    Json(strategies)
}

/// 获取指定策略的详情
#[utoipa::path(
    get,
    path = "/api/strategy/{sid}",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    params(
        ("sid" = String, Path, description = "策略 ID")
    ),
    responses(
        (status = 200, description = "策略详情获取成功", body = StrategyResponse),
        (status = 404, description = "策略不存在", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn get_strategy(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<StrategyResponse>, ApiError> {
    let strategy = state.manager.get_strategy(&sid).await?;
    Ok(Json(strategy.into()))
}

/// 创建策略
///
/// 同时创建全部空仓的持仓状态与空的投递队列。
/// 交易所统一为小写；标的统一为大写，并在 `USDT` 之后截断。
#[utoipa::path(
    post,
    path = "/api/strategy",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    request_body = CreateStrategyRequest,
    responses(
        (status = 200, description = "策略创建成功，返回策略 ID", body = IdResponse),
        (status = 400, description = "请求参数错误", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn create_strategy(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateStrategyRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let strategy = state
        .manager
        .create_strategy(NewStrategy {
            name: req.name,
            hook_url: req.hook_url,
            exchange: req.exchange,
            symbol: req.symbol,
            sources: req.sources,
        })
        .await?;
    Ok(Json(IdResponse { id: strategy.id }))
}

/// 修改策略名称、下游地址或启用状态
#[utoipa::path(
    post,
    path = "/api/strategy/{sid}/info",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    params(
        ("sid" = String, Path, description = "策略 ID")
    ),
    request_body = UpdateStrategyRequest,
    responses(
        (status = 200, description = "修改成功", body = EmptyResponse),
        (status = 400, description = "请求参数错误", body = ApiErrorResponse),
        (status = 404, description = "策略不存在", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn update_strategy(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    ApiJson(req): ApiJson<UpdateStrategyRequest>,
) -> Result<Json<EmptyResponse>, ApiError> {
    state
        .manager
        .update_strategy(
            &sid,
            StrategyPatch {
                name: req.name,
                hook_url: req.hook_url,
                enabled: req.enabled,
            },
        )
        .await?;
    Ok(Json(EmptyResponse {}))
}

/// 删除策略
///
/// 连同持仓状态、未投递的任务与落盘文档一并删除。
#[utoipa::path(
    delete,
    path = "/api/strategy/{sid}",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    params(
        ("sid" = String, Path, description = "策略 ID")
    ),
    responses(
        (status = 200, description = "删除成功", body = EmptyResponse),
        (status = 404, description = "策略不存在", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn delete_strategy(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<EmptyResponse>, ApiError> {
    state.manager.delete_strategy(&sid).await?;
    Ok(Json(EmptyResponse {}))
}

/// 为策略添加信号源
#[utoipa::path(
    post,
    path = "/api/strategy/{sid}/source",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    params(
        ("sid" = String, Path, description = "策略 ID")
    ),
    request_body = AddSourceRequest,
    responses(
        (status = 200, description = "添加成功，返回信号源 ID", body = IdResponse),
        (status = 404, description = "策略不存在", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn add_source(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    ApiJson(req): ApiJson<AddSourceRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let source = state.manager.add_source(&sid, req.name).await?;
    Ok(Json(IdResponse { id: source.id }))
}

/// 修改信号源名称或启用状态
#[utoipa::path(
    post,
    path = "/api/strategy/{sid}/source/{srcid}/info",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    params(
        ("sid" = String, Path, description = "策略 ID"),
        ("srcid" = String, Path, description = "信号源 ID")
    ),
    request_body = UpdateSourceRequest,
    responses(
        (status = 200, description = "修改成功", body = EmptyResponse),
        (status = 404, description = "策略或信号源不存在", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn update_source(
    State(state): State<AppState>,
    Path((sid, srcid)): Path<(String, String)>,
    ApiJson(req): ApiJson<UpdateSourceRequest>,
) -> Result<Json<EmptyResponse>, ApiError> {
    state
        .manager
        .update_source(
            &sid,
            &srcid,
            SourcePatch {
                name: req.name,
                active: req.active,
            },
        )
        .await?;
    Ok(Json(EmptyResponse {}))
}

/// 删除信号源
///
/// 该信号源持有的仓位先按平仓处理，聚合计数下降时照常通知下游。
#[utoipa::path(
    delete,
    path = "/api/strategy/{sid}/source/{srcid}",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    params(
        ("sid" = String, Path, description = "策略 ID"),
        ("srcid" = String, Path, description = "信号源 ID")
    ),
    responses(
        (status = 200, description = "删除成功", body = EmptyResponse),
        (status = 404, description = "策略或信号源不存在", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn delete_source(
    State(state): State<AppState>,
    Path((sid, srcid)): Path<(String, String)>,
) -> Result<Json<EmptyResponse>, ApiError> {
    state.manager.delete_source(&sid, &srcid).await?;
    Ok(Json(EmptyResponse {}))
}

/// 查询策略运行状态
///
/// 返回每个信号源的持仓标志、多空聚合计数与两个方向上待投递的任务数。
#[utoipa::path(
    get,
    path = "/api/strategy/{sid}/state",
    tag = "策略 (Strategy)",
    security(("bearer_token" = [])),
    params(
        ("sid" = String, Path, description = "策略 ID")
    ),
    responses(
        (status = 200, description = "状态获取成功", body = StrategyStateResponse),
        (status = 404, description = "策略不存在", body = ApiErrorResponse),
        (status = 401, description = "未认证", body = ApiErrorResponse)
    )
)]
pub async fn get_state(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<StrategyStateResponse>, ApiError> {
    let positions = state.manager.get_position_state(&sid).await?;
    let queue = state.manager.pending_deliveries(&sid).await?;
    Ok(Json(StrategyStateResponse::new(positions, &queue)))
}
