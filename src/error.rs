use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// 引擎错误分类
#[derive(Debug, Error)]
pub enum EngineError {
    /// 前置校验失败: 提交被阻断, 本地状态不变
    #[error("校验失败: {0}")]
    Validation(String),

    /// 勾选的费用归属与发票抬头不一致, 拒绝聚合
    #[error("往来单位不一致: 费用属于 \"{found}\", 发票抬头为 \"{expected}\"")]
    CounterpartyMismatch { expected: String, found: String },

    /// 过滤后没有任何可导入的对账行
    #[error("没有可导入的费用")]
    NothingToImport,

    #[error("会话不存在: {0}")]
    SessionNotFound(Uuid),

    /// 协作服务网络层失败
    #[error("上游服务请求失败: {0}")]
    Upstream(#[from] reqwest::Error),

    /// 协作服务非 2xx 应答, 错误体原样透出
    #[error("上游服务返回 {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// 开票服务拒绝, 错误原样透出; 会话状态保留以便重新提交
    #[error("开票提交失败: {0}")]
    Submit(String),

    #[error("CSV 导出失败: {0}")]
    Export(String),
}

impl EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_)
            | EngineError::CounterpartyMismatch { .. }
            | EngineError::NothingToImport => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Upstream(_)
            | EngineError::UpstreamStatus { .. }
            | EngineError::Submit(_) => StatusCode::BAD_GATEWAY,
            EngineError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 稳定的机器可读错误码, 前端据此区分提示方式
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::CounterpartyMismatch { .. } => "counterparty_mismatch",
            EngineError::NothingToImport => "nothing_to_import",
            EngineError::SessionNotFound(_) => "session_not_found",
            EngineError::Upstream(_) | EngineError::UpstreamStatus { .. } => "upstream",
            EngineError::Submit(_) => "submit_failed",
            EngineError::Export(_) => "export_failed",
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "success": false,
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
