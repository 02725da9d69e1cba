use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bigdecimal::{BigDecimal, One};
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clients::{DocumentParser, InvoicePayload, InvoicingService, LedgerService};
use crate::error::EngineError;
use crate::models::{
    ChargeRecord, Direction, ExternalReconciliationRecord, InvoiceDocument, InvoiceLineItem,
    LineItemEdit,
};
use crate::service::{ComposerSession, SessionSetup};

/// 共享状态: 会话注册表 + 三个协作服务
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<DashMap<Uuid, ComposerSession>>,
    pub ledger: Arc<dyn LedgerService>,
    pub parser: Arc<dyn DocumentParser>,
    pub invoicing: Arc<dyn InvoicingService>,
    pub ledger_window: usize,
}

/// 会话锁内的同步操作; 网络调用一律放在锁外
/// (dashmap 的引用跨 await 既不安全也不 Send)
fn with_session<T>(
    state: &AppState,
    id: Uuid,
    f: impl FnOnce(&mut ComposerSession) -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut entry = state
        .sessions
        .get_mut(&id)
        .ok_or(EngineError::SessionNotFound(id))?;
    f(entry.value_mut())
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

// ---- 会话 ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub direction: Direction,
    pub counterparty_id: Option<i64>,
    pub counterparty_name: Option<String>,
    pub doc_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub exchange_rate: Option<BigDecimal>,
    pub language: Option<String>,
    pub template_id: Option<String>,
    /// 传入既有发票ID即进入编辑模式 (提交走整体替换)
    pub invoice_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, EngineError> {
    let setup = SessionSetup {
        doc_type: req.doc_type.unwrap_or_else(|| "invoice".to_string()),
        date: req.date.unwrap_or_else(|| chrono::Local::now().date_naive()),
        due_date: req.due_date,
        counterparty_id: req.counterparty_id,
        counterparty_name: req.counterparty_name.unwrap_or_default(),
        direction: req.direction,
        currency: req.currency.unwrap_or_else(|| "CNY".to_string()),
        exchange_rate: req.exchange_rate.unwrap_or_else(BigDecimal::one),
        language: req.language.unwrap_or_else(|| "zh-CN".to_string()),
        template_id: req.template_id,
        invoice_id: req.invoice_id,
    };
    let session = ComposerSession::new(setup, state.ledger_window);
    let id = session.id;
    state.sessions.insert(id, session);
    tracing::info!("创建开票会话 {}", id);
    Ok(Json(CreateSessionResponse { session_id: id }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCounterpartyRequest {
    pub counterparty_id: i64,
    pub counterparty_name: String,
}

pub async fn set_counterparty(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetCounterpartyRequest>,
) -> Result<StatusCode, EngineError> {
    with_session(&state, id, |s| {
        s.set_counterparty(req.counterparty_id, req.counterparty_name);
        Ok(())
    })?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- 台账 ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    #[serde(flatten)]
    pub charge: ChargeRecord,
    pub selected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    /// false = 结果因会话切换而被丢弃 (过期加载)
    pub applied: bool,
    pub total: usize,
    pub selected_count: usize,
    pub keywords: Vec<String>,
    pub rows: Vec<LedgerRow>,
}

fn snapshot(session: &ComposerSession, applied: bool) -> LedgerSnapshot {
    let ledger = session.ledger();
    LedgerSnapshot {
        applied,
        total: ledger.charges().len(),
        selected_count: ledger.selected_count(),
        keywords: ledger.filter_keywords().to_vec(),
        rows: ledger
            .visible()
            .into_iter()
            .map(|c| LedgerRow {
                selected: ledger.is_selected(c.id),
                charge: c.clone(),
            })
            .collect(),
    }
}

/// 重新拉取未开票费用; 永远发起新请求, 绝不复用本地缓存
pub async fn load_ledger(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerSnapshot>, EngineError> {
    let (token, counterparty_id, direction) =
        with_session(&state, id, |s| s.begin_ledger_load())?;

    let records = state.ledger.list_open_charges(counterparty_id, direction).await?;

    with_session(&state, id, |s| {
        let applied = s.apply_ledger_loaded(token, records);
        Ok(Json(snapshot(s, applied)))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleChargeRequest {
    pub charge_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub selected: bool,
    pub selected_count: usize,
}

pub async fn toggle_charge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleChargeRequest>,
) -> Result<Json<ToggleResponse>, EngineError> {
    with_session(&state, id, |s| {
        let selected = s.toggle_charge(req.charge_id)?;
        Ok(Json(ToggleResponse {
            selected,
            selected_count: s.ledger().selected_count(),
        }))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleContainerRequest {
    pub container_key: String,
}

pub async fn toggle_container(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleContainerRequest>,
) -> Result<Json<ToggleResponse>, EngineError> {
    with_session(&state, id, |s| {
        let selected = s.toggle_container(&req.container_key)?;
        Ok(Json(ToggleResponse {
            selected,
            selected_count: s.ledger().selected_count(),
        }))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRequest {
    pub keywords: Vec<String>,
}

pub async fn set_filter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FilterRequest>,
) -> Result<Json<LedgerSnapshot>, EngineError> {
    with_session(&state, id, |s| {
        s.set_filter(req.keywords)?;
        Ok(Json(snapshot(s, true)))
    })
}

// ---- 对账导入 ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseImportRequest {
    pub file_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReview {
    pub records: Vec<ExternalReconciliationRecord>,
    pub extracted_due_date: Option<NaiveDate>,
    pub external_invoice_numbers: Vec<String>,
    pub ledger: LedgerSnapshot,
}

/// 上传文件已由外部完成; 这里凭令牌取解析结果并与台账对齐
pub async fn parse_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ParseImportRequest>,
) -> Result<Json<ImportReview>, EngineError> {
    let parsed = state.parser.parse(&req.file_token).await?;

    with_session(&state, id, |s| {
        let records = s.start_import(parsed)?.to_vec();
        Ok(Json(ImportReview {
            records,
            extracted_due_date: s.import_due_date(),
            external_invoice_numbers: s.import_external_numbers().to_vec(),
            ledger: snapshot(s, true),
        }))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleImportRequest {
    pub index: usize,
}

pub async fn toggle_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleImportRequest>,
) -> Result<Json<ToggleResponse>, EngineError> {
    with_session(&state, id, |s| {
        let selected = s.toggle_import(req.index)?;
        Ok(Json(ToggleResponse {
            selected,
            selected_count: s.ledger().selected_count(),
        }))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyImportRequest {
    #[serde(default)]
    pub merge_by_name: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsResponse {
    pub items: Vec<InvoiceLineItem>,
}

pub async fn apply_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApplyImportRequest>,
) -> Result<Json<ItemsResponse>, EngineError> {
    with_session(&state, id, |s| {
        let added = s.apply_import(req.merge_by_name)?;
        tracing::info!("会话 {} 导入确认, 追加孤立行 {} 条", id, added);
        Ok(Json(ItemsResponse { items: s.items() }))
    })
}

pub async fn cancel_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, EngineError> {
    with_session(&state, id, |s| {
        s.cancel_import();
        Ok(())
    })?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- 明细 ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualItemRequest {
    pub description: String,
    #[serde(default = "one_qty")]
    pub quantity: u32,
    pub unit_price: BigDecimal,
    pub currency: Option<String>,
}

fn one_qty() -> u32 {
    1
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ManualItemRequest>,
) -> Result<Json<ItemsResponse>, EngineError> {
    with_session(&state, id, |s| {
        s.add_manual_item(req.description, req.quantity, req.unit_price, req.currency)?;
        Ok(Json(ItemsResponse { items: s.items() }))
    })
}

pub async fn edit_item(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(edit): Json<LineItemEdit>,
) -> Result<Json<ItemsResponse>, EngineError> {
    with_session(&state, id, |s| {
        s.edit_item(index, edit)?;
        Ok(Json(ItemsResponse { items: s.items() }))
    })
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<ItemsResponse>, EngineError> {
    with_session(&state, id, |s| {
        s.remove_item(index)?;
        Ok(Json(ItemsResponse { items: s.items() }))
    })
}

// ---- 组装与提交 ----

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComposeRequest {
    /// Some = 先按当前勾选重建聚合行
    pub merge_by_name: Option<bool>,
}

pub async fn compose(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ComposeRequest>,
) -> Result<Json<InvoiceDocument>, EngineError> {
    with_session(&state, id, |s| {
        if let Some(merge) = req.merge_by_name {
            s.aggregate_selection(merge)?;
        }
        Ok(Json(s.compose()?))
    })
}

/// 明细行 CSV 导出 (财务对账用)
pub async fn export_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, EngineError> {
    let csv = with_session(&state, id, |s| s.compose()?.export_items_csv())?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        csv,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub invoice_id: i64,
}

/// 提交整张发票
/// 校验在锁内完成, 网络调用在锁外; 失败时会话原样保留可直接重交
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmitResponse>, EngineError> {
    let (payload, document, existing) = with_session(&state, id, |s| {
        let document = s.compose()?;
        s.validate_for_submit(&document)?;
        Ok((InvoicePayload::from_document(&document), document, s.invoice_id()))
    })?;

    let invoice_id = match existing {
        Some(iid) => state.invoicing.update(iid, &payload).await?,
        None => state.invoicing.create(&payload).await?,
    };

    with_session(&state, id, |s| {
        s.on_submitted(invoice_id, &document);
        Ok(())
    })?;
    Ok(Json(SubmitResponse {
        success: true,
        invoice_id,
    }))
}
