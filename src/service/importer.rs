use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::EngineError;
use crate::models::{ChargeRecord, ExternalReconciliationRecord, InvoiceLineItem};
use crate::service::ledger_view::ChargeLedgerView;

/// 一次导入周期的状态: 解析出的对账行只在复核期间存在
#[derive(Debug, Default)]
pub enum ImportState {
    #[default]
    Idle,
    Reviewing {
        records: Vec<ExternalReconciliationRecord>,
        due_date: Option<NaiveDate>,
        external_invoice_numbers: Vec<String>,
    },
}

/// 导入确认的产物
#[derive(Debug)]
pub struct ImportOutcome {
    /// 匹配命中的费用ID (已联动勾选, 成行走统一聚合)
    pub matched_charge_ids: Vec<i64>,
    /// 未匹配的对账行直接成行, 无运单关联, 追加而非替换
    pub standalone_items: Vec<InvoiceLineItem>,
}

/// 费用名称近似匹配: 双向不区分大小写的子串包含
/// "THC" 可命中台账里的 "Terminal Handling Charge (THC)"
fn names_overlap(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

fn keys_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// 对账行与台账记录是否同箱/同运单:
/// 对账行有箱号时只认箱号, 没有箱号时退回运单号
fn location_matches(record: &ExternalReconciliationRecord, charge: &ChargeRecord) -> bool {
    if let Some(rc) = record.container_number.as_deref().filter(|c| !c.trim().is_empty()) {
        return charge
            .container_number
            .as_deref()
            .is_some_and(|cc| keys_equal(rc, cc));
    }
    record
        .shipment_number
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .is_some_and(|rs| keys_equal(rs, &charge.shipment_number))
}

/// 将对账行与当前未开票台账对齐
///
/// 每行取第一个命中的台账记录, 一条台账记录最多被一行占用;
/// 未命中且箱/运单键落在本会话已开票集合里的行, 按已开票处理
/// (启发式: 不在未开票集合 + 曾被本会话消费过 ≈ 已被先前发票消费)
pub fn match_records(
    records: &mut [ExternalReconciliationRecord],
    ledger: &ChargeLedgerView,
    invoiced_keys: &HashSet<String>,
) {
    let mut claimed: HashSet<i64> = HashSet::new();
    let mut matched = 0usize;
    let mut flagged = 0usize;

    for record in records.iter_mut() {
        record.is_matched = false;
        record.matched_charge_id = None;
        record.matched_shipment_id = None;
        record.matched_container_number = None;
        record.already_invoiced = false;

        let hit = ledger.charges().iter().find(|c| {
            !claimed.contains(&c.id)
                && location_matches(record, c)
                && names_overlap(&record.fee_name, &c.fee_name)
        });

        match hit {
            Some(c) => {
                claimed.insert(c.id);
                record.is_matched = true;
                record.matched_charge_id = Some(c.id);
                record.matched_shipment_id = Some(c.shipment_id);
                record.matched_container_number = c.container_number.clone();
                record.selected = true;
                matched += 1;
            }
            None => {
                if let Some(key) = record.container_key() {
                    if invoiced_keys.contains(&key.trim().to_lowercase()) {
                        record.already_invoiced = true;
                        record.selected = false;
                        flagged += 1;
                    }
                }
            }
        }
    }

    tracing::info!(
        "对账匹配完成: {} 行, 命中 {}, 疑似已开票 {}",
        records.len(),
        matched,
        flagged
    );
}

/// 匹配联动: 命中的台账记录自动勾选, 过滤收敛到命中的箱号集合,
/// 复核人看到的正是这次导入将消费的台账行
pub fn auto_select(records: &[ExternalReconciliationRecord], ledger: &mut ChargeLedgerView) {
    let mut keys: Vec<String> = Vec::new();
    for record in records {
        let Some(id) = record.matched_charge_id else {
            continue;
        };
        ledger.select(id);
        if let Some(c) = ledger.charge(id) {
            let key = c.container_key().to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    if !keys.is_empty() {
        ledger.set_filter(keys);
    }
}

/// 导入确认: 只转换勾选且未判定已开票的行
pub fn apply(
    records: &[ExternalReconciliationRecord],
    ledger: &ChargeLedgerView,
) -> Result<ImportOutcome, EngineError> {
    let eligible: Vec<&ExternalReconciliationRecord> =
        records.iter().filter(|r| r.is_eligible()).collect();
    if eligible.is_empty() {
        return Err(EngineError::NothingToImport);
    }

    let mut matched_charge_ids = Vec::new();
    let mut standalone_items = Vec::new();
    for record in eligible {
        match record.matched_charge_id {
            Some(id) if ledger.charge(id).is_some() => matched_charge_ids.push(id),
            Some(id) => {
                // 匹配后台账被并发刷新, 记录已不在: 降级为孤立行
                tracing::warn!("费用 {} 在确认前从台账消失, 按未匹配处理", id);
                standalone_items.push(standalone_item(record));
            }
            None => standalone_items.push(standalone_item(record)),
        }
    }

    Ok(ImportOutcome {
        matched_charge_ids,
        standalone_items,
    })
}

fn standalone_item(record: &ExternalReconciliationRecord) -> InvoiceLineItem {
    let mut item = InvoiceLineItem::manual(
        record.fee_name.clone(),
        1,
        record.amount.clone(),
        record.currency.clone(),
    );
    if !record.remark.is_empty() {
        item.description = format!("{} ({})", record.fee_name, record.remark);
    }
    item
}
