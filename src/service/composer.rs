use std::collections::HashSet;

use bigdecimal::{BigDecimal, One, Zero};
use chrono::NaiveDate;
use indexmap::IndexSet;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    ChargeRecord, Direction, InvoiceDocument, InvoiceLineItem, LineItemEdit, ParsedStatement,
};
use crate::service::importer::{self, ImportState};
use crate::service::ledger_view::{ChargeLedgerView, LedgerGeneration};
use crate::service::{aggregation, calculator};

/// 开票会话的初始参数
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub doc_type: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub counterparty_id: Option<i64>,
    pub counterparty_name: String,
    pub direction: Direction,
    pub currency: String,
    pub exchange_rate: BigDecimal,
    pub language: String,
    pub template_id: Option<String>,
    /// Some = 编辑既有发票, 提交走整体替换
    pub invoice_id: Option<i64>,
}

/// 开票会话: 台账勾选 + 对账导入 + 明细组装的唯一事实来源
///
/// 勾选状态只存在于台账视图一份, 导入复核是它上面的一层视角;
/// 聚合行由勾选即时再生, 手工行/孤立行单独追加
#[derive(Debug)]
pub struct ComposerSession {
    pub id: Uuid,
    setup: SessionSetup,
    ledger: ChargeLedgerView,
    import: ImportState,
    /// 由勾选聚合产生的行, aggregate_selection 整体重建
    derived_items: Vec<InvoiceLineItem>,
    /// 手工录入行 + 导入未匹配的孤立行
    extra_items: Vec<InvoiceLineItem>,
    /// 本会话提交成功消费过的箱/运单键 (小写), 导入时用于已开票判定
    invoiced_container_keys: HashSet<String>,
    /// 提交成功后置位: 勾选/聚合被阻断, 直到重新加载台账
    ledger_stale: bool,
}

impl ComposerSession {
    pub fn new(setup: SessionSetup, display_window: usize) -> Self {
        let ledger = ChargeLedgerView::new(
            setup.counterparty_id.unwrap_or_default(),
            setup.direction,
            display_window,
        );
        Self {
            id: Uuid::new_v4(),
            setup,
            ledger,
            import: ImportState::Idle,
            derived_items: Vec::new(),
            extra_items: Vec::new(),
            invoiced_container_keys: HashSet::new(),
            ledger_stale: false,
        }
    }

    pub fn ledger(&self) -> &ChargeLedgerView {
        &self.ledger
    }

    pub fn invoice_id(&self) -> Option<i64> {
        self.setup.invoice_id
    }

    pub fn direction(&self) -> Direction {
        self.setup.direction
    }

    fn counterparty(&self) -> Result<(i64, &str), EngineError> {
        match self.setup.counterparty_id {
            Some(id) if !self.setup.counterparty_name.trim().is_empty() => {
                Ok((id, self.setup.counterparty_name.as_str()))
            }
            _ => Err(EngineError::Validation("请先选择往来单位".to_string())),
        }
    }

    /// 提交成功后台账即失效, 重新加载前不允许继续勾选/聚合
    fn ensure_fresh(&self) -> Result<(), EngineError> {
        if self.ledger_stale {
            return Err(EngineError::Validation(
                "发票已提交, 请重新加载费用台账".to_string(),
            ));
        }
        Ok(())
    }

    /// 切换往来单位 (清台账/勾选, 在途加载全部过期)
    pub fn set_counterparty(&mut self, id: i64, name: String) {
        self.setup.counterparty_id = Some(id);
        self.setup.counterparty_name = name;
        self.ledger.retarget(id, self.setup.direction);
        self.derived_items.clear();
        self.import = ImportState::Idle;
        self.ledger_stale = false;
    }

    // ---- 台账 ----

    /// 发起台账加载; 返回调用协作方所需的参数与本次代号
    pub fn begin_ledger_load(&mut self) -> Result<(LedgerGeneration, i64, Direction), EngineError> {
        let (id, _) = self.counterparty()?;
        let token = self.ledger.begin_load();
        Ok((token, id, self.setup.direction))
    }

    /// 应用加载结果 (代号过期返回 false); 成功即解除失效标记
    pub fn apply_ledger_loaded(&mut self, token: LedgerGeneration, records: Vec<ChargeRecord>) -> bool {
        let applied = self.ledger.apply_loaded(token, records);
        if applied {
            self.ledger_stale = false;
        }
        applied
    }

    pub fn toggle_charge(&mut self, charge_id: i64) -> Result<bool, EngineError> {
        self.ensure_fresh()?;
        self.ledger.toggle(charge_id)
    }

    pub fn toggle_container(&mut self, container_key: &str) -> Result<bool, EngineError> {
        self.ensure_fresh()?;
        self.ledger.toggle_by_container(container_key)
    }

    pub fn set_filter(&mut self, keywords: Vec<String>) -> Result<(), EngineError> {
        self.ensure_fresh()?;
        self.ledger.set_filter(keywords);
        Ok(())
    }

    // ---- 导入 ----

    /// 解析结果进入复核: 与台账对齐并联动勾选
    pub fn start_import(&mut self, parsed: ParsedStatement) -> Result<&[crate::models::ExternalReconciliationRecord], EngineError> {
        self.ensure_fresh()?;
        if !self.ledger.is_loaded() {
            return Err(EngineError::Validation(
                "请先加载费用台账再导入对账单".to_string(),
            ));
        }
        let mut records = parsed.items;
        importer::match_records(&mut records, &self.ledger, &self.invoiced_container_keys);
        importer::auto_select(&records, &mut self.ledger);
        self.import = ImportState::Reviewing {
            records,
            due_date: parsed.due_date,
            external_invoice_numbers: parsed.external_invoice_numbers,
        };
        match &self.import {
            ImportState::Reviewing { records, .. } => Ok(records),
            ImportState::Idle => unreachable!(),
        }
    }

    pub fn import_records(&self) -> Option<&[crate::models::ExternalReconciliationRecord]> {
        match &self.import {
            ImportState::Reviewing { records, .. } => Some(records),
            ImportState::Idle => None,
        }
    }

    /// 解析出的到期日提示 (复核界面展示用)
    pub fn import_due_date(&self) -> Option<NaiveDate> {
        match &self.import {
            ImportState::Reviewing { due_date, .. } => *due_date,
            ImportState::Idle => None,
        }
    }

    /// 对账单上识别出的外部发票号
    pub fn import_external_numbers(&self) -> &[String] {
        match &self.import {
            ImportState::Reviewing {
                external_invoice_numbers,
                ..
            } => external_invoice_numbers,
            ImportState::Idle => &[],
        }
    }

    /// 复核中翻转一行勾选, 命中行同步翻转其台账勾选; 已开票行不可重新勾选
    pub fn toggle_import(&mut self, index: usize) -> Result<bool, EngineError> {
        self.ensure_fresh()?;
        let ImportState::Reviewing { records, .. } = &mut self.import else {
            return Err(EngineError::Validation("当前没有进行中的导入".to_string()));
        };
        let record = records.get_mut(index).ok_or_else(|| {
            EngineError::Validation(format!("对账行 {} 不存在", index))
        })?;
        if record.already_invoiced {
            return Err(EngineError::Validation(
                "该费用疑似已被先前的发票消费, 不能再次勾选".to_string(),
            ));
        }
        record.selected = !record.selected;
        // 勾选只有台账一份: 复核里的翻转立即落回台账
        if let Some(id) = record.matched_charge_id {
            if record.selected {
                self.ledger.select(id);
            } else {
                self.ledger.deselect(id);
            }
        }
        Ok(record.selected)
    }

    /// 导入确认: 命中行并入勾选走统一聚合, 孤立行追加;
    /// 失败时复核状态保留 (导入对话框不关闭)
    pub fn apply_import(&mut self, merge_by_name: bool) -> Result<usize, EngineError> {
        self.ensure_fresh()?;
        let ImportState::Reviewing { records, .. } = &self.import else {
            return Err(EngineError::Validation("当前没有进行中的导入".to_string()));
        };
        let outcome = importer::apply(records, &self.ledger)?;
        // 命中但未进入本次确认的行, 其费用同步取消勾选; 勾选与复核不允许分叉
        let dropped: Vec<i64> = records
            .iter()
            .filter(|r| !r.is_eligible())
            .filter_map(|r| r.matched_charge_id)
            .collect();
        for id in dropped {
            self.ledger.deselect(id);
        }
        for id in &outcome.matched_charge_ids {
            self.ledger.select(*id);
        }
        self.aggregate_selection(merge_by_name)?;
        if self.setup.due_date.is_none() {
            if let ImportState::Reviewing { due_date: Some(d), .. } = &self.import {
                self.setup.due_date = Some(*d);
            }
        }
        let added = outcome.standalone_items.len();
        self.extra_items.extend(outcome.standalone_items);
        self.import = ImportState::Idle;
        Ok(added)
    }

    pub fn cancel_import(&mut self) {
        self.import = ImportState::Idle;
    }

    // ---- 明细 ----

    /// 按当前勾选整体重建聚合行
    pub fn aggregate_selection(&mut self, merge_by_name: bool) -> Result<(), EngineError> {
        self.ensure_fresh()?;
        let (id, name) = self.counterparty()?;
        let selected = self.ledger.selected_records();
        self.derived_items = aggregation::aggregate(&selected, id, name, merge_by_name)?;
        Ok(())
    }

    pub fn add_manual_item(
        &mut self,
        description: String,
        quantity: u32,
        unit_price: BigDecimal,
        currency: Option<String>,
    ) -> Result<(), EngineError> {
        if description.trim().is_empty() {
            return Err(EngineError::Validation("明细摘要不能为空".to_string()));
        }
        let currency = currency.unwrap_or_else(|| self.setup.currency.clone());
        let mut item = InvoiceLineItem::manual(description, quantity, unit_price, currency);
        calculator::recompute_line(&mut item);
        self.extra_items.push(item);
        Ok(())
    }

    /// 编辑明细 (索引覆盖 聚合行+追加行 的拼接顺序)
    pub fn edit_item(&mut self, index: usize, edit: LineItemEdit) -> Result<(), EngineError> {
        let derived_len = self.derived_items.len();
        let item = if index < derived_len {
            &mut self.derived_items[index]
        } else {
            self.extra_items
                .get_mut(index - derived_len)
                .ok_or_else(|| EngineError::Validation(format!("明细行 {} 不存在", index)))?
        };
        item.apply_edit(edit)?;
        calculator::recompute_line(item);
        Ok(())
    }

    /// 删除明细; 聚合行被删时同步取消其来源费用的勾选
    pub fn remove_item(&mut self, index: usize) -> Result<(), EngineError> {
        let derived_len = self.derived_items.len();
        if index < derived_len {
            let item = self.derived_items.remove(index);
            for id in &item.source_charge_ids {
                self.ledger.deselect(*id);
            }
            Ok(())
        } else if index - derived_len < self.extra_items.len() {
            self.extra_items.remove(index - derived_len);
            Ok(())
        } else {
            Err(EngineError::Validation(format!("明细行 {} 不存在", index)))
        }
    }

    pub fn items(&self) -> Vec<InvoiceLineItem> {
        let mut items = self.derived_items.clone();
        items.extend(self.extra_items.iter().cloned());
        items
    }

    // ---- 组装与提交 ----

    /// 组装整张单据 (不做提交校验, 预览也走这里)
    pub fn compose(&self) -> Result<InvoiceDocument, EngineError> {
        let (counterparty_id, counterparty_name) = self.counterparty()?;
        let items = self.items();

        let mut shipment_ids: IndexSet<i64> = IndexSet::new();
        let mut shipment_numbers: IndexSet<String> = IndexSet::new();
        let mut container_numbers: IndexSet<String> = IndexSet::new();
        let mut covered_charge_ids: IndexSet<i64> = IndexSet::new();
        for item in &items {
            shipment_ids.extend(item.source_shipment_ids.iter().copied());
            shipment_numbers.extend(item.source_shipment_numbers.iter().cloned());
            container_numbers.extend(item.source_container_numbers.iter().cloned());
            covered_charge_ids.extend(item.source_charge_ids.iter().copied());
        }

        // 勾选了但没有成行的费用, 开票成功后同样要核销
        let additional_charge_ids: Vec<i64> = self
            .ledger
            .selected_ids()
            .into_iter()
            .filter(|id| !covered_charge_ids.contains(id))
            .collect();

        let totals = calculator::compute_totals(&items);
        Ok(InvoiceDocument {
            doc_type: self.setup.doc_type.clone(),
            date: self.setup.date,
            due_date: self.setup.due_date,
            counterparty_id,
            counterparty_name: counterparty_name.to_string(),
            shipment_ids: shipment_ids.into_iter().collect(),
            shipment_numbers: shipment_numbers.into_iter().collect(),
            container_numbers: container_numbers.into_iter().collect(),
            currency: self.setup.currency.clone(),
            exchange_rate: self.setup.exchange_rate.clone(),
            language: self.setup.language.clone(),
            template_id: self.setup.template_id.clone(),
            items,
            additional_charge_ids,
            totals,
        })
    }

    /// 提交前置校验; 不通过则不产生任何状态变化
    pub fn validate_for_submit(&self, document: &InvoiceDocument) -> Result<(), EngineError> {
        if document.items.is_empty() {
            return Err(EngineError::Validation("发票至少需要一条明细".to_string()));
        }
        if let Some(pos) = document.items.iter().position(|i| i.description.trim().is_empty()) {
            return Err(EngineError::Validation(format!("第 {} 行明细摘要为空", pos + 1)));
        }
        if document.totals.total_amount <= BigDecimal::zero() {
            return Err(EngineError::Validation("价税合计必须大于零".to_string()));
        }
        if self.setup.direction == Direction::Receivable && document.shipment_ids.is_empty() {
            return Err(EngineError::Validation(
                "应收发票必须关联至少一个运单".to_string(),
            ));
        }
        Ok(())
    }

    /// 提交成功的善后:
    /// 记录消费过的箱/运单键, 标记台账失效 (开票与核销是两个外部操作,
    /// 本地绝不自行标记费用为已开票, 以重新拉取台账为准)
    pub fn on_submitted(&mut self, invoice_id: i64, document: &InvoiceDocument) {
        self.setup.invoice_id = Some(invoice_id);
        for item in &document.items {
            for cn in &item.source_container_numbers {
                self.invoiced_container_keys.insert(cn.trim().to_lowercase());
            }
            for sn in &item.source_shipment_numbers {
                self.invoiced_container_keys.insert(sn.trim().to_lowercase());
            }
        }
        self.ledger_stale = true;
        tracing::info!(
            "发票 {} 提交成功, 消费费用 {} 笔, 台账待重新加载",
            invoice_id,
            document
                .items
                .iter()
                .map(|i| i.source_charge_ids.len())
                .sum::<usize>()
                + document.additional_charge_ids.len()
        );
    }
}

impl Default for SessionSetup {
    fn default() -> Self {
        Self {
            doc_type: "invoice".to_string(),
            date: chrono::Local::now().date_naive(),
            due_date: None,
            counterparty_id: None,
            counterparty_name: String::new(),
            direction: Direction::Receivable,
            currency: "CNY".to_string(),
            exchange_rate: BigDecimal::one(),
            language: "zh-CN".to_string(),
            template_id: None,
            invoice_id: None,
        }
    }
}
