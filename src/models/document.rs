use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::InvoiceLineItem;
use crate::error::EngineError;

/// 单据合计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTotals {
    pub subtotal: BigDecimal,
    pub tax_amount: BigDecimal,
    /// 各行实际折扣之和 (固定折扣 + 百分比折扣), 负值表示附加费
    pub discount_amount: BigDecimal,
    pub total_amount: BigDecimal,
}

/// 组装完成的发票单据, 整体提交给外部开票服务
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDocument {
    pub doc_type: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub counterparty_id: i64,
    pub counterparty_name: String,
    pub shipment_ids: Vec<i64>,
    pub shipment_numbers: Vec<String>,
    pub container_numbers: Vec<String>,
    pub currency: String,
    pub exchange_rate: BigDecimal,
    pub language: String,
    pub template_id: Option<String>,
    pub items: Vec<InvoiceLineItem>,
    /// 已勾选但未单独成行的费用ID, 开票成功后同样要核销
    pub additional_charge_ids: Vec<i64>,
    pub totals: DocumentTotals,
}

impl InvoiceDocument {
    /// 导出明细行为 CSV (交付财务对账用)
    pub fn export_items_csv(&self) -> Result<String, EngineError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record([
            "description",
            "quantity",
            "unit_price",
            "currency",
            "amount",
            "tax_rate",
            "tax_amount",
            "discount_percent",
            "discount_amount",
            "final_amount",
            "source_charge_ids",
        ])
        .map_err(|e| EngineError::Export(e.to_string()))?;

        for item in &self.items {
            let unit_price = item
                .unit_price
                .as_uniform()
                .map(|p| p.to_string())
                .unwrap_or_default();
            let charge_ids = item
                .source_charge_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("|");
            wtr.write_record([
                item.description.clone(),
                item.quantity.to_string(),
                unit_price,
                item.currency.clone(),
                item.amount.to_string(),
                item.tax_rate.to_string(),
                item.tax_amount.to_string(),
                item.discount_percent.to_string(),
                item.discount_amount.to_string(),
                item.final_amount.to_string(),
                charge_ids,
            ])
            .map_err(|e| EngineError::Export(e.to_string()))?;
        }

        let bytes = wtr
            .into_inner()
            .map_err(|e| EngineError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| EngineError::Export(e.to_string()))
    }
}
